//! Raw search hits to bundle entries.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Resource cleanup transform applied to every hit before it is used.
///
/// Removes storage-internal fields; injected by the caller.
pub type ResourceCleanup = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// A resource key for dedup and cycle detection (resource_type, id).
pub type ResourceKey = (String, String);

/// How a resource entered the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEntryMode {
    /// Matched the search query directly.
    Match,
    /// Reached through `_include`/`_revinclude`.
    Include,
}

impl fmt::Display for SearchEntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::Include => write!(f, "include"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub mode: SearchEntryMode,
    pub resource: Value,
    /// `{baseUrl}/{resourceType}/{id}`
    pub full_url: String,
}

impl SearchEntry {
    pub fn resource_type(&self) -> &str {
        self.resource
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn id(&self) -> &str {
        self.resource
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn key(&self) -> ResourceKey {
        (self.resource_type().to_string(), self.id().to_string())
    }
}

/// Cleanup that removes the given top-level fields.
pub fn strip_fields(fields: Vec<String>) -> ResourceCleanup {
    Arc::new(move |mut resource: Value| {
        if let Some(obj) = resource.as_object_mut() {
            for field in &fields {
                obj.remove(field);
            }
        }
        resource
    })
}

/// Cleanup that returns resources unchanged.
pub fn identity_cleanup() -> ResourceCleanup {
    Arc::new(|resource| resource)
}

/// Turns raw hits into entries tagged with `mode`.
///
/// Hits that lack `resourceType` or `id` after cleanup cannot be addressed and
/// are skipped.
pub fn assemble_entries(
    hits: Vec<Value>,
    base_url: &str,
    mode: SearchEntryMode,
    cleanup: &ResourceCleanup,
) -> Vec<SearchEntry> {
    let base_url = base_url.trim_end_matches('/');
    hits.into_iter()
        .filter_map(|hit| {
            let resource = cleanup(hit);
            let full_url = {
                let resource_type = resource.get("resourceType").and_then(Value::as_str);
                let id = resource.get("id").and_then(Value::as_str);
                match (resource_type, id) {
                    (Some(rt), Some(id)) => format!("{base_url}/{rt}/{id}"),
                    _ => {
                        warn!(%mode, "skipping search hit without resourceType or id");
                        return None;
                    }
                }
            };
            Some(SearchEntry {
                mode,
                resource,
                full_url,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assemble_applies_cleanup_and_urls() {
        let cleanup = strip_fields(vec!["documentStatus".to_string(), "vid".to_string()]);
        let hits = vec![json!({
            "resourceType": "Patient",
            "id": "p1",
            "documentStatus": "AVAILABLE",
            "vid": 3,
            "active": true
        })];

        let entries = assemble_entries(hits, "https://fhir.example.com/", SearchEntryMode::Match, &cleanup);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].full_url, "https://fhir.example.com/Patient/p1");
        assert_eq!(entries[0].mode, SearchEntryMode::Match);
        assert_eq!(
            entries[0].resource,
            json!({"resourceType": "Patient", "id": "p1", "active": true})
        );
        assert_eq!(entries[0].key(), ("Patient".to_string(), "p1".to_string()));
    }

    #[test]
    fn test_hits_without_identity_are_skipped() {
        let hits = vec![
            json!({"resourceType": "Patient"}),
            json!({"resourceType": "Organization", "id": "o1"}),
        ];
        let entries = assemble_entries(hits, "http://x", SearchEntryMode::Include, &identity_cleanup());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].full_url, "http://x/Organization/o1");
        assert_eq!(entries[0].mode.to_string(), "include");
    }
}
