//! FHIR `searchset` Bundle rendering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assembler::{SearchEntry, SearchEntryMode};
use crate::service::SearchResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

impl BundleLink {
    fn new(relation: &str, url: impl Into<String>) -> Self {
        Self {
            relation: relation.to_string(),
            url: url.into(),
        }
    }
}

/// Search component of a Bundle entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleEntrySearch {
    pub mode: SearchEntryMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleEntry {
    #[serde(rename = "fullUrl")]
    pub full_url: String,
    pub resource: Value,
    pub search: BundleEntrySearch,
}

impl From<SearchEntry> for BundleEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            full_url: entry.full_url,
            resource: entry.resource,
            search: BundleEntrySearch { mode: entry.mode },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub total: u64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub link: Vec<BundleLink>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    pub fn searchset(total: u64, entries: Vec<BundleEntry>, links: Vec<BundleLink>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            bundle_type: "searchset".to_string(),
            total,
            link: links,
            entry: entries,
        }
    }
}

impl SearchResult {
    /// Renders the result as a `searchset` Bundle. `total` counts matches only.
    pub fn to_bundle(&self) -> Bundle {
        let mut links = vec![BundleLink::new("self", self.self_url.as_str())];
        if let Some(url) = &self.previous_result_url {
            links.push(BundleLink::new("previous", url.as_str()));
        }
        if let Some(url) = &self.next_result_url {
            links.push(BundleLink::new("next", url.as_str()));
        }

        let entries = self.entries.iter().cloned().map(BundleEntry::from).collect();
        Bundle::searchset(self.number_of_results, entries, links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(rt: &str, id: &str, mode: SearchEntryMode) -> SearchEntry {
        SearchEntry {
            mode,
            resource: json!({"resourceType": rt, "id": id}),
            full_url: format!("http://x/{rt}/{id}"),
        }
    }

    #[test]
    fn test_searchset_bundle_json() {
        let result = SearchResult {
            number_of_results: 25,
            entries: vec![
                entry("Observation", "o1", SearchEntryMode::Match),
                entry("Patient", "p1", SearchEntryMode::Include),
            ],
            self_url: "http://x/Observation?_getpagesoffset=10&_count=10".into(),
            previous_result_url: Some("http://x/Observation?_getpagesoffset=0&_count=10".into()),
            next_result_url: None,
        };

        let j = serde_json::to_value(result.to_bundle()).unwrap();
        assert_eq!(j["resourceType"], "Bundle");
        assert_eq!(j["type"], "searchset");
        assert_eq!(j["total"], 25);
        assert_eq!(j["link"].as_array().unwrap().len(), 2);
        assert_eq!(j["link"][0]["relation"], "self");
        assert_eq!(j["link"][1]["relation"], "previous");
        assert_eq!(j["entry"][0]["fullUrl"], "http://x/Observation/o1");
        assert_eq!(j["entry"][0]["search"]["mode"], "match");
        assert_eq!(j["entry"][1]["search"]["mode"], "include");
        assert_eq!(j["entry"][1]["resource"]["id"], "p1");
    }

    #[test]
    fn test_empty_result_omits_entry() {
        let result = SearchResult {
            number_of_results: 0,
            entries: Vec::new(),
            self_url: "http://x/Patient?_getpagesoffset=0&_count=20".into(),
            previous_result_url: None,
            next_result_url: None,
        };
        let j = serde_json::to_value(result.to_bundle()).unwrap();
        assert_eq!(j["total"], 0);
        assert!(j.get("entry").is_none());
    }
}
