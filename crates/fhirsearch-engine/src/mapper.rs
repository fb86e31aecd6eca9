//! Logical search parameter to document field path mapping.

use std::collections::HashMap;

/// Maps a logical search parameter name to the document field it searches.
pub trait FieldMapper: Send + Sync {
    fn map_to_field_path(&self, param: &str) -> String;
}

/// Table-driven mapper.
///
/// Lookup order: custom table, builtin mappings for the common `_`-prefixed
/// parameters, then the parameter name itself.
#[derive(Debug, Clone, Default)]
pub struct StaticFieldMapper {
    table: HashMap<String, String>,
}

impl StaticFieldMapper {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mapping(mut self, param: impl Into<String>, field: impl Into<String>) -> Self {
        self.table.insert(param.into(), field.into());
        self
    }
}

fn builtin_field(param: &str) -> Option<&'static str> {
    match param {
        "_id" => Some("id"),
        "_lastUpdated" => Some("meta.lastUpdated"),
        "_tag" => Some("meta.tag"),
        "_profile" => Some("meta.profile"),
        "_security" => Some("meta.security"),
        "_source" => Some("meta.source"),
        _ => None,
    }
}

impl FieldMapper for StaticFieldMapper {
    fn map_to_field_path(&self, param: &str) -> String {
        if let Some(field) = self.table.get(param) {
            return field.clone();
        }
        builtin_field(param).unwrap_or(param).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_order() {
        let mapper = StaticFieldMapper::new()
            .with_mapping("patient", "subject")
            .with_mapping("_id", "logicalId");

        assert_eq!(mapper.map_to_field_path("patient"), "subject");
        assert_eq!(mapper.map_to_field_path("_id"), "logicalId");
        assert_eq!(mapper.map_to_field_path("_lastUpdated"), "meta.lastUpdated");
        assert_eq!(mapper.map_to_field_path("family"), "family");
    }
}
