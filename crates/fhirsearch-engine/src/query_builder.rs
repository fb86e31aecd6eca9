//! Request parameters to structured search engine queries.

use std::sync::Arc;

use fhirsearch_backend::{FieldMatch, FilterClause, StructuredQuery};
use tracing::debug;

use crate::config::SearchSettings;
use crate::error::{Result, SearchError};
use crate::mapper::FieldMapper;
use crate::request::QueryParams;

/// Offset and size of the requested page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub size: usize,
}

pub struct QueryBuilder {
    settings: Arc<SearchSettings>,
    mapper: Arc<dyn FieldMapper>,
    static_filters: Vec<FilterClause>,
}

impl QueryBuilder {
    pub fn new(
        settings: Arc<SearchSettings>,
        mapper: Arc<dyn FieldMapper>,
        static_filters: Vec<FilterClause>,
    ) -> Self {
        Self {
            settings,
            mapper,
            static_filters,
        }
    }

    pub fn static_filters(&self) -> &[FilterClause] {
        &self.static_filters
    }

    /// Reads offset and page size from the control parameters.
    ///
    /// Missing values take the defaults (offset 0, configured page size);
    /// non-numeric or negative values are rejected and `_count` is clamped to
    /// the configured maximum.
    pub fn page(&self, params: &QueryParams) -> Result<Page> {
        let offset = match params.first(&self.settings.offset_param) {
            Some(raw) => parse_count(&self.settings.offset_param, raw)?,
            None => 0,
        };

        let size = match params.first(&self.settings.count_param) {
            Some(raw) => {
                let size = parse_count(&self.settings.count_param, raw)?;
                if size == 0 {
                    return Err(SearchError::invalid_parameter(
                        &self.settings.count_param,
                        raw,
                        "must be greater than zero",
                    ));
                }
                size.min(self.settings.max_page_size)
            }
            None => self.settings.default_page_size,
        };

        Ok(Page { offset, size })
    }

    /// Builds the primary query for a type-level search.
    pub fn build(&self, resource_type: &str, params: &QueryParams) -> Result<StructuredQuery> {
        let page = self.page(params)?;
        let mut query = StructuredQuery::new(resource_type.to_lowercase())
            .with_page(page.offset, page.size)
            .with_filters(&self.static_filters);

        for (name, value) in params.iter() {
            if self.settings.is_non_searchable(name) {
                continue;
            }
            let field = self.mapper.map_to_field_path(name);
            for raw in value.values() {
                query = query.with_match(FieldMatch::new(field.clone(), raw));
            }
        }

        debug!(
            collection = %query.collection,
            clauses = query.must.len(),
            offset = page.offset,
            size = page.size,
            "built search query"
        );
        Ok(query)
    }
}

fn parse_count(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| SearchError::invalid_parameter(name, raw, "expected a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::StaticFieldMapper;
    use fhirsearch_backend::Clause;
    use serde_json::json;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(
            Arc::new(SearchSettings::default()),
            Arc::new(StaticFieldMapper::new().with_mapping("family", "name.family")),
            vec![FilterClause::new(
                json!({"match": {"documentStatus": "AVAILABLE"}}),
            )],
        )
    }

    #[test]
    fn test_strips_control_params_and_maps_fields() {
        let params = QueryParams::parse(
            "family=Smith&_count=10&_getpagesoffset=30&_format=json&_include=Patient:organization\
             &_revinclude:iterate=Observation:patient&gender=male",
        );
        let query = builder().build("Patient", &params).unwrap();

        assert_eq!(query.collection, "patient");
        assert_eq!(query.offset, 30);
        assert_eq!(query.limit, 10);
        assert_eq!(
            query.must,
            vec![
                Clause::Match(FieldMatch::new("name.family", "Smith")),
                Clause::Match(FieldMatch::new("gender", "male")),
            ]
        );
        assert_eq!(query.filter.len(), 1);
    }

    #[test]
    fn test_defaults() {
        let query = builder().build("Observation", &QueryParams::new()).unwrap();
        assert_eq!(query.offset, 0);
        assert_eq!(query.limit, 20);
        assert!(query.must.is_empty());
        assert_eq!(query.filter.len(), 1);
    }

    #[test]
    fn test_repeated_param_ands_values() {
        let params = QueryParams::parse("given=John&given=Paul");
        let query = builder().build("Patient", &params).unwrap();
        assert_eq!(query.must.len(), 2);
    }

    #[test]
    fn test_invalid_pagination() {
        let err = builder()
            .build("Patient", &QueryParams::parse("_count=ten"))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidParameter { ref name, .. } if name == "_count"));

        let err = builder()
            .build("Patient", &QueryParams::parse("_getpagesoffset=-10"))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidParameter { .. }));

        let err = builder()
            .build("Patient", &QueryParams::parse("_count=0"))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidParameter { .. }));
    }

    #[test]
    fn test_count_is_clamped() {
        let page = builder().page(&QueryParams::parse("_count=50000")).unwrap();
        assert_eq!(page.size, 1000);
    }
}
