//! One round of _include/_revinclude resolution.

use std::sync::Arc;

use fhirsearch_backend::{FilterClause, StructuredQuery};
use serde_json::Value;
use tracing::debug;

use crate::assembler::{ResourceCleanup, SearchEntry, SearchEntryMode, assemble_entries};
use crate::config::FhirVersion;
use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::include::InclusionQueryBuilder;
use crate::request::SearchRequest;

#[derive(Clone)]
pub struct InclusionResolver {
    executor: QueryExecutor,
    builder: Arc<dyn InclusionQueryBuilder>,
    static_filters: Arc<[FilterClause]>,
    fhir_version: FhirVersion,
    cleanup: ResourceCleanup,
}

impl InclusionResolver {
    pub fn new(
        executor: QueryExecutor,
        builder: Arc<dyn InclusionQueryBuilder>,
        static_filters: Arc<[FilterClause]>,
        fhir_version: FhirVersion,
        cleanup: ResourceCleanup,
    ) -> Self {
        Self {
            executor,
            builder,
            static_filters,
            fhir_version,
            cleanup,
        }
    }

    /// Builds the inclusion queries for `entries`, keeping only those whose target
    /// collection the request may read.
    pub fn allowed_queries(
        &self,
        entries: &[SearchEntry],
        request: &SearchRequest,
        iterative: bool,
    ) -> Vec<StructuredQuery> {
        let resources: Vec<Value> = entries.iter().map(|e| e.resource.clone()).collect();
        let params = &request.query_params;

        let mut queries = self.builder.build_forward_queries(
            params,
            &resources,
            &self.static_filters,
            self.fhir_version,
            iterative,
        );
        queries.extend(self.builder.build_reverse_queries(
            params,
            &resources,
            &self.static_filters,
            self.fhir_version,
            iterative,
        ));

        let before = queries.len();
        queries.retain(|q| request.is_type_allowed(&q.collection));
        if queries.len() < before {
            debug!(
                dropped = before - queries.len(),
                "dropped inclusion queries against collections outside the allowed resource types"
            );
        }
        queries
    }

    /// Resolves one round of inclusions for `entries`, tagged as `include`.
    ///
    /// All allowed queries run in a single batch; no backend call is made when
    /// nothing is left to query.
    pub async fn resolve(
        &self,
        entries: &[SearchEntry],
        request: &SearchRequest,
        iterative: bool,
    ) -> Result<Vec<SearchEntry>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let queries = self.allowed_queries(entries, request, iterative);
        let hits = self.executor.execute_batch(&queries).await?;
        debug!(queries = queries.len(), hits = hits.len(), iterative, "resolved inclusions");

        Ok(assemble_entries(
            hits,
            &request.base_url,
            SearchEntryMode::Include,
            &self.cleanup,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::identity_cleanup;
    use crate::include::ReferenceInclusionQueryBuilder;
    use crate::mapper::StaticFieldMapper;
    use crate::request::QueryParams;
    use fhirsearch_backend::InMemoryBackend;
    use serde_json::json;

    fn setup() -> (Arc<InMemoryBackend>, InclusionResolver) {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert("patient", json!({"resourceType": "Patient", "id": "p1", "documentStatus": "AVAILABLE"}));
        backend.insert("patient", json!({"resourceType": "Patient", "id": "p2", "documentStatus": "DELETED"}));
        backend.insert(
            "practitioner",
            json!({"resourceType": "Practitioner", "id": "pr1", "documentStatus": "AVAILABLE"}),
        );

        let mapper = Arc::new(StaticFieldMapper::new().with_mapping("patient", "subject"));
        let resolver = InclusionResolver::new(
            QueryExecutor::new(backend.clone()),
            Arc::new(ReferenceInclusionQueryBuilder::new(mapper, 100)),
            vec![FilterClause::new(json!({"match": {"documentStatus": "AVAILABLE"}}))].into(),
            FhirVersion::R4,
            identity_cleanup(),
        );
        (backend, resolver)
    }

    fn observation(id: &str, patient: &str, performer: &str) -> SearchEntry {
        SearchEntry {
            mode: SearchEntryMode::Match,
            resource: json!({
                "resourceType": "Observation",
                "id": id,
                "subject": {"reference": format!("Patient/{patient}")},
                "performer": [{"reference": format!("Practitioner/{performer}")}]
            }),
            full_url: format!("http://x/Observation/{id}"),
        }
    }

    #[tokio::test]
    async fn test_resolves_includes_with_filters() {
        let (_backend, resolver) = setup();
        let request = SearchRequest::new("Observation", "http://x")
            .with_params(QueryParams::parse("_include=Observation:patient"))
            .allow_types(["Observation", "Patient"]);

        let entries = vec![observation("o1", "p1", "pr1"), observation("o2", "p2", "pr1")];
        let included = resolver.resolve(&entries, &request, false).await.unwrap();

        assert_eq!(included.len(), 1);
        assert_eq!(included[0].id(), "p1");
        assert_eq!(included[0].mode, SearchEntryMode::Include);
        assert_eq!(included[0].full_url, "http://x/Patient/p1");
    }

    #[tokio::test]
    async fn test_disallowed_collections_are_never_queried() {
        let (backend, resolver) = setup();
        let request = SearchRequest::new("Observation", "http://x")
            .with_params(QueryParams::parse(
                "_include=Observation:patient&_include=Observation:performer",
            ))
            .allow_types(["observation", "PATIENT"]);

        let included = resolver
            .resolve(&[observation("o1", "p1", "pr1")], &request, false)
            .await
            .unwrap();

        assert_eq!(included.len(), 1);
        assert_eq!(backend.query_count("patient"), 1);
        assert_eq!(backend.query_count("practitioner"), 0);
    }

    #[tokio::test]
    async fn test_no_queries_no_round_trip() {
        let (backend, resolver) = setup();
        let request = SearchRequest::new("Observation", "http://x")
            .with_params(QueryParams::parse("_include=Observation:performer"))
            .allow_types(["Observation"]);

        let included = resolver
            .resolve(&[observation("o1", "p1", "pr1")], &request, false)
            .await
            .unwrap();
        assert!(included.is_empty());
        assert_eq!(backend.round_trips(), 0);
    }

    #[tokio::test]
    async fn test_iterative_flag_selects_iterate_directives() {
        let (_backend, resolver) = setup();
        let request = SearchRequest::new("Observation", "http://x")
            .with_params(QueryParams::parse("_include:iterate=Observation:patient"))
            .allow_types(["Patient"]);
        let entries = vec![observation("o1", "p1", "pr1")];

        assert!(resolver.resolve(&entries, &request, false).await.unwrap().is_empty());
        assert_eq!(resolver.resolve(&entries, &request, true).await.unwrap().len(), 1);
    }
}
