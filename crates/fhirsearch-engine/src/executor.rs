//! Single and batched query execution.
//!
//! Collections are created lazily by the write path. A query against a
//! collection that does not exist yet is an empty result, never a failure.

use fhirsearch_backend::{DynBackend, SearchResponse, StructuredQuery};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Clone)]
pub struct QueryExecutor {
    backend: DynBackend,
}

impl QueryExecutor {
    pub fn new(backend: DynBackend) -> Self {
        Self { backend }
    }

    /// Runs one query, mapping a missing collection to `{total: 0, hits: []}`.
    pub async fn execute_one(&self, query: &StructuredQuery) -> Result<SearchResponse> {
        match self.backend.search(query).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_collection_not_found() => {
                debug!(collection = %query.collection, "collection does not exist yet, returning empty result");
                Ok(SearchResponse::empty())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs all queries in one round trip and concatenates their hits in query order.
    ///
    /// Queries against missing collections contribute nothing; any other
    /// per-query failure fails the whole batch.
    pub async fn execute_batch(&self, queries: &[StructuredQuery]) -> Result<Vec<Value>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let items = self.backend.multi_search(queries).await?;
        let mut hits = Vec::new();
        for (query, item) in queries.iter().zip(items) {
            match item {
                Ok(response) => hits.extend(response.hits),
                Err(e) if e.is_collection_not_found() => {
                    warn!(
                        collection = %query.collection,
                        backend = self.backend.backend_name(),
                        "skipping query against missing collection"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(hits)
    }
}
