//! The search engine trait every backend implements.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::query::{SearchResponse, StructuredQuery};

/// Outcome of one query inside a batched round trip.
pub type MultiSearchItem = Result<SearchResponse, BackendError>;

/// A document search engine treated as a query/response service.
///
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use fhirsearch_backend::{BackendError, SearchBackend, SearchResponse, StructuredQuery};
///
/// async fn count(backend: &dyn SearchBackend, collection: &str) -> Result<u64, BackendError> {
///     match backend.search(&StructuredQuery::new(collection)).await {
///         Ok(response) => Ok(response.total),
///         Err(e) if e.is_collection_not_found() => Ok(0),
///         Err(e) => Err(e),
///     }
/// }
/// ```
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Executes a single structured query.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::CollectionNotFound` if the target collection does not
    /// exist, distinguishable from every other failure.
    async fn search(&self, query: &StructuredQuery) -> Result<SearchResponse, BackendError>;

    /// Executes several queries in one round trip.
    ///
    /// The returned vector has one item per query, in input order. A failure of
    /// one query is reported in its item and does not affect the others.
    ///
    /// # Errors
    ///
    /// Returns an error only when the round trip as a whole fails.
    async fn multi_search(
        &self,
        queries: &[StructuredQuery],
    ) -> Result<Vec<MultiSearchItem>, BackendError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
