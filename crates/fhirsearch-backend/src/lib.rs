//! # fhirsearch-backend
//!
//! Document search engine abstraction for FHIR search orchestration.
//!
//! The search engine is treated as a query/response service. This crate defines
//! the structured queries sent to it, the responses coming back and the
//! [`SearchBackend`] trait every engine adapter implements.
//!
//! ## Overview
//!
//! - [`StructuredQuery`] - bool query against one collection (index)
//! - [`SearchBackend`] - single (`search`) and batched (`multi_search`) execution
//! - [`BackendError`] - error taxonomy, with a distinguishable
//!   [`BackendError::CollectionNotFound`] for lazily created collections
//!
//! Two backends are provided:
//!
//! - [`InMemoryBackend`] - evaluates queries over JSON documents held in memory
//! - [`ElasticsearchBackend`] - talks to an Elasticsearch/OpenSearch cluster over HTTP
//!
//! ## Example
//!
//! ```ignore
//! use fhirsearch_backend::{FieldMatch, InMemoryBackend, SearchBackend, StructuredQuery};
//!
//! let backend = InMemoryBackend::new();
//! backend.insert("patient", serde_json::json!({"resourceType": "Patient", "id": "p1"}));
//!
//! let query = StructuredQuery::new("patient").with_match(FieldMatch::new("id", "p1"));
//! let response = backend.search(&query).await?;
//! assert_eq!(response.total, 1);
//! ```

mod elasticsearch;
mod error;
mod memory;
mod query;
mod traits;

pub use elasticsearch::{ElasticsearchBackend, ElasticsearchConfig};
pub use error::{BackendError, ErrorCategory};
pub use memory::InMemoryBackend;
pub use query::{Clause, FieldMatch, FilterClause, SearchResponse, StructuredQuery};
pub use traits::{MultiSearchItem, SearchBackend};

/// Type alias for a backend result.
pub type BackendResult<T> = Result<T, BackendError>;

/// Type alias for a shareable backend trait object.
pub type DynBackend = std::sync::Arc<dyn SearchBackend>;
