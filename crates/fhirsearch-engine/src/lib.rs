//! # fhirsearch-engine
//!
//! Resolves FHIR type-level search requests into paginated, deduplicated
//! searchset results on top of a [`fhirsearch_backend::SearchBackend`].
//!
//! A request goes through the primary query, pagination links, one round of
//! `_include`/`_revinclude` and then `:iterate` expansion bounded by
//! [`SearchSettings::max_include_depth`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use fhirsearch_backend::InMemoryBackend;
//! use fhirsearch_engine::{QueryParams, SearchRequest, SearchService};
//!
//! let service = SearchService::builder(Arc::new(InMemoryBackend::new())).build()?;
//! let request = SearchRequest::new("Observation", "https://fhir.example.com")
//!     .with_params(QueryParams::parse("code=1234&_include=Observation:patient"))
//!     .allow_types(["Observation", "Patient"]);
//! let bundle = service.search(&request).await?.to_bundle();
//! ```

pub mod assembler;
pub mod bundle;
pub mod config;
pub mod error;
pub mod executor;
pub mod include;
pub mod inclusion;
pub mod iterate;
pub mod mapper;
pub mod pagination;
pub mod query_builder;
pub mod request;
pub mod service;

pub use assembler::{ResourceCleanup, SearchEntry, SearchEntryMode, identity_cleanup, strip_fields};
pub use bundle::{Bundle, BundleEntry, BundleEntrySearch, BundleLink};
pub use config::{ConfigError, FhirVersion, SearchSettings};
pub use error::{Result, SearchError};
pub use executor::QueryExecutor;
pub use include::{IncludeParam, IncludePlan, InclusionQueryBuilder, ReferenceInclusionQueryBuilder};
pub use inclusion::InclusionResolver;
pub use iterate::IterativeInclusion;
pub use mapper::{FieldMapper, StaticFieldMapper};
pub use pagination::{PageLinks, build_page_links};
pub use query_builder::{Page, QueryBuilder};
pub use request::{ParamValue, QueryParams, SearchRequest};
pub use service::{SearchResult, SearchService, SearchServiceBuilder};
