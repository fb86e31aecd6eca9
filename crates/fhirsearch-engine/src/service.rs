//! Search orchestration.
//!
//! A request flows through a fixed pipeline: primary query, pagination links,
//! one inclusion pass, iterative inclusion. Backend calls are sequential across
//! stages and batched within a stage.

use std::collections::HashSet;
use std::sync::Arc;

use fhirsearch_backend::{DynBackend, FilterClause};
use tracing::{debug, instrument};

use crate::assembler::{ResourceCleanup, SearchEntry, SearchEntryMode, assemble_entries, strip_fields};
use crate::config::SearchSettings;
use crate::error::{Result, SearchError};
use crate::executor::QueryExecutor;
use crate::include::{IncludePlan, InclusionQueryBuilder, ReferenceInclusionQueryBuilder};
use crate::inclusion::InclusionResolver;
use crate::iterate::IterativeInclusion;
use crate::mapper::{FieldMapper, StaticFieldMapper};
use crate::pagination::build_page_links;
use crate::query_builder::QueryBuilder;
use crate::request::SearchRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Total matches of the primary query; included resources are not counted.
    pub number_of_results: u64,
    /// Match entries first, then include entries. Unique by resource.
    pub entries: Vec<SearchEntry>,
    /// Link to the page that was returned.
    pub self_url: String,
    pub previous_result_url: Option<String>,
    pub next_result_url: Option<String>,
}

pub struct SearchService {
    settings: Arc<SearchSettings>,
    query_builder: QueryBuilder,
    executor: QueryExecutor,
    resolver: InclusionResolver,
    cleanup: ResourceCleanup,
}

impl SearchService {
    pub fn builder(backend: DynBackend) -> SearchServiceBuilder {
        SearchServiceBuilder::new(backend)
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Type-level search with `_include`/`_revinclude` resolution.
    #[instrument(skip(self, request), fields(resource_type = %request.resource_type))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        let params = &request.query_params;
        let page = self.query_builder.page(params)?;
        let query = self.query_builder.build(&request.resource_type, params)?;

        let response = self.executor.execute_one(&query).await?;
        let total = response.total;
        let mut entries = assemble_entries(
            response.hits,
            &request.base_url,
            SearchEntryMode::Match,
            &self.cleanup,
        );

        let links = build_page_links(
            &self.settings,
            &request.base_url,
            &request.resource_type,
            params,
            page,
            total,
        );

        let plan = IncludePlan::from_params(params);
        if plan.single_pass {
            let included = self.resolver.resolve(&entries, request, false).await?;
            append_unique(&mut entries, included);
        }
        if plan.iterate {
            let iterative = IterativeInclusion::new(&self.resolver, self.settings.max_include_depth);
            let added = iterative.expand(&entries, request).await?;
            entries.extend(added);
        }

        debug!(total, entries = entries.len(), "search completed");
        Ok(SearchResult {
            number_of_results: total,
            entries,
            self_url: links.current,
            previous_result_url: links.previous,
            next_result_url: links.next,
        })
    }

    /// System-level search across all resource types. Not supported.
    pub async fn global_search(&self, _request: &SearchRequest) -> Result<SearchResult> {
        Err(SearchError::not_implemented(
            "global search across resource types is not supported",
        ))
    }
}

/// Appends entries whose resource is not in `entries` yet, keeping the first occurrence.
fn append_unique(entries: &mut Vec<SearchEntry>, candidates: Vec<SearchEntry>) {
    let mut seen: HashSet<_> = entries.iter().map(SearchEntry::key).collect();
    for entry in candidates {
        if seen.insert(entry.key()) {
            entries.push(entry);
        }
    }
}

pub struct SearchServiceBuilder {
    backend: DynBackend,
    settings: SearchSettings,
    mapper: Option<Arc<dyn FieldMapper>>,
    inclusion_builder: Option<Arc<dyn InclusionQueryBuilder>>,
    static_filters: Vec<FilterClause>,
    cleanup: Option<ResourceCleanup>,
}

impl SearchServiceBuilder {
    pub fn new(backend: DynBackend) -> Self {
        Self {
            backend,
            settings: SearchSettings::default(),
            mapper: None,
            inclusion_builder: None,
            static_filters: Vec::new(),
            cleanup: None,
        }
    }

    #[must_use]
    pub fn settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn field_mapper(mut self, mapper: Arc<dyn FieldMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    #[must_use]
    pub fn inclusion_builder(mut self, builder: Arc<dyn InclusionQueryBuilder>) -> Self {
        self.inclusion_builder = Some(builder);
        self
    }

    /// Filters appended to every query, primary and inclusion alike.
    #[must_use]
    pub fn static_filters(mut self, filters: Vec<FilterClause>) -> Self {
        self.static_filters = filters;
        self
    }

    /// Overrides the default cleanup, which strips `settings.internal_fields`.
    #[must_use]
    pub fn cleanup(mut self, cleanup: ResourceCleanup) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    pub fn build(self) -> Result<SearchService> {
        self.settings.validate()?;
        let settings = Arc::new(self.settings);

        let mapper: Arc<dyn FieldMapper> = match self.mapper {
            Some(mapper) => mapper,
            None => Arc::new(StaticFieldMapper::new()),
        };
        let inclusion_builder: Arc<dyn InclusionQueryBuilder> = match self.inclusion_builder {
            Some(builder) => builder,
            None => Arc::new(
                ReferenceInclusionQueryBuilder::new(mapper.clone(), settings.max_inclusion_results)
                    .with_reference_bases(settings.reference_base_urls.iter().cloned()),
            ),
        };
        let cleanup = self
            .cleanup
            .unwrap_or_else(|| strip_fields(settings.internal_fields.clone()));

        let executor = QueryExecutor::new(self.backend);
        let static_filters: Arc<[FilterClause]> = self.static_filters.clone().into();
        let resolver = InclusionResolver::new(
            executor.clone(),
            inclusion_builder,
            static_filters,
            settings.fhir_version,
            cleanup.clone(),
        );

        Ok(SearchService {
            query_builder: QueryBuilder::new(settings.clone(), mapper, self.static_filters),
            settings,
            executor,
            resolver,
            cleanup,
        })
    }
}
