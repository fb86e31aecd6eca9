//! _include and _revinclude directives.
//!
//! This module parses inclusion directives and turns them into search engine
//! queries for the resources they reach.
//!
//! - `_include`: Include resources referenced by the search results
//! - `_revinclude`: Include resources that reference the search results
//! - `:iterate`: Follow chains of references

use std::sync::Arc;

use fhirsearch_backend::{FilterClause, StructuredQuery};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::debug;

use crate::config::FhirVersion;
use crate::mapper::FieldMapper;
use crate::request::QueryParams;

/// A parsed _include or _revinclude parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeParam {
    /// The source resource type
    pub source_type: String,
    /// The search parameter name (reference parameter)
    pub search_param: String,
    /// Optional target type filter
    pub target_type: Option<String>,
    /// Whether to iterate (follow chains)
    pub iterate: bool,
    /// Whether this is a reverse include
    pub reverse: bool,
}

/// Error type for include operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IncludeError {
    #[error("Invalid include parameter: {0}")]
    InvalidInclude(String),

    #[error("Wildcard includes are not supported")]
    Wildcard,
}

pub const INCLUDE: &str = "_include";
pub const INCLUDE_ITERATE: &str = "_include:iterate";
pub const REVINCLUDE: &str = "_revinclude";
pub const REVINCLUDE_ITERATE: &str = "_revinclude:iterate";

/// Check if a parameter name is an include parameter.
pub fn is_include_parameter(name: &str) -> bool {
    name == INCLUDE || name == INCLUDE_ITERATE
}

/// Check if a parameter name is a revinclude parameter.
pub fn is_revinclude_parameter(name: &str) -> bool {
    name == REVINCLUDE || name == REVINCLUDE_ITERATE
}

/// Check if a parameter name asks for iterative inclusion.
pub fn is_iterate_parameter(name: &str) -> bool {
    name == INCLUDE_ITERATE || name == REVINCLUDE_ITERATE
}

/// Parse an _include or _revinclude value.
///
/// Format: `Type:searchParam` or `Type:searchParam:TargetType`
pub fn parse_include(value: &str, iterate: bool, reverse: bool) -> Result<IncludeParam, IncludeError> {
    if value == "*" {
        return Err(IncludeError::Wildcard);
    }

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(IncludeError::InvalidInclude(format!(
            "'{value}' is not in Type:searchParam[:TargetType] format"
        )));
    }

    Ok(IncludeParam {
        source_type: parts[0].to_string(),
        search_param: parts[1].to_string(),
        target_type: parts.get(2).map(|s| (*s).to_string()),
        iterate,
        reverse,
    })
}

fn extract(params: &QueryParams, name: &str, iterate: bool, reverse: bool) -> Vec<IncludeParam> {
    let Some(values) = params.get(name) else {
        return Vec::new();
    };
    values
        .values()
        .filter_map(|value| match parse_include(value, iterate, reverse) {
            Ok(include) => Some(include),
            Err(e) => {
                debug!(param = name, value, error = %e, "ignoring include directive");
                None
            }
        })
        .collect()
}

/// Extract the _include directives, or their `:iterate` variants when `iterative`.
pub fn extract_includes(params: &QueryParams, iterative: bool) -> Vec<IncludeParam> {
    let name = if iterative { INCLUDE_ITERATE } else { INCLUDE };
    extract(params, name, iterative, false)
}

/// Extract the _revinclude directives, or their `:iterate` variants when `iterative`.
pub fn extract_revincludes(params: &QueryParams, iterative: bool) -> Vec<IncludeParam> {
    let name = if iterative { REVINCLUDE_ITERATE } else { REVINCLUDE };
    extract(params, name, iterative, true)
}

/// Which kinds of inclusion a request asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IncludePlan {
    /// Plain `_include`/`_revinclude` present.
    pub single_pass: bool,
    /// `:iterate` variants present.
    pub iterate: bool,
}

impl IncludePlan {
    pub fn from_params(params: &QueryParams) -> Self {
        let mut plan = Self::default();
        for (name, _) in params.iter() {
            if is_include_parameter(name) || is_revinclude_parameter(name) {
                if is_iterate_parameter(name) {
                    plan.iterate = true;
                } else {
                    plan.single_pass = true;
                }
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        !self.single_pass && !self.iterate
    }
}

/// Builds the queries that fetch the resources reached by inclusion directives.
///
/// Every query returned must carry `filters`.
pub trait InclusionQueryBuilder: Send + Sync {
    /// Queries for resources referenced by `resources` (`_include`).
    fn build_forward_queries(
        &self,
        params: &QueryParams,
        resources: &[Value],
        filters: &[FilterClause],
        version: FhirVersion,
        iterative: bool,
    ) -> Vec<StructuredQuery>;

    /// Queries for resources referencing `resources` (`_revinclude`).
    fn build_reverse_queries(
        &self,
        params: &QueryParams,
        resources: &[Value],
        filters: &[FilterClause],
        version: FhirVersion,
        iterative: bool,
    ) -> Vec<StructuredQuery>;
}

/// Inclusion query builder following `Reference.reference` values.
///
/// Forward includes read `{field}.reference` of the source resources and fetch
/// targets by id, one query per target type. Reverse includes search the source
/// collection for `{field}.reference` equal to `Type/id` of the current resources,
/// or to `{base}/Type/id` for every configured reference base.
pub struct ReferenceInclusionQueryBuilder {
    mapper: Arc<dyn FieldMapper>,
    max_results: usize,
    reference_bases: Vec<String>,
}

impl ReferenceInclusionQueryBuilder {
    pub fn new(mapper: Arc<dyn FieldMapper>, max_results: usize) -> Self {
        Self {
            mapper,
            max_results,
            reference_bases: Vec::new(),
        }
    }

    /// Base URLs under which stored documents may hold absolute references.
    #[must_use]
    pub fn with_reference_bases<I, S>(mut self, bases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_bases = bases
            .into_iter()
            .map(|b| b.into().trim_end_matches('/').to_string())
            .collect();
        self
    }

    fn reference_forms(&self, rtype: &str, id: &str) -> Vec<String> {
        let relative = format!("{rtype}/{id}");
        let mut forms: Vec<String> = self
            .reference_bases
            .iter()
            .map(|base| format!("{base}/{relative}"))
            .collect();
        forms.insert(0, relative);
        forms
    }
}

impl InclusionQueryBuilder for ReferenceInclusionQueryBuilder {
    fn build_forward_queries(
        &self,
        params: &QueryParams,
        resources: &[Value],
        filters: &[FilterClause],
        version: FhirVersion,
        iterative: bool,
    ) -> Vec<StructuredQuery> {
        let mut targets: IndexMap<String, IndexSet<String>> = IndexMap::new();

        for include in extract_includes(params, iterative) {
            let field = self.mapper.map_to_field_path(&include.search_param);
            for resource in resources
                .iter()
                .filter(|r| resource_type_of(r) == Some(include.source_type.as_str()))
            {
                for reference in reference_values(resource, &field) {
                    let Some((rtype, rid)) = parse_reference_value(&reference) else {
                        continue;
                    };
                    if include.target_type.as_ref().is_some_and(|t| *t != rtype) {
                        continue;
                    }
                    targets.entry(rtype).or_default().insert(rid);
                }
            }
        }

        debug!(fhir_version = %version, iterative, target_types = targets.len(), "built forward include queries");

        targets
            .into_iter()
            .map(|(rtype, ids)| {
                StructuredQuery::new(rtype.to_lowercase())
                    .with_page(0, self.max_results)
                    .with_terms("id", ids.into_iter().collect())
                    .with_filters(filters)
            })
            .collect()
    }

    fn build_reverse_queries(
        &self,
        params: &QueryParams,
        resources: &[Value],
        filters: &[FilterClause],
        version: FhirVersion,
        iterative: bool,
    ) -> Vec<StructuredQuery> {
        let mut queries = Vec::new();

        for include in extract_revincludes(params, iterative) {
            let references: IndexSet<String> = resources
                .iter()
                .filter_map(|r| Some((resource_type_of(r)?, r.get("id")?.as_str()?)))
                .filter(|(rtype, _)| include.target_type.as_deref().is_none_or(|t| t == *rtype))
                .flat_map(|(rtype, id)| self.reference_forms(rtype, id))
                .collect();

            if references.is_empty() {
                continue;
            }

            let field = self.mapper.map_to_field_path(&include.search_param);
            queries.push(
                StructuredQuery::new(include.source_type.to_lowercase())
                    .with_page(0, self.max_results)
                    .with_terms(format!("{field}.reference"), references.into_iter().collect())
                    .with_filters(filters),
            );
        }

        debug!(fhir_version = %version, iterative, queries = queries.len(), "built reverse include queries");
        queries
    }
}

fn resource_type_of(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

/// Collect reference strings at a dot-separated path, descending into arrays.
///
/// Values may be `Reference` objects (their `reference` field) or plain strings.
pub fn reference_values(resource: &Value, path: &str) -> Vec<String> {
    let mut current = vec![resource];
    for part in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Array(items) => next.extend(items.iter().filter_map(|i| i.get(part))),
                other => next.extend(other.get(part)),
            }
        }
        current = next;
    }

    let mut refs = Vec::new();
    for value in current {
        collect_references(value, &mut refs);
    }
    refs
}

fn collect_references(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_references(item, refs)),
        Value::String(s) => refs.push(s.clone()),
        other => {
            if let Some(s) = other.get("reference").and_then(Value::as_str) {
                refs.push(s.to_string());
            }
        }
    }
}

/// Parse a FHIR reference value into (type, id).
///
/// Handles formats: "Patient/123", "http://example.org/fhir/Patient/123".
/// Versioned references ("Patient/123/_history/2") resolve to the resource itself.
pub fn parse_reference_value(reference: &str) -> Option<(String, String)> {
    let reference = match reference.split_once("/_history/") {
        Some((head, _)) => head,
        None => reference,
    };

    let (prefix, id) = reference.rsplit_once('/')?;
    let rtype = prefix.rsplit_once('/').map_or(prefix, |(_, t)| t);

    if rtype.is_empty() || id.is_empty() {
        return None;
    }
    // Validate resource type starts with uppercase
    if !rtype.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        return None;
    }
    Some((rtype.to_string(), id.to_string()))
}
