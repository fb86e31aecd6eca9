//! Structured queries and responses exchanged with the search engine.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Field match with AND-tokenized, lenient semantics.
///
/// Every token of `value` must match the field. Tokens that cannot be parsed
/// for the field's type make the clause match nothing instead of failing the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    /// Document field path (dot separated).
    pub field: String,
    /// Raw value as received in the request.
    pub value: String,
}

impl FieldMatch {
    /// Creates a new field match clause.
    #[must_use]
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A must clause of a [`StructuredQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Clause {
    /// AND-tokenized lenient match on one field.
    Match(FieldMatch),
    /// Exact match of a field against any of the listed values.
    Terms {
        /// Document field path.
        field: String,
        /// Accepted values.
        values: Vec<String>,
    },
}

impl Clause {
    /// Renders the clause in Elasticsearch query DSL.
    #[must_use]
    pub fn to_dsl(&self) -> Value {
        match self {
            Self::Match(m) => json!({
                "query_string": {
                    "fields": [m.field],
                    "query": m.value,
                    "default_operator": "AND",
                    "lenient": true
                }
            }),
            Self::Terms { field, values } => json!({ "terms": { field.as_str(): values } }),
        }
    }
}

/// Static filter clause supplied by the caller (e.g. "only available records").
///
/// The value is passed to the engine verbatim; query construction never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterClause(pub Value);

impl FilterClause {
    /// Wraps a raw filter clause.
    #[must_use]
    pub fn new(clause: Value) -> Self {
        Self(clause)
    }

    /// Returns the raw clause.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// A bool query against one collection, with pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    /// Target collection, the lowercase resource type name.
    pub collection: String,
    /// Number of matches to skip.
    pub offset: usize,
    /// Maximum number of hits to return.
    pub limit: usize,
    /// Clauses that must all match.
    pub must: Vec<Clause>,
    /// Static filters appended to every query.
    pub filter: Vec<FilterClause>,
}

impl StructuredQuery {
    /// Creates an unfiltered query against `collection` returning up to 10 hits.
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            offset: 0,
            limit: 10,
            must: Vec::new(),
            filter: Vec::new(),
        }
    }

    /// Sets offset and limit.
    #[must_use]
    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Adds a field match clause.
    #[must_use]
    pub fn with_match(mut self, clause: FieldMatch) -> Self {
        self.must.push(Clause::Match(clause));
        self
    }

    /// Adds a terms clause.
    #[must_use]
    pub fn with_terms(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.must.push(Clause::Terms {
            field: field.into(),
            values,
        });
        self
    }

    /// Appends static filters.
    #[must_use]
    pub fn with_filters(mut self, filters: &[FilterClause]) -> Self {
        self.filter.extend_from_slice(filters);
        self
    }

    /// Renders the request body for the engine's `_search` endpoint.
    #[must_use]
    pub fn to_request_body(&self) -> Value {
        let must: Vec<Value> = self.must.iter().map(Clause::to_dsl).collect();
        let filter: Vec<&Value> = self.filter.iter().map(FilterClause::as_value).collect();
        json!({
            "from": self.offset,
            "size": self.limit,
            "track_total_hits": true,
            "query": {
                "bool": {
                    "must": must,
                    "filter": filter
                }
            }
        })
    }
}

/// Response to a single query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Total number of matches, independent of pagination.
    pub total: u64,
    /// Source documents of the returned page.
    pub hits: Vec<Value>,
}

impl SearchResponse {
    /// Creates an empty response (no matches).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a response from a page of hits and the total match count.
    #[must_use]
    pub fn new(total: u64, hits: Vec<Value>) -> Self {
        Self { total, hits }
    }
}
