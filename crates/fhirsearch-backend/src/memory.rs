//! In-memory search backend.
//!
//! Evaluates [`StructuredQuery`] values over JSON documents grouped by collection.
//! Useful for tests and local development: it keeps a per-collection count of
//! the queries it received, so callers can assert which collections were (or were
//! never) queried.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::BackendError;
use crate::query::{Clause, FieldMatch, FilterClause, SearchResponse, StructuredQuery};
use crate::traits::{MultiSearchItem, SearchBackend};

/// In-memory document search backend.
///
/// A collection exists once a document was inserted into it or it was created
/// explicitly, mirroring engines that create indices lazily on first write.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    collections: DashMap<String, Vec<Value>>,
    failing: DashMap<String, String>,
    queried: DashMap<String, usize>,
    round_trips: AtomicUsize,
}

impl InMemoryBackend {
    /// Creates an empty backend without any collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a document, creating the collection if needed.
    pub fn insert(&self, collection: &str, document: Value) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Creates an empty collection.
    pub fn create_collection(&self, collection: &str) {
        self.collections.entry(collection.to_string()).or_default();
    }

    /// Makes every query against `collection` fail with a query error.
    pub fn fail_collection(&self, collection: &str, message: impl Into<String>) {
        self.failing.insert(collection.to_string(), message.into());
    }

    /// Number of queries received for `collection`, in single and batched calls.
    pub fn query_count(&self, collection: &str) -> usize {
        self.queried.get(collection).map(|c| *c).unwrap_or(0)
    }

    /// Number of round trips (`search` and `multi_search` calls) received.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    fn evaluate(&self, query: &StructuredQuery) -> Result<SearchResponse, BackendError> {
        *self.queried.entry(query.collection.clone()).or_default() += 1;

        if let Some(message) = self.failing.get(&query.collection) {
            return Err(BackendError::query(message.value().clone()));
        }

        let documents = self
            .collections
            .get(&query.collection)
            .ok_or_else(|| BackendError::collection_not_found(&query.collection))?;

        let mut matched = Vec::new();
        for doc in documents.iter() {
            if !query.must.iter().all(|clause| clause_matches(doc, clause)) {
                continue;
            }
            let mut keep = true;
            for filter in &query.filter {
                if !filter_matches(doc, filter)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                matched.push(doc);
            }
        }

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        Ok(SearchResponse::new(total, hits))
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn search(&self, query: &StructuredQuery) -> Result<SearchResponse, BackendError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        self.evaluate(query)
    }

    async fn multi_search(
        &self,
        queries: &[StructuredQuery],
    ) -> Result<Vec<MultiSearchItem>, BackendError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        Ok(queries.iter().map(|q| self.evaluate(q)).collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

fn clause_matches(doc: &Value, clause: &Clause) -> bool {
    match clause {
        Clause::Match(FieldMatch { field, value }) => tokens_match(doc, field, value),
        Clause::Terms { field, values } => {
            let leaves = leaf_strings_at(doc, field);
            leaves.iter().any(|leaf| values.iter().any(|v| v == leaf))
        }
    }
}

fn filter_matches(doc: &Value, filter: &FilterClause) -> Result<bool, BackendError> {
    let unsupported = || BackendError::query(format!("unsupported filter clause: {}", filter.0));
    let object = filter.as_value().as_object().ok_or_else(unsupported)?;
    let (kind, body) = object.iter().next().ok_or_else(unsupported)?;
    let (path, expected) = body
        .as_object()
        .and_then(|b| b.iter().next())
        .ok_or_else(unsupported)?;
    let expected = scalar_to_string(expected).ok_or_else(unsupported)?;

    match kind.as_str() {
        "term" => Ok(leaf_strings_at(doc, path).iter().any(|v| *v == expected)),
        "match" => Ok(tokens_match(doc, path, &expected)),
        _ => Err(unsupported()),
    }
}

/// AND semantics: every token of `raw` must appear among the field's tokens.
/// A value without any token matches nothing.
fn tokens_match(doc: &Value, path: &str, raw: &str) -> bool {
    let wanted = tokenize(raw);
    if wanted.is_empty() {
        return false;
    }
    let available: Vec<String> = leaf_strings_at(doc, path)
        .iter()
        .flat_map(|leaf| tokenize(leaf))
        .collect();
    wanted.iter().all(|t| available.contains(t))
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn leaf_strings_at(doc: &Value, path: &str) -> Vec<String> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            collect_field(value, segment, &mut next);
        }
        current = next;
    }

    let mut leaves = Vec::new();
    for value in current {
        collect_leaves(value, &mut leaves);
    }
    leaves
}

fn collect_field<'a>(value: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_field(item, segment, out);
            }
        }
        Value::Object(map) => {
            if let Some(child) = map.get(segment) {
                out.push(child);
            }
        }
        _ => {}
    }
}

fn collect_leaves(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_leaves(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_leaves(v, out)),
        other => {
            if let Some(s) = scalar_to_string(other) {
                out.push(s);
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
