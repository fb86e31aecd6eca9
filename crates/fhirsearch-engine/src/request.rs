//! Search request types.

use std::collections::HashSet;

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Value of a query parameter: single or repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    Multiple(Vec<String>),
}

impl ParamValue {
    /// Iterates over every value, in request order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::Multiple(vs) => vs,
        };
        slice.iter().map(String::as_str)
    }

    /// Returns the first value.
    pub fn first(&self) -> Option<&str> {
        self.values().next()
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(existing) => {
                *self = Self::Multiple(vec![std::mem::take(existing), value]);
            }
            Self::Multiple(vs) => vs.push(value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

/// Insertion-ordered query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(IndexMap<String, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a URL query string (with or without the leading `?`).
    ///
    /// Repeated keys are merged into [`ParamValue::Multiple`], keeping the
    /// position of the first occurrence.
    pub fn parse(query: &str) -> Self {
        let mut params = Self::new();
        let query = query.strip_prefix('?').unwrap_or(query);
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            params.append(name.into_owned(), value.into_owned());
        }
        params
    }

    /// Sets a parameter, replacing any previous value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder form of [`QueryParams::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds a value, turning an existing parameter into a repeated one.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        match self.0.entry(name.into()) {
            Entry::Occupied(mut entry) => entry.get_mut().push(value),
            Entry::Vacant(entry) => {
                entry.insert(ParamValue::Single(value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// First value of a parameter.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(ParamValue::first)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encodes the parameters as a URL query string (without the leading `?`).
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.iter() {
            for v in value.values() {
                serializer.append_pair(name, v);
            }
        }
        serializer.finish()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// A type-level search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub resource_type: String,
    pub query_params: QueryParams,
    /// Server base URL used for `fullUrl` and pagination links.
    pub base_url: String,
    /// Resource types the caller may read. Inclusion queries against any other
    /// type are never sent.
    pub allowed_resource_types: HashSet<String>,
}

impl SearchRequest {
    pub fn new(resource_type: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            query_params: QueryParams::new(),
            base_url: base_url.into(),
            allowed_resource_types: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.query_params = params;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn allow_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_resource_types
            .extend(types.into_iter().map(Into::into));
        self
    }

    /// Case-insensitive access check for a resource type or collection name.
    pub fn is_type_allowed(&self, name: &str) -> bool {
        self.allowed_resource_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merges_repeated_keys() {
        let params = QueryParams::parse("?name=Smith&_include=Observation:patient&name=John%20Paul");
        assert_eq!(params.len(), 2);
        assert_eq!(
            params.get("name"),
            Some(&ParamValue::Multiple(vec![
                "Smith".to_string(),
                "John Paul".to_string()
            ]))
        );
        assert_eq!(params.first("_include"), Some("Observation:patient"));
    }

    #[test]
    fn test_query_string_keeps_order() {
        let params = QueryParams::new()
            .with("name", "Smith")
            .with("_count", "10")
            .with("given", vec!["a b".to_string(), "c".to_string()]);
        assert_eq!(params.to_query_string(), "name=Smith&_count=10&given=a+b&given=c");
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut params = QueryParams::parse("a=1&b=2&c=3");
        params.insert("b", "20");
        assert_eq!(params.to_query_string(), "a=1&b=20&c=3");
    }

    #[test]
    fn test_type_allowed_is_case_insensitive() {
        let request = SearchRequest::new("Patient", "https://fhir.example.com")
            .allow_types(["Patient", "Observation"]);
        assert!(request.is_type_allowed("observation"));
        assert!(request.is_type_allowed("PATIENT"));
        assert!(!request.is_type_allowed("practitioner"));
    }
}
