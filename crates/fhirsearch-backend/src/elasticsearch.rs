//! Elasticsearch/OpenSearch backend over HTTP.
//!
//! Single queries go to `POST /{index}/_search`, batches to `POST /_msearch`
//! as NDJSON. A `404` carrying `index_not_found_exception` is reported as
//! [`BackendError::CollectionNotFound`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::error::BackendError;
use crate::query::{SearchResponse, StructuredQuery};
use crate::traits::{MultiSearchItem, SearchBackend};

const INDEX_NOT_FOUND: &str = "index_not_found_exception";

/// Configuration for [`ElasticsearchBackend`].
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster node (e.g. `http://localhost:9200`).
    pub node: Url,
    /// Optional prefix prepended to every collection name (`{prefix}{collection}`).
    pub index_prefix: Option<String>,
    /// HTTP request timeout (default: 30 seconds).
    pub request_timeout: Duration,
}

impl ElasticsearchConfig {
    /// Creates a configuration for the given node.
    ///
    /// A node path such as `http://proxy/es` is kept as a prefix of every
    /// endpoint.
    #[must_use]
    pub fn new(node: Url) -> Self {
        Self {
            node: with_trailing_slash(node),
            index_prefix: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the index prefix.
    #[must_use]
    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = Some(prefix.into());
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Search backend talking to an Elasticsearch compatible cluster.
pub struct ElasticsearchBackend {
    http_client: reqwest::Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchBackend {
    /// Creates a backend with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Internal` if the HTTP client cannot be created.
    pub fn new(config: ElasticsearchConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            config: ElasticsearchConfig {
                node: with_trailing_slash(config.node),
                ..config
            },
        })
    }

    fn index_name(&self, collection: &str) -> String {
        match &self.config.index_prefix {
            Some(prefix) => format!("{prefix}{collection}"),
            None => collection.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.config
            .node
            .join(path)
            .map_err(|e| BackendError::internal(format!("invalid endpoint {path}: {e}")))
    }

    async fn post(
        &self,
        url: Url,
        content_type: &str,
        body: String,
    ) -> Result<(reqwest::StatusCode, Value), BackendError> {
        let response = self
            .http_client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| BackendError::unavailable(e.to_string()))?;

        let status = response.status();
        let payload = response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::internal(format!("invalid response body: {e}")))?;

        Ok((status, payload))
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn search(&self, query: &StructuredQuery) -> Result<SearchResponse, BackendError> {
        let index = self.index_name(&query.collection);
        let url = self.endpoint(&format!("{index}/_search"))?;
        debug!(index = %index, "executing search");

        let (status, payload) = self
            .post(url, "application/json", query.to_request_body().to_string())
            .await?;

        if !status.is_success() {
            return Err(error_from_payload(&query.collection, &payload));
        }
        parse_search_response(&payload)
    }

    async fn multi_search(
        &self,
        queries: &[StructuredQuery],
    ) -> Result<Vec<MultiSearchItem>, BackendError> {
        let mut body = String::new();
        for query in queries {
            let header = json!({ "index": self.index_name(&query.collection) });
            body.push_str(&header.to_string());
            body.push('\n');
            body.push_str(&query.to_request_body().to_string());
            body.push('\n');
        }

        let url = self.endpoint("_msearch")?;
        debug!(queries = queries.len(), "executing multi search");
        let (status, payload) = self.post(url, "application/x-ndjson", body).await?;

        if !status.is_success() {
            return Err(BackendError::query(error_reason(&payload)));
        }

        let responses = payload
            .get("responses")
            .and_then(Value::as_array)
            .ok_or_else(|| BackendError::internal("multi search response without responses"))?;

        if responses.len() != queries.len() {
            return Err(BackendError::internal(format!(
                "multi search returned {} responses for {} queries",
                responses.len(),
                queries.len()
            )));
        }

        Ok(queries
            .iter()
            .zip(responses)
            .map(|(query, item)| {
                if item.get("error").is_some() {
                    Err(error_from_payload(&query.collection, item))
                } else {
                    parse_search_response(item)
                }
            })
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "elasticsearch"
    }
}

/// `Url::join` replaces the last path segment unless the base ends with `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn error_from_payload(collection: &str, payload: &Value) -> BackendError {
    let kind = payload
        .pointer("/error/type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if kind == INDEX_NOT_FOUND {
        BackendError::collection_not_found(collection)
    } else {
        BackendError::query(error_reason(payload))
    }
}

fn error_reason(payload: &Value) -> String {
    payload
        .pointer("/error/reason")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| payload.to_string())
}

fn parse_search_response(payload: &Value) -> Result<SearchResponse, BackendError> {
    let hits = payload
        .get("hits")
        .ok_or_else(|| BackendError::internal("search response without hits"))?;

    // `hits.total` is an object since ES 7 and a plain number before.
    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(obj) => obj.get("value").and_then(Value::as_u64).unwrap_or(0),
        None => 0,
    };

    let documents = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|hit| hit.get("_source").cloned())
                .collect()
        })
        .unwrap_or_default();

    Ok(SearchResponse::new(total, documents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FieldMatch;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn backend_for(server: &MockServer) -> ElasticsearchBackend {
        let node = Url::parse(&server.uri()).unwrap();
        ElasticsearchBackend::new(ElasticsearchConfig::new(node)).unwrap()
    }

    fn hits_body(total: u64, ids: &[&str]) -> Value {
        let hits: Vec<Value> = ids
            .iter()
            .map(|id| json!({"_id": id, "_source": {"resourceType": "Patient", "id": id}}))
            .collect();
        json!({"hits": {"total": {"value": total, "relation": "eq"}, "hits": hits}})
    }

    #[tokio::test]
    async fn test_search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/patient/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits_body(42, &["p1", "p2"])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let query = StructuredQuery::new("patient").with_match(FieldMatch::new("name", "smith"));
        let response = backend.search(&query).await.unwrap();

        assert_eq!(response.total, 42);
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.hits[1]["id"], "p2");
    }

    #[tokio::test]
    async fn test_node_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/es/patient/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits_body(1, &["p1"])))
            .expect(1)
            .mount(&server)
            .await;

        let node = Url::parse(&format!("{}/es", server.uri())).unwrap();
        let config = ElasticsearchConfig::new(node);
        assert_eq!(config.node.path(), "/es/");

        let backend = ElasticsearchBackend::new(config).unwrap();
        let response = backend.search(&StructuredQuery::new("patient")).await.unwrap();
        assert_eq!(response.total, 1);
    }

    #[test]
    fn test_trailing_slash_added_once() {
        let url = with_trailing_slash(Url::parse("http://localhost:9200").unwrap());
        assert_eq!(url.as_str(), "http://localhost:9200/");
        let url = with_trailing_slash(Url::parse("http://proxy/es/").unwrap());
        assert_eq!(url.as_str(), "http://proxy/es/");
    }

    #[tokio::test]
    async fn test_search_missing_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/observation/_search"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"type": "index_not_found_exception", "reason": "no such index [observation]"},
                "status": 404
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let err = backend
            .search(&StructuredQuery::new("observation"))
            .await
            .unwrap_err();
        assert!(err.is_collection_not_found());
    }

    #[tokio::test]
    async fn test_search_other_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/patient/_search"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"type": "parsing_exception", "reason": "unknown query"},
                "status": 400
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let err = backend
            .search(&StructuredQuery::new("patient"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::QueryError { ref message } if message == "unknown query"));
    }

    #[tokio::test]
    async fn test_index_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant1_patient/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(hits_body(0, &[])))
            .expect(1)
            .mount(&server)
            .await;

        let node = Url::parse(&server.uri()).unwrap();
        let backend =
            ElasticsearchBackend::new(ElasticsearchConfig::new(node).with_index_prefix("tenant1_"))
                .unwrap();
        let response = backend
            .search(&StructuredQuery::new("patient"))
            .await
            .unwrap();
        assert_eq!(response.total, 0);
    }

    #[tokio::test]
    async fn test_multi_search_item_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_msearch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responses": [
                    hits_body(1, &["p1"]),
                    {"error": {"type": "index_not_found_exception", "reason": "no such index"}, "status": 404},
                    {"error": {"type": "search_phase_execution_exception", "reason": "shard failure"}, "status": 500}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let items = backend
            .multi_search(&[
                StructuredQuery::new("patient"),
                StructuredQuery::new("device"),
                StructuredQuery::new("encounter"),
            ])
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().hits.len(), 1);
        assert!(items[1].as_ref().unwrap_err().is_collection_not_found());
        assert!(matches!(
            items[2].as_ref().unwrap_err(),
            BackendError::QueryError { .. }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let node = Url::parse("http://127.0.0.1:1").unwrap();
        let backend = ElasticsearchBackend::new(
            ElasticsearchConfig::new(node).with_request_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = backend
            .search(&StructuredQuery::new("patient"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
    }
}
