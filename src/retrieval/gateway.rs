//! Gateway to the external Index Store.
//!
//! A pure adapter with no state beyond the HTTP client: one search
//! request out, one ranked passage list back. Unreachable stores and
//! malformed responses surface as
//! [`AgentError::RetrievalUnavailable`]; the controller owns retry
//! and degradation policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::passage::{Passage, SearchScope};
use crate::error::AgentError;

/// Trait for querying the Index Store.
#[async_trait]
pub trait RetrieverGateway: Send + Sync {
    /// Searches the Index Store, returning passages ordered by
    /// descending relevance score.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::RetrievalUnavailable`] if the store is
    /// unreachable or returns a malformed response.
    async fn search(
        &self,
        query: &str,
        scope: &SearchScope,
        top_k: usize,
    ) -> Result<Vec<Passage>, AgentError>;
}

/// Wire request for the Index Store search endpoint.
#[derive(Debug, Serialize)]
struct SearchRequestBody<'a> {
    query: &'a str,
    top_k: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    document_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude: Vec<crate::retrieval::PassageKey>,
}

/// Wire response from the Index Store search endpoint.
#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    results: Vec<SearchHit>,
}

/// A single ranked hit from the Index Store.
#[derive(Debug, Deserialize)]
struct SearchHit {
    document_id: String,
    location: String,
    text: String,
    score: f64,
}

/// HTTP-backed [`RetrieverGateway`] speaking the Index Store's JSON
/// search protocol.
#[derive(Debug, Clone)]
pub struct HttpRetrieverGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRetrieverGateway {
    /// Creates a gateway for the given search endpoint URL.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RetrieverGateway for HttpRetrieverGateway {
    async fn search(
        &self,
        query: &str,
        scope: &SearchScope,
        top_k: usize,
    ) -> Result<Vec<Passage>, AgentError> {
        let body = SearchRequestBody {
            query,
            top_k,
            document_ids: scope.document_ids.clone(),
            exclude: scope.exclude.clone(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::RetrievalUnavailable {
                message: format!("search request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::RetrievalUnavailable {
                message: format!("search endpoint returned HTTP {status}"),
            });
        }

        let parsed: SearchResponseBody =
            response
                .json()
                .await
                .map_err(|e| AgentError::RetrievalUnavailable {
                    message: format!("malformed search response: {e}"),
                })?;

        let mut passages: Vec<Passage> = parsed
            .results
            .into_iter()
            .map(|hit| Passage {
                document_id: hit.document_id,
                location: hit.location,
                text: hit.text,
                score: hit.score,
                graded_relevant: None,
            })
            .collect();

        // The store reports descending order; enforce it in case a
        // backend merges keyword and vector rankings inconsistently.
        passages.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(query, results = passages.len(), "index store search complete");
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_omits_empty_scope() {
        let body = SearchRequestBody {
            query: "submission deadline",
            top_k: 5,
            document_ids: Vec::new(),
            exclude: Vec::new(),
        };
        let json = serde_json::to_string(&body).unwrap_or_default();
        assert!(!json.contains("document_ids"));
        assert!(!json.contains("exclude"));
        assert!(json.contains("submission deadline"));
    }

    #[test]
    fn test_response_body_parses() {
        let json = r#"{"results": [
            {"document_id": "D1", "location": "p.4", "text": "$250,000", "score": 0.91},
            {"document_id": "D2", "location": "s.2", "text": "terms", "score": 0.55}
        ]}"#;
        let parsed: SearchResponseBody =
            serde_json::from_str(json).unwrap_or_else(|_| unreachable!());
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].document_id, "D1");
    }
}
