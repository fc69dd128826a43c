//! Client for the outlet Text2SQL lookup service.
//!
//! The service takes a natural-language query string (`GET /outlets?query=`)
//! and answers with `{summary?, results?}`; absent fields mean "no data".
//! SQL generation quality is the service's problem, not ours; this module
//! only speaks the wire contract.

use serde::Deserialize;
use std::time::Duration;

/// Failure taxonomy for collaborator lookups. The dispatcher converts these
/// into an apologetic user-facing message; they never propagate further.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("lookup service answered {status}")]
    Api { status: reqwest::StatusCode },
}

/// Wire reply from the outlet service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutletReply {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub results: Vec<String>,
}

/// Seam between the dispatcher and the outlet collaborator.
#[async_trait::async_trait]
pub trait OutletLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<OutletReply, LookupError>;
}

/// Production client for the outlet service.
pub struct OutletApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl OutletApiClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl OutletLookup for OutletApiClient {
    async fn lookup(&self, query: &str) -> Result<OutletReply, LookupError> {
        let url = format!("{}/outlets", self.base_url);
        let res = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(LookupError::Api { status: res.status() });
        }
        Ok(res.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_reply_fields_mean_no_data() {
        let reply: OutletReply = serde_json::from_str("{}").unwrap();
        assert!(reply.summary.is_none());
        assert!(reply.results.is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let client = OutletApiClient::new("http://127.0.0.1:1");
        let err = client.lookup("Show me all outlets.").await.unwrap_err();
        assert!(matches!(err, LookupError::Transport(_)));
    }
}
