//! Client for the product RAG question-answering service.
//!
//! Retrieval, embeddings, and generation all live behind the collaborator's
//! `GET /products/qa?query=` endpoint; the gateway proxies user questions to
//! it verbatim. This module carries only the wire contract.

use crate::outlet_service::LookupError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Answer grounded in retrieved product documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductAnswer {
    pub answer: String,
    /// Product titles or ids used as grounding sources.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Seam between the gateway and the product RAG collaborator.
#[async_trait::async_trait]
pub trait ProductAnswerer: Send + Sync {
    async fn answer(&self, query: &str) -> Result<ProductAnswer, LookupError>;
}

pub struct ProductQaClient {
    base_url: String,
    client: reqwest::Client,
}

impl ProductQaClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl ProductAnswerer for ProductQaClient {
    async fn answer(&self, query: &str) -> Result<ProductAnswer, LookupError> {
        let url = format!("{}/products/qa", self.base_url);
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
