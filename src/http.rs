//! HTTP capabilities: plain file fetches and the daemon management API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{NodeError, Result};
use crate::node::metrics::{BlockHeader, BlockMetrics};

const USER_AGENT: &str = "nodekit";
const TOKEN_HEADER: &str = "X-Algod-API-Token";

/// GET file content, POST JSON.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>>;

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<Vec<u8>>;
}

/// Management API of a running daemon.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Prometheus-style metrics text.
    async fn metrics_text(&self) -> Result<String>;

    /// TPS and mean round time over `first..=last`.
    async fn block_metrics(&self, first: u64, last: u64) -> Result<BlockMetrics>;

    /// Latest round the node has seen.
    async fn last_round(&self) -> Result<u64>;
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(NodeError::Unauthorized),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(NodeError::Status {
                code: status.as_u16(),
                body,
            })
        }
    }
}

pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url, "GET");
        let response = check_status(self.client.get(url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<Vec<u8>> {
        debug!(url, "POST");
        let response = check_status(self.client.post(url).json(body).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    block: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(rename = "last-round")]
    last_round: u64,
}

/// reqwest-backed [`NodeApi`].
pub struct AlgodClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl AlgodClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Client for $ALGOD_URL / $ALGOD_TOKEN.
    pub fn from_env() -> Result<Self> {
        Self::new(&crate::clienv::algod_url(), crate::clienv::algod_token())
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        check_status(request.send().await?).await
    }

    async fn block_header(&self, round: u64) -> Result<BlockHeader> {
        let response = self
            .get(&format!("/v2/blocks/{round}?header-only=true&format=json"))
            .await?;
        Ok(response.json::<BlockResponse>().await?.block)
    }
}

#[async_trait]
impl NodeApi for AlgodClient {
    async fn metrics_text(&self) -> Result<String> {
        Ok(self.get("/metrics").await?.text().await?)
    }

    async fn block_metrics(&self, first: u64, last: u64) -> Result<BlockMetrics> {
        let from = self.block_header(first).await?;
        let to = self.block_header(last).await?;
        Ok(BlockMetrics::between(&from, &to, last.saturating_sub(first)))
    }

    async fn last_round(&self) -> Result<u64> {
        Ok(self.get("/v2/status").await?.json::<StatusResponse>().await?.last_round)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies by URL and records POSTs.
    #[derive(Default)]
    pub struct FakeFetch {
        pub bodies: HashMap<String, Vec<u8>>,
        pub gets: Mutex<Vec<String>>,
        pub posts: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl FakeFetch {
        pub fn serve(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }

        pub fn gets(&self) -> Vec<String> {
            self.gets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpFetch for FakeFetch {
        async fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.gets.lock().unwrap().push(url.to_string());
            self.bodies.get(url).cloned().ok_or(NodeError::Status {
                code: 404,
                body: String::new(),
            })
        }

        async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<Vec<u8>> {
            self.posts
                .lock()
                .unwrap()
                .push((url.to_string(), body.clone()));
            self.bodies.get(url).cloned().ok_or(NodeError::Status {
                code: 404,
                body: String::new(),
            })
        }
    }
}
