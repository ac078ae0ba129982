use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// HTTP client for a running watcher's API.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

// ── Response DTOs ──────────────────────────────────────────────────────

#[derive(Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Deserialize, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub subscription_live: bool,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TupleResponse {
    pub src: String,
    pub dst: String,
    pub src_port: u16,
    pub dst_port: u16,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConnectionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub origin: TupleResponse,
    pub reply: TupleResponse,
}

/// Body of `GET /api/conntrack/query`: either a connection or an error.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum QueryResponse {
    Found(ConnectionResponse),
    Error { error: String },
}

/// Criteria sent to the query endpoint.
pub struct TupleQuery<'a> {
    pub protocol: &'a str,
    pub src_ip: &'a str,
    pub dst_ip: &'a str,
    pub src_port: u16,
    pub dst_port: u16,
}

impl ApiClient {
    pub fn new(host: &str, port: u16) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("http://{host}:{port}"),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
    }

    // ── Health ──────────────────────────────────────────────────────

    pub async fn healthz(&self) -> anyhow::Result<HealthResponse> {
        let resp = self
            .request(reqwest::Method::GET, "/healthz")
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        handle_response(resp).await
    }

    /// Readiness. A 503 still carries a readable body.
    pub async fn readyz(&self) -> anyhow::Result<ReadyResponse> {
        let resp = self
            .request(reqwest::Method::GET, "/readyz")
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return resp
                .json::<ReadyResponse>()
                .await
                .context("failed to parse response body");
        }
        handle_response(resp).await
    }

    // ── Conntrack ───────────────────────────────────────────────────

    pub async fn query_connection(&self, query: &TupleQuery<'_>) -> anyhow::Result<QueryResponse> {
        let resp = self
            .request(reqwest::Method::GET, "/api/conntrack/query")
            .query(&[
                ("protocol", query.protocol.to_string()),
                ("src_ip", query.src_ip.to_string()),
                ("dst_ip", query.dst_ip.to_string()),
                ("src_port", query.src_port.to_string()),
                ("dst_port", query.dst_port.to_string()),
            ])
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        handle_response(resp).await
    }
}

fn connection_error(base_url: &str, err: &reqwest::Error) -> anyhow::Error {
    if err.is_connect() {
        anyhow::anyhow!("cannot connect to conntrack-watch at {base_url}, is it running?")
    } else if err.is_timeout() {
        anyhow::anyhow!("connection to conntrack-watch at {base_url} timed out")
    } else {
        anyhow::anyhow!("request to conntrack-watch failed: {err}")
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> anyhow::Result<T> {
    if resp.status().is_success() {
        return resp
            .json::<T>()
            .await
            .context("failed to parse response body");
    }
    bail!("request failed with status {}", resp.status());
}
