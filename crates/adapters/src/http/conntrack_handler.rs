use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use domain::conntrack::entity::{ConnectionStatus, QueryParams, QueryProtocol};
use serde::{Deserialize, Serialize};

use super::state::AppState;

/// Body returned when no entry matches.
pub const NOT_FOUND_MESSAGE: &str = "connection not found";

// ── Query params ─────────────────────────────────────────────────

/// Raw query string. Every field is optional and numeric fields that do
/// not parse fall back to zero instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ConntrackQueryParams {
    pub protocol: Option<String>,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub src_port: Option<String>,
    pub dst_port: Option<String>,
}

impl ConntrackQueryParams {
    pub fn into_params(self) -> QueryParams {
        QueryParams {
            protocol: QueryProtocol::parse(self.protocol.as_deref().unwrap_or_default()),
            src_ip: self.src_ip.unwrap_or_default(),
            dst_ip: self.dst_ip.unwrap_or_default(),
            src_port: lenient_port(self.src_port.as_deref()),
            dst_port: lenient_port(self.dst_port.as_deref()),
        }
    }
}

fn lenient_port(raw: Option<&str>) -> u16 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

// ── Response DTOs ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Found(ConnectionStatus),
    Error { error: String },
}

// ── Handlers ──────────────────────────────────────────────────────

/// `GET /api/conntrack/query`
///
/// Always answers 200; absence and failures are reported in the body.
pub async fn query_connection(
    State(state): State<Arc<AppState>>,
    Query(raw): Query<ConntrackQueryParams>,
) -> Json<QueryResponse> {
    let params = raw.into_params();
    let response = match state.query_service.query(&params).await {
        Ok(Some(status)) => QueryResponse::Found(status),
        Ok(None) => QueryResponse::Error {
            error: NOT_FOUND_MESSAGE.to_string(),
        },
        Err(e) => QueryResponse::Error {
            error: e.to_string(),
        },
    };
    Json(response)
}
