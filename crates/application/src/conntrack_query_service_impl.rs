use std::sync::Arc;
use std::time::Duration;

use domain::conntrack::entity::{ConnectionStatus, QueryParams};
use domain::conntrack::error::ConnTrackError;
use domain::conntrack::query::{ConntrackQuery, normalize_lookup};
use ports::secondary::conntrack_query_port::ConntrackQueryPort;
use ports::secondary::metrics_port::MetricsPort;

/// Answers point lookups against the conntrack table.
///
/// Each query opens its own session on the query port and releases it
/// before returning, whatever the outcome.
pub struct ConnTrackQueryService {
    source: Arc<dyn ConntrackQueryPort>,
    metrics: Arc<dyn MetricsPort>,
    timeout: Duration,
}

impl ConnTrackQueryService {
    pub fn new(
        source: Arc<dyn ConntrackQueryPort>,
        metrics: Arc<dyn MetricsPort>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            metrics,
            timeout,
        }
    }

    /// Look up the entry whose reply tuple matches `params`.
    ///
    /// `Ok(None)` means no matching entry, including the cases where the
    /// kernel reports the entry or the table as absent.
    pub async fn query(
        &self,
        params: &QueryParams,
    ) -> Result<Option<ConnectionStatus>, ConnTrackError> {
        let query = ConntrackQuery::from_params(params);
        let result = self.lookup(&query).await;

        self.metrics.record_query(result_label(&result));
        match &result {
            Ok(Some(status)) => tracing::debug!(
                protocol = query.protocol,
                src_ip = %query.src_ip,
                dst_ip = %query.dst_ip,
                src_port = query.src_port,
                dst_port = query.dst_port,
                status = status.status.as_deref().unwrap_or(""),
                "conntrack lookup matched"
            ),
            Ok(None) => tracing::debug!(
                protocol = query.protocol,
                src_ip = %query.src_ip,
                dst_ip = %query.dst_ip,
                src_port = query.src_port,
                dst_port = query.dst_port,
                "conntrack lookup found nothing"
            ),
            Err(e) => tracing::warn!(error = %e, "conntrack lookup failed"),
        }
        result
    }

    async fn lookup(
        &self,
        query: &ConntrackQuery,
    ) -> Result<Option<ConnectionStatus>, ConnTrackError> {
        let mut session = self.source.open_session()?;
        let outcome = tokio::time::timeout(self.timeout, session.lookup(query)).await;
        drop(session);

        match outcome {
            Ok(result) => normalize_lookup(query, result),
            Err(_) => Err(ConnTrackError::Timeout {
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

fn result_label(result: &Result<Option<ConnectionStatus>, ConnTrackError>) -> &'static str {
    match result {
        Ok(Some(_)) => "found",
        Ok(None) => "not_found",
        Err(ConnTrackError::Timeout { .. }) => "timeout",
        Err(_) => "error",
    }
}
