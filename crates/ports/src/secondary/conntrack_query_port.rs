use std::future::Future;
use std::pin::Pin;

use domain::conntrack::entity::RawEventRecord;
use domain::conntrack::error::ConnTrackError;
use domain::conntrack::query::ConntrackQuery;

/// Future returned by [`ConntrackQuerySession::lookup`].
pub type LookupFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<RawEventRecord>, ConnTrackError>> + Send + 'a>>;

/// Secondary port for point lookups in the kernel conntrack table.
///
/// Every lookup runs on its own session, independent from the event
/// subscription. Sessions release their resources on drop.
pub trait ConntrackQueryPort: Send + Sync {
    /// Open a fresh session. Failure here is a transport error.
    fn open_session(&self) -> Result<Box<dyn ConntrackQuerySession>, ConnTrackError>;
}

/// A short-lived lookup channel.
///
/// Uses `Pin<Box<dyn Future>>` so the trait stays dyn-compatible.
pub trait ConntrackQuerySession: Send {
    /// Look up entries whose reply tuple matches `query`.
    fn lookup<'a>(&'a mut self, query: &'a ConntrackQuery) -> LookupFuture<'a>;
}
