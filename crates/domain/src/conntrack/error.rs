use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnTrackError {
    /// The kernel table has no entry for the requested tuple.
    #[error("no such conntrack entry")]
    NoSuchEntry,

    /// The conntrack table cannot answer for this family/protocol.
    #[error("conntrack table unavailable (errno {errno})")]
    TableUnavailable { errno: i32 },

    #[error("conntrack transport error: {0}")]
    Transport(String),

    #[error("malformed conntrack message: {0}")]
    Protocol(String),

    #[error("conntrack query timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("conntrack subscription failed: {0}")]
    Subscription(String),
}

impl ConnTrackError {
    /// Whether this error only signals that the entry is absent.
    ///
    /// Such errors are answered as "connection not found" rather than
    /// surfaced as failures.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::NoSuchEntry | Self::TableUnavailable { .. })
    }
}

impl From<std::io::Error> for ConnTrackError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absence_kinds() {
        assert!(ConnTrackError::NoSuchEntry.is_absence());
        assert!(ConnTrackError::TableUnavailable { errno: 97 }.is_absence());
        assert!(!ConnTrackError::Transport("socket closed".to_string()).is_absence());
        assert!(!ConnTrackError::Timeout { after_ms: 10 }.is_absence());
        assert!(!ConnTrackError::Protocol("short header".to_string()).is_absence());
    }

    #[test]
    fn io_error_is_transport() {
        let err = ConnTrackError::from(std::io::Error::other("boom"));
        assert!(matches!(err, ConnTrackError::Transport(_)));
        assert!(!err.is_absence());
    }

    #[test]
    fn timeout_message_names_deadline() {
        let err = ConnTrackError::Timeout { after_ms: 2000 };
        assert_eq!(err.to_string(), "conntrack query timed out after 2000ms");
    }
}
