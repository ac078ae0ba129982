use std::time::Duration;

// ── Paths ──────────────────────────────────────────────────────────

pub const DEFAULT_CONFIG_PATH: &str = "/etc/conntrack-watch/config.yaml";
pub const DEFAULT_LOG_PATH: &str = "/var/log/nat-tracker/nat.log";

/// Log file used when the configured log directory cannot be created.
pub const FALLBACK_LOG_PATH: &str = "./nat.log";

// ── Network defaults ───────────────────────────────────────────────

pub const DEFAULT_LISTEN_ADDR: &str = ":9358";
pub const DEFAULT_HTTP_PORT: u16 = 9358;

// ── Channel capacities ─────────────────────────────────────────────

pub const EVENT_CHANNEL_CAPACITY: usize = 10_000;

// ── Timeouts ───────────────────────────────────────────────────────

pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 2_000;
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
