//! Agent configuration: structs, parsing, and validation.
//!
//! - `common`: shared helpers and `ConfigError`

mod common;

pub use common::{ConfigError, parse_listen_addr};

use std::path::{Path, PathBuf};

use domain::conntrack::filter::DEFAULT_TARGET_PORTS;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LISTEN_ADDR, DEFAULT_LOG_PATH, DEFAULT_QUERY_TIMEOUT_MS};
use common::default_true;

/// Upper bound for `query.timeout_ms`.
const MAX_QUERY_TIMEOUT_MS: u64 = 60_000;

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Destination ports whose new TCP connections are reported.
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub prometheus: PrometheusConfig,

    #[serde(default)]
    pub web_ui: WebUiConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            log: LogConfig::default(),
            prometheus: PrometheusConfig::default(),
            web_ui: WebUiConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document is a valid config with every default.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ports.is_empty() {
            return Err(ConfigError::Validation {
                field: "ports".to_string(),
                message: "at least one port is required".to_string(),
            });
        }
        if self.ports.contains(&0) {
            return Err(ConfigError::Validation {
                field: "ports".to_string(),
                message: "port 0 is not a valid destination port".to_string(),
            });
        }

        self.prometheus.bind_addr()?;

        if self.query.timeout_ms == 0 || self.query.timeout_ms > MAX_QUERY_TIMEOUT_MS {
            return Err(ConfigError::Validation {
                field: "query.timeout_ms".to_string(),
                message: format!(
                    "{} must be between 1 and {MAX_QUERY_TIMEOUT_MS}",
                    self.query.timeout_ms
                ),
            });
        }

        Ok(())
    }

    /// Watched ports, sorted and deduplicated.
    pub fn target_ports(&self) -> Vec<u16> {
        let mut ports = self.ports.clone();
        ports.sort_unstable();
        ports.dedup();
        ports
    }
}

fn default_ports() -> Vec<u16> {
    DEFAULT_TARGET_PORTS.to_vec()
}

// ── Log section ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// File receiving JSON log lines. Empty disables the file output.
    #[serde(default = "default_log_path")]
    pub path: PathBuf,

    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Format of the stdout output. The file output is always JSON.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    // Rotation settings are accepted so existing files keep loading.
    // Rotation itself is left to logrotate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backups: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            level: default_log_level(),
            format: default_log_format(),
            max_size_mb: None,
            max_backups: None,
            max_age_days: None,
            compress: None,
        }
    }
}

impl LogConfig {
    /// Destination file, if file logging is enabled.
    pub fn file_path(&self) -> Option<&Path> {
        (!self.path.as_os_str().is_empty()).then_some(self.path.as_path())
    }

    /// Whether any rotation setting was given.
    pub fn has_rotation_settings(&self) -> bool {
        self.max_size_mb.is_some()
            || self.max_backups.is_some()
            || self.max_age_days.is_some()
            || self.compress.is_some()
    }
}

fn default_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_PATH)
}
fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// ── Prometheus / HTTP section ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Gates the whole HTTP server: metrics, query API and UI.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_listen_addr(),
        }
    }
}

impl PrometheusConfig {
    /// Address to hand to the listener; host names resolve at bind time.
    pub fn bind_addr(&self) -> Result<String, ConfigError> {
        parse_listen_addr("prometheus.listen_addr", &self.listen_addr)
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

// ── Web UI section ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebUiConfig {
    #[serde(default)]
    pub enabled: bool,
}

// ── Query section ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Deadline for a single conntrack lookup.
    #[serde(default = "default_query_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl QueryConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

// ── Log level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

// ── Log format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AgentConfig::from_yaml("").unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.target_ports(), vec![80, 443]);
        assert_eq!(config.log.path, PathBuf::from("/var/log/nat-tracker/nat.log"));
        assert_eq!(config.log.level, LogLevel::Info);
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(config.prometheus.enabled);
        assert_eq!(config.prometheus.listen_addr, ":9358");
        assert!(!config.web_ui.enabled);
        assert_eq!(config.query.timeout_ms, 2000);
    }

    #[test]
    fn full_config() {
        let yaml = r"
ports: [443, 8443, 443]
log:
  path: /tmp/conntrack.log
  level: debug
  format: text
prometheus:
  enabled: false
  listen_addr: 127.0.0.1:9100
web_ui:
  enabled: true
query:
  timeout_ms: 500
";
        let config = AgentConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.target_ports(), vec![443, 8443]);
        assert_eq!(config.log.file_path(), Some(Path::new("/tmp/conntrack.log")));
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Text);
        assert!(!config.prometheus.enabled);
        assert_eq!(config.prometheus.bind_addr().unwrap(), "127.0.0.1:9100");
        assert!(config.web_ui.enabled);
        assert_eq!(config.query.timeout(), std::time::Duration::from_millis(500));
    }

    #[test]
    fn host_name_listen_addr_accepted() {
        let config =
            AgentConfig::from_yaml("prometheus:\n  listen_addr: \"localhost:9358\"\n").unwrap();
        assert_eq!(config.prometheus.bind_addr().unwrap(), "localhost:9358");
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = AgentConfig::from_yaml("prometheus:\n  enabled: false\n").unwrap();
        assert!(!config.prometheus.enabled);
        assert_eq!(config.prometheus.listen_addr, ":9358");
        assert_eq!(config.ports, vec![80, 443]);
    }

    #[test]
    fn rotation_settings_are_accepted() {
        let yaml = r"
log:
  path: /var/log/nat-tracker/nat.log
  max_size_mb: 100
  max_backups: 10
  max_age_days: 7
  compress: true
";
        let config = AgentConfig::from_yaml(yaml).unwrap();
        assert!(config.log.has_rotation_settings());
        assert!(!AgentConfig::default().log.has_rotation_settings());
    }

    #[test]
    fn empty_log_path_disables_file() {
        let config = AgentConfig::from_yaml("log:\n  path: \"\"\n").unwrap();
        assert!(config.log.file_path().is_none());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(matches!(
            AgentConfig::from_yaml("portz: [80]"),
            Err(ConfigError::Yaml(_))
        ));
        assert!(matches!(
            AgentConfig::from_yaml("web_ui:\n  enable: true\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn out_of_range_port_rejected() {
        assert!(matches!(
            AgentConfig::from_yaml("ports: [70000]"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn validation_names_field() {
        let cases = [
            ("ports: []", "ports"),
            ("ports: [0, 80]", "ports"),
            ("prometheus:\n  listen_addr: nowhere\n", "prometheus.listen_addr"),
            ("query:\n  timeout_ms: 0\n", "query.timeout_ms"),
            ("query:\n  timeout_ms: 600000\n", "query.timeout_ms"),
        ];
        for (yaml, field) in cases {
            match AgentConfig::from_yaml(yaml) {
                Err(ConfigError::Validation { field: f, .. }) => assert_eq!(f, field, "{yaml}"),
                other => panic!("{yaml}: expected validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ports: [22]").unwrap();
        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.target_ports(), vec![22]);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = AgentConfig::load(Path::new("/nonexistent/conntrack-watch.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn log_level_parsing() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
