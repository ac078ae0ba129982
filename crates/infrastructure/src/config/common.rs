//! Shared parsing helpers and error types for the config module.

use std::net::{Ipv4Addr, ToSocketAddrs};

// ── Config errors ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },
}

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Yaml(e.to_string())
    }
}

// ── Shared serde defaults ──────────────────────────────────────────

pub(super) fn default_true() -> bool {
    true
}

// ── Parsing helpers ────────────────────────────────────────────────

/// Normalize and check a listen address.
///
/// Accepts `host:port` (host names included), `[v6]:port`, and the short
/// form `:port`, which binds every IPv4 interface. Returns the address in
/// a form `TcpListener::bind` resolves.
pub fn parse_listen_addr(field: &str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    let invalid = |message: String| ConfigError::Validation {
        field: field.to_string(),
        message,
    };

    if let Some(port) = value.strip_prefix(':') {
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid(format!("invalid port in '{value}'")))?;
        return Ok(format!("{}:{port}", Ipv4Addr::UNSPECIFIED));
    }

    let mut resolved = value
        .to_socket_addrs()
        .map_err(|e| invalid(format!("invalid listen address '{value}': {e}")))?;
    if resolved.next().is_none() {
        return Err(invalid(format!("listen address '{value}' resolves to nothing")));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_binds_all_interfaces() {
        let addr = parse_listen_addr("listen_addr", ":9358").unwrap();
        assert_eq!(addr, "0.0.0.0:9358");
    }

    #[test]
    fn full_forms() {
        assert_eq!(parse_listen_addr("f", "127.0.0.1:8080").unwrap(), "127.0.0.1:8080");
        assert_eq!(parse_listen_addr("f", " [::1]:9358 ").unwrap(), "[::1]:9358");
        assert_eq!(parse_listen_addr("f", "localhost:9358").unwrap(), "localhost:9358");
    }

    #[test]
    fn invalid_forms_name_the_field() {
        for bad in ["", ":", ":70000", "localhost", "9358", "1.2.3.4:x"] {
            let err = parse_listen_addr("prometheus.listen_addr", bad).unwrap_err();
            assert!(
                err.to_string().contains("prometheus.listen_addr"),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn yaml_error_converts() {
        let err: ConfigError = serde_yaml_ng::from_str::<Vec<u16>>("[not a number")
            .unwrap_err()
            .into();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
