//! `DriverConfig` (§3, §10): deserialized from the `runner` CLI's
//! `driver_config_json` positional argument. Unset optional fields fall back
//! to the documented defaults rather than failing.

use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_QUEUE_MAX_SIZE: usize = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

fn default_queue_max_size() -> usize {
    DEFAULT_QUEUE_MAX_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Deserialize)]
pub struct DriverConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub query_log_path: Option<PathBuf>,
    #[serde(default = "default_queue_max_size")]
    pub queue_max_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl DriverConfig {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_fields_fall_back_to_defaults() {
        let config = DriverConfig::parse(r#"{"path": "/tmp/db.sqlite"}"#).unwrap();
        assert_eq!(config.queue_max_size, DEFAULT_QUEUE_MAX_SIZE);
        assert_eq!(config.default_timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.query_log_path.is_none());
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let config = DriverConfig::parse(
            r#"{"path": "/tmp/db.sqlite", "queue_max_size": 42, "query_log_path": "/tmp/j.jsonl"}"#,
        )
        .unwrap();
        assert_eq!(config.queue_max_size, 42);
        assert_eq!(config.query_log_path, Some(PathBuf::from("/tmp/j.jsonl")));
    }
}
