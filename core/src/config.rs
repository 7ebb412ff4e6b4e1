//! # Declarative startup configuration
//!
//! `hub-core` never loads configuration from any particular external system (file watchers,
//! remote config services); it only defines the typed, `serde`-derived shape one is expected to
//! take. A thin `main.rs` assembles a [`HubConfig`] (from TOML, JSON, or environment overlay) and
//! hands it to the library, the same way the trading-engine crates this codebase grew from
//! aggregate their own sub-configs into one `SystemConfig` rather than scattering bare constants.

use serde::{Deserialize, Serialize};

/// Where the upstream domain-event transport reads from, and at what offset to resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpstreamSource {
    /// Tailed directory of append-only log files, as the file-tail transport contract describes.
    FileTail { directory: String },
    /// A single partitioned log topic address.
    LogTopic { address: String },
}

/// History query defaults, applied when a subscriber omits or exceeds the bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub default_depth: usize,
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_depth: 10,
            max_depth: 1024,
        }
    }
}

/// Top-level configuration for one hub process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Address the websocket server binds to, e.g. `"0.0.0.0:8765"`.
    pub websocket_bind: String,
    /// Filesystem path of the key-value store.
    pub store_path: String,
    pub upstream: UpstreamSource,
    /// Offset to resume from if the store has no persisted offset yet.
    #[serde(default)]
    pub start_offset: i64,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl HubConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Applies `HUB_*` environment variable overrides on top of a base config, matching the
    /// precedence order (file, then env) the trading-engine `SystemConfig` loader uses.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(bind) = std::env::var("HUB_WEBSOCKET_BIND") {
            self.websocket_bind = bind;
        }
        if let Ok(path) = std::env::var("HUB_STORE_PATH") {
            self.store_path = path;
        }
        if let Ok(offset) = std::env::var("HUB_START_OFFSET") {
            if let Ok(parsed) = offset.parse() {
                self.start_offset = parsed;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_with_file_tail_upstream() {
        let toml = r#"
            websocket_bind = "0.0.0.0:8765"
            store_path = "/var/lib/hub/db"
            start_offset = 0

            [upstream]
            kind = "file_tail"
            directory = "/var/lib/hub/blocks"
        "#;
        let config = HubConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.websocket_bind, "0.0.0.0:8765");
        assert!(matches!(config.upstream, UpstreamSource::FileTail { .. }));
        assert_eq!(config.history.max_depth, 1024);
    }

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var("HUB_WEBSOCKET_BIND", "127.0.0.1:9000");
        let base = HubConfig {
            websocket_bind: "0.0.0.0:8765".into(),
            store_path: "/tmp/db".into(),
            upstream: UpstreamSource::LogTopic {
                address: "topic://events".into(),
            },
            start_offset: 0,
            history: HistoryConfig::default(),
        };
        let config = base.apply_env_overrides();
        assert_eq!(config.websocket_bind, "127.0.0.1:9000");
        std::env::remove_var("HUB_WEBSOCKET_BIND");
    }
}
