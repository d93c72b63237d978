use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Root of the YAML configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub server: ListenConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub option_chain: Option<OptionChainConfig>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl FeedConfig {
    pub fn option_chain(&self) -> OptionChainConfig {
        self.option_chain.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    pub fn metrics(&self) -> MetricsConfig {
        self.metrics.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            websocket_port: default_websocket_port(),
        }
    }
}

/// Upstream quote API connection and request budget.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,
    /// Bearer token; usually `${UPSTOX_ACCESS_TOKEN}`
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_max_keys_per_request")]
    pub max_keys_per_request: usize,
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
    #[serde(default = "default_max_requests_per_30min")]
    pub max_requests_per_30min: u32,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_backoff_start_ms")]
    pub backoff_start_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl UpstreamConfig {
    /// The access token, or `None` when it is empty or still an unresolved `${VAR}`.
    pub fn resolved_access_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && !has_unresolved_env_vars(t))
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            access_token: Some(default_access_token()),
            max_keys_per_request: default_max_keys_per_request(),
            max_requests_per_minute: default_max_requests_per_minute(),
            max_requests_per_30min: default_max_requests_per_30min(),
            request_timeout_seconds: default_request_timeout_seconds(),
            backoff_start_ms: default_backoff_start_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

/// Polling cadence and the tracked symbol set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedSettings {
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_extra_interval_ms")]
    pub extra_interval_ms: u64,
    /// Enumeration order is also the batch priority order
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// The only symbol allowed to fall back to the bundled snapshot
    #[serde(default = "default_symbol")]
    pub default_symbol: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            extra_interval_ms: default_extra_interval_ms(),
            symbols: default_symbols(),
            default_symbol: default_symbol(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BaselineConfig {
    #[serde(default = "default_baseline_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub fallback_snapshot: Option<PathBuf>,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            directory: default_baseline_directory(),
            fallback_snapshot: Some(default_fallback_snapshot()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptionChainConfig {
    #[serde(default = "default_option_chain_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_pair_count")]
    pub default_count: usize,
}

impl Default for OptionChainConfig {
    fn default() -> Self {
        Self {
            directory: default_option_chain_directory(),
            default_count: default_pair_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormatSetting,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormatSetting::default(),
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
upstream:
  access_token: "abc123"
"#;
        let config: FeedConfig = serde_yaml::from_str(yaml).expect("Failed to parse YAML");

        assert_eq!(config.service.name, "strikewatch");
        assert_eq!(config.server.http_port, 3001);
        assert_eq!(config.upstream.base_url, "https://api.upstox.com/v2");
        assert_eq!(config.upstream.max_keys_per_request, 500);
        assert_eq!(config.upstream.max_requests_per_minute, 12);
        assert_eq!(config.upstream.max_requests_per_30min, 500);
        assert_eq!(config.feed.update_interval_ms, 3000);
        assert_eq!(config.feed.extra_interval_ms, 10000);
        assert_eq!(config.feed.symbols, vec!["NIFTY", "BANKNIFTY"]);
        assert_eq!(config.feed.default_symbol, "NIFTY");
        assert!(config.option_chain.is_none());
        assert_eq!(config.option_chain().default_count, 3);
        assert_eq!(config.upstream.resolved_access_token(), Some("abc123"));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
service:
  name: "feed-a"
server:
  host: "127.0.0.1"
  http_port: 8001
  websocket_port: 8002
upstream:
  base_url: "https://quotes.example.com/v2"
  access_token: "tok"
  max_requests_per_minute: 30
feed:
  update_interval_ms: 1500
  symbols: ["CRUDEOIL", "NIFTY"]
  default_symbol: "NIFTY"
baseline:
  directory: "/var/lib/feed/symbols"
option_chain:
  directory: "/var/lib/feed/options"
  default_count: 5
logging:
  format: json
  filter: "debug"
metrics:
  enabled: true
  port: 9100
"#;
        let config: FeedConfig = serde_yaml::from_str(yaml).expect("Failed to parse YAML");

        assert_eq!(config.service.name, "feed-a");
        assert_eq!(config.server.websocket_port, 8002);
        assert_eq!(config.upstream.max_requests_per_minute, 30);
        assert_eq!(config.upstream.max_requests_per_30min, 500);
        assert_eq!(config.feed.symbols, vec!["CRUDEOIL", "NIFTY"]);
        assert!(config.baseline.fallback_snapshot.is_none());
        assert_eq!(config.option_chain().default_count, 5);
        assert_eq!(config.logging().format, LogFormatSetting::Json);
        assert!(config.metrics().enabled);
        assert_eq!(config.metrics().port, 9100);
    }

    #[test]
    fn test_unresolved_token_is_not_a_token() {
        let mut upstream = UpstreamConfig::default();
        assert_eq!(upstream.resolved_access_token(), None);

        upstream.access_token = Some("   ".to_string());
        assert_eq!(upstream.resolved_access_token(), None);

        upstream.access_token = None;
        assert_eq!(upstream.resolved_access_token(), None);
    }
}
