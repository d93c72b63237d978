use std::path::PathBuf;

pub fn default_service_name() -> String {
    "strikewatch".to_string()
}

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_http_port() -> u16 {
    3001
}

pub fn default_websocket_port() -> u16 {
    3002
}

pub fn default_upstream_base_url() -> String {
    "https://api.upstox.com/v2".to_string()
}

pub fn default_access_token() -> String {
    "${UPSTOX_ACCESS_TOKEN}".to_string()
}

/// Upstream hard limit on instrument keys per quote call
pub fn default_max_keys_per_request() -> usize {
    500
}

pub fn default_max_requests_per_minute() -> u32 {
    12
}

pub fn default_max_requests_per_30min() -> u32 {
    500
}

pub fn default_request_timeout_seconds() -> u64 {
    10
}

pub fn default_backoff_start_ms() -> u64 {
    60_000
}

pub fn default_backoff_max_ms() -> u64 {
    300_000
}

pub fn default_update_interval_ms() -> u64 {
    3_000
}

pub fn default_extra_interval_ms() -> u64 {
    10_000
}

pub fn default_symbols() -> Vec<String> {
    vec!["NIFTY".to_string(), "BANKNIFTY".to_string()]
}

pub fn default_symbol() -> String {
    "NIFTY".to_string()
}

pub fn default_baseline_directory() -> PathBuf {
    PathBuf::from("data/symbols")
}

pub fn default_fallback_snapshot() -> PathBuf {
    PathBuf::from("data/data.json")
}

pub fn default_option_chain_directory() -> PathBuf {
    PathBuf::from("data/options")
}

pub fn default_pair_count() -> usize {
    3
}

pub fn default_log_filter() -> String {
    "info".to_string()
}

pub fn default_metrics_port() -> u16 {
    9187
}
