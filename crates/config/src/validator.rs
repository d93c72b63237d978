use crate::*;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("Service name is required")]
    MissingServiceName,

    #[error("Server host is required")]
    MissingHost,

    #[error("HTTP and WebSocket ports must differ, both are {0}")]
    PortCollision(u16),

    #[error("Invalid upstream base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("max_keys_per_request must be between 1 and 500, got: {0}")]
    InvalidBatchCeiling(usize),

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("backoff_max_ms ({max}) must not be smaller than backoff_start_ms ({start})")]
    InvalidBackoffRange { start: u64, max: u64 },

    #[error("At least one symbol must be configured")]
    NoSymbols,

    #[error("Symbol '{0}' is listed more than once")]
    DuplicateSymbol(String),

    #[error("Default symbol '{0}' is not in the symbol list")]
    DefaultSymbolNotListed(String),
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &FeedConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    if config.service.name.trim().is_empty() {
        report.add_error(ValidationError::MissingServiceName);
    }

    validate_server(&config.server, &mut report);
    validate_upstream(&config.upstream, &mut report);
    validate_feed(&config.feed, &mut report);
    validate_optional_sections(config, &mut report);

    report
}

fn validate_server(server: &ListenConfig, report: &mut ValidationReport) {
    if server.host.trim().is_empty() {
        report.add_error(ValidationError::MissingHost);
    }

    // Port 0 binds an ephemeral port on both listeners, which is allowed
    if server.http_port != 0 && server.http_port == server.websocket_port {
        report.add_error(ValidationError::PortCollision(server.http_port));
    }
}

fn validate_upstream(upstream: &UpstreamConfig, report: &mut ValidationReport) {
    match Url::parse(&upstream.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => report.add_error(ValidationError::InvalidBaseUrl {
            url: upstream.base_url.clone(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => report.add_error(ValidationError::InvalidBaseUrl {
            url: upstream.base_url.clone(),
            message: e.to_string(),
        }),
    }

    if upstream.max_keys_per_request == 0
        || upstream.max_keys_per_request > default_max_keys_per_request()
    {
        report.add_error(ValidationError::InvalidBatchCeiling(
            upstream.max_keys_per_request,
        ));
    }

    let positive = [
        ("upstream.max_requests_per_minute", upstream.max_requests_per_minute as u64),
        ("upstream.max_requests_per_30min", upstream.max_requests_per_30min as u64),
        ("upstream.request_timeout_seconds", upstream.request_timeout_seconds),
        ("upstream.backoff_start_ms", upstream.backoff_start_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            report.add_error(ValidationError::InvalidPositiveInteger {
                field: field.to_string(),
            });
        }
    }

    if upstream.backoff_max_ms < upstream.backoff_start_ms {
        report.add_error(ValidationError::InvalidBackoffRange {
            start: upstream.backoff_start_ms,
            max: upstream.backoff_max_ms,
        });
    }

    if upstream.resolved_access_token().is_none() {
        report.add_warning(
            "upstream.access_token",
            "Access token is missing or unresolved; quote requests will return no data",
        );
    }
}

fn validate_feed(feed: &FeedSettings, report: &mut ValidationReport) {
    if feed.update_interval_ms == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "feed.update_interval_ms".to_string(),
        });
    }
    if feed.extra_interval_ms == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "feed.extra_interval_ms".to_string(),
        });
    }
    if feed.extra_interval_ms < feed.update_interval_ms {
        report.add_warning(
            "feed.extra_interval_ms",
            "Extra feed polls faster than the primary feed and shares no budget with it",
        );
    }

    if feed.symbols.is_empty() {
        report.add_error(ValidationError::NoSymbols);
        return;
    }

    let mut seen = std::collections::HashSet::new();
    for symbol in &feed.symbols {
        if !seen.insert(symbol.as_str()) {
            report.add_error(ValidationError::DuplicateSymbol(symbol.clone()));
        }
    }

    if !feed.symbols.contains(&feed.default_symbol) {
        report.add_error(ValidationError::DefaultSymbolNotListed(
            feed.default_symbol.clone(),
        ));
    }
}

fn validate_optional_sections(config: &FeedConfig, report: &mut ValidationReport) {
    match &config.option_chain {
        None => report.add_default(
            "option_chain.directory",
            &default_option_chain_directory().display().to_string(),
        ),
        Some(chain) if chain.default_count == 0 => {
            report.add_error(ValidationError::InvalidPositiveInteger {
                field: "option_chain.default_count".to_string(),
            });
        }
        Some(_) => {}
    }

    if config.logging.is_none() {
        report.add_default("logging.format", "pretty");
    }

    match &config.metrics {
        None => report.add_default("metrics.enabled", "false"),
        Some(metrics) if metrics.enabled && metrics.port == 0 => {
            report.add_error(ValidationError::InvalidPositiveInteger {
                field: "metrics.port".to_string(),
            });
        }
        Some(_) => {}
    }

    if config.baseline.fallback_snapshot.is_none() {
        report.add_warning(
            "baseline.fallback_snapshot",
            "No bundled snapshot; the default symbol cannot fall back when its document is missing",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn valid_config() -> FeedConfig {
        let mut config = generate_default_config();
        config.upstream.access_token = Some("token".to_string());
        config
    }

    #[test]
    fn test_default_config_is_valid() {
        let report = validate_config(&valid_config());
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn test_missing_token_is_a_warning() {
        let mut config = valid_config();
        config.upstream.access_token = Some("${UPSTOX_ACCESS_TOKEN}".to_string());

        let report = validate_config(&config);
        assert!(report.is_valid());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.field == "upstream.access_token"));
    }

    #[test]
    fn test_default_symbol_must_be_listed() {
        let mut config = valid_config();
        config.feed.symbols = vec!["BANKNIFTY".to_string()];

        let report = validate_config(&config);
        assert!(!report.is_valid());
        assert_matches!(
            report.errors.as_slice(),
            [ValidationError::DefaultSymbolNotListed(s)] if s == "NIFTY"
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = valid_config();
        config.feed.update_interval_ms = 0;

        let report = validate_config(&config);
        assert_matches!(
            report.errors.as_slice(),
            [ValidationError::InvalidPositiveInteger { field }] if field == "feed.update_interval_ms"
        );
    }

    #[test]
    fn test_batch_ceiling_above_upstream_limit_rejected() {
        let mut config = valid_config();
        config.upstream.max_keys_per_request = 501;

        let report = validate_config(&config);
        assert_matches!(
            report.errors.as_slice(),
            [ValidationError::InvalidBatchCeiling(501)]
        );
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut config = valid_config();
        config.upstream.base_url = "ftp://quotes.example.com".to_string();

        let report = validate_config(&config);
        assert_matches!(
            report.errors.as_slice(),
            [ValidationError::InvalidBaseUrl { .. }]
        );
    }

    #[test]
    fn test_omitted_sections_record_defaults() {
        let mut config = valid_config();
        config.option_chain = None;
        config.logging = None;
        config.metrics = None;

        let report = validate_config(&config);
        assert!(report.is_valid());
        assert_eq!(report.defaults_applied.len(), 3);
    }
}
