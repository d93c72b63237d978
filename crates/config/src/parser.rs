use crate::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FeedConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());

    parse_config(&content)
}

/// Substitute environment variables and parse YAML content.
pub fn parse_config(content: &str) -> Result<FeedConfig> {
    let substituted = substitution::substitute_env_vars(content)?;
    debug!("Environment variable substitution completed");

    let config: FeedConfig = serde_yaml::from_str(&substituted)
        .with_context(|| "Failed to parse YAML configuration")?;

    info!(
        symbols = ?config.feed.symbols,
        "Configuration loaded successfully"
    );
    Ok(config)
}

#[instrument]
pub fn generate_default_config() -> FeedConfig {
    FeedConfig {
        service: ServiceConfig::default(),
        server: ListenConfig::default(),
        upstream: UpstreamConfig::default(),
        feed: FeedSettings::default(),
        baseline: BaselineConfig::default(),
        option_chain: Some(OptionChainConfig::default()),
        logging: Some(LoggingConfig::default()),
        metrics: Some(MetricsConfig::default()),
    }
}

#[instrument]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &FeedConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}
