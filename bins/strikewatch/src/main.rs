//! Strikewatch CLI and Server Binary
//!
//! Entry point for the feed service. Provides commands for initializing,
//! validating, and starting the feed.

use anyhow::{Context, Result};
use cli::{Cli, Commands};
use config::{
    generate_default_config, load_config, save_config, validate_config, FeedConfig,
    LogFormatSetting, ValidationReport,
};
use market_data::{feed_routes, FeedApiState, FeedSocketHandler, JsonChainDirectory, MarketFeed};
use observability::{init_default_logging, init_logging, init_metrics, LogFormat};
use server::{CombinedServer, ServerConfig, ServerExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start { config, http, ws } => start_feed(config, http, ws).await,
        Commands::Validate { config } => validate_command(config),
        Commands::Init { output } => init_command(output),
    }
}

fn log_format(setting: LogFormatSetting) -> LogFormat {
    match setting {
        LogFormatSetting::Pretty => LogFormat::Pretty,
        LogFormatSetting::Json => LogFormat::Json,
        LogFormatSetting::Compact => LogFormat::Compact,
    }
}

fn log_report(report: &ValidationReport) {
    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }
    for err in &report.errors {
        error!("{}", err);
    }
}

async fn start_feed(
    config_path: PathBuf,
    http_override: Option<u16>,
    ws_override: Option<u16>,
) -> Result<()> {
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

    let logging = config.logging();
    init_logging(&config.service.name, log_format(logging.format), &logging.filter)?;
    info!(path = ?config_path, "Configuration loaded");

    let report = validate_config(&config);
    log_report(&report);
    if !report.is_valid() {
        anyhow::bail!(
            "Cannot start feed due to {} configuration error(s)",
            report.errors.len()
        );
    }

    let metrics = config.metrics();
    if metrics.enabled {
        init_metrics(metrics.port).context("Failed to start metrics exporter")?;
        info!(port = metrics.port, "Metrics exporter listening");
    }

    let http_port = http_override.unwrap_or(config.server.http_port);
    let ws_port = ws_override.unwrap_or(config.server.websocket_port);

    let feed = MarketFeed::from_config(&config).context("Failed to build market feed")?;
    let loaded = feed
        .load_all()
        .await
        .context("No baseline documents could be loaded")?;
    info!(count = loaded, symbols = ?feed.loaded_symbols(), "Baselines loaded");

    let server = build_server(&config, feed.clone(), http_port, ws_port);
    info!(
        host = %config.server.host,
        http_port,
        ws_port,
        "Starting feed server"
    );

    let result = server.run_until_signal().await;
    feed.shutdown();
    info!("Feed stopped");

    result.context("Server terminated with an error")
}

fn build_server(config: &FeedConfig, feed: MarketFeed, http_port: u16, ws_port: u16) -> CombinedServer {
    let chain = config.option_chain();
    let state = Arc::new(FeedApiState {
        feed: feed.clone(),
        chain: Arc::new(JsonChainDirectory::new(chain.directory)),
        default_symbol: config.feed.default_symbol.clone(),
        default_count: chain.default_count,
    });

    CombinedServer::with_name(
        config.service.name.clone(),
        ServerConfig::new(config.server.host.clone(), http_port, ws_port),
        feed_routes(state),
        Arc::new(FeedSocketHandler::new(feed)),
    )
}

fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    init_default_logging("strikewatch")?;
    let config_path = config_path.as_ref();
    info!(path = ?config_path, "Validating configuration");

    let config = load_config(config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;
    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Service: {}", config.service.name);
    println!(
        "Listening: {} (HTTP {}, WebSocket {})",
        config.server.host, config.server.http_port, config.server.websocket_port
    );
    println!("Symbols: {}", config.feed.symbols.join(", "));
    println!(
        "Intervals: primary {}ms, extra {}ms",
        config.feed.update_interval_ms, config.feed.extra_interval_ms
    );

    Ok(())
}

fn init_command<P: AsRef<Path>>(output_path: P) -> Result<()> {
    init_default_logging("strikewatch")?;
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    let config = generate_default_config();

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("Next steps:");
    println!("  1. Export UPSTOX_ACCESS_TOKEN or edit upstream.access_token");
    println!("  2. Place baseline documents under {:?}", config.baseline.directory);
    println!(
        "  3. Run 'strikewatch validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  4. Run 'strikewatch start --config {:?}' to start the feed",
        output_path
    );

    Ok(())
}
