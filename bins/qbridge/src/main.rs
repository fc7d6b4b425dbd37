//! Market Bridge CLI and service binary
//!
//! `qbridge start` runs the collection loops and publishes snapshots until
//! Ctrl+C; `validate` and `init` manage the configuration file.

use anyhow::{Context, Result};
use cli::{Cli, Commands};
use config::{generate_default_config, load_config, save_config, validate_config, BridgeConfig};
use observability::{init_logging, init_metrics, LogFormat};
use quant_engine::{Engine, EngineDeps, ShutdownController};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start {
            config,
            dry_run,
            metrics_port,
        } => start_bridge(config, dry_run, metrics_port).await,
        Commands::Validate { config } => {
            init_logging("qbridge", LogFormat::Pretty)?;
            validate_command(config).await
        }
        Commands::Init { output } => {
            init_logging("qbridge", LogFormat::Pretty)?;
            init_command(output).await
        }
    }
}

async fn start_bridge<P: AsRef<Path>>(config_path: P, dry_run: bool, metrics_override: Option<u16>) -> Result<()> {
    let config = load_config(config_path.as_ref())?;

    let log_format = LogFormat::parse(&config.monitoring.log_format).unwrap_or_default();
    init_logging("qbridge", log_format)?;
    info!(bridge = %config.bridge.name, version = %config.bridge.version, "Market Bridge starting...");

    check_config(&config)?;

    if let Some(port) = metrics_override.or(config.monitoring.metrics_port) {
        init_metrics(port)?;
        info!(port, "Prometheus exporter listening");
    } else {
        debug!("Metrics exporter disabled");
    }

    if dry_run {
        warn!("Dry run: snapshots go to the in-memory store");
    }

    let controller = ShutdownController::with_ctrl_c();
    let deps = EngineDeps::from_config(&config, dry_run)
        .await
        .context("Failed to initialise data sources and store")?;
    let engine = Arc::new(Engine::new(&config, deps)?);

    info!(
        snapshot_key = %config.store.snapshot_key,
        primary_interval_ms = config.schedule.primary_interval_ms,
        "Starting loops"
    );
    engine.run(controller.token()).await;

    info!("Market Bridge stopped");
    Ok(())
}

fn check_config(config: &BridgeConfig) -> Result<()> {
    let report = validate_config(config);

    for warning in &report.warnings {
        warn!(field = %warning.field, "{}", warning.message);
    }
    if report.is_valid() {
        return Ok(());
    }

    for err in &report.errors {
        error!(error = %err, "Invalid configuration");
    }
    anyhow::bail!("Cannot start bridge: {} configuration error(s)", report.errors.len())
}

async fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let config_path = config_path.as_ref();
    info!(path = ?config_path, "Checking bridge configuration");

    let config = load_config(config_path).map_err(|e| {
        error!(error = %e, "Configuration could not be loaded");
        e
    })?;
    let report = validate_config(&config);

    println!("{}: {} warning(s), {} error(s)", config_path.display(), report.warnings.len(), report.errors.len());
    for warning in &report.warnings {
        println!("  warning  {:<28} {}", warning.field, warning.message);
    }
    for err in &report.errors {
        println!("  error    {}", err);
    }

    if !report.is_valid() {
        anyhow::bail!("{} has {} configuration error(s)", config_path.display(), report.errors.len());
    }

    println!();
    println!("{} v{}", config.bridge.name, config.bridge.version);
    println!("  store        {} (key '{}')", config.store.store_type, config.store.snapshot_key);
    println!(
        "  futures      {} / {} (spot {})",
        config.instruments.index_future, config.instruments.currency_future, config.instruments.spot_index
    );
    println!("  blue chips   {}", config.instruments.blue_chips.len());
    println!(
        "  web targets  {} macro, {} global, {} fallback",
        config.sources.macro_targets.len(),
        config.sources.global_targets.len(),
        config.sources.fallback_locators.len()
    );

    Ok(())
}

async fn init_command<P: AsRef<Path>>(output: P) -> Result<()> {
    let output = output.as_ref();
    if let Some(dir) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    }

    let config = generate_default_config();
    save_config(&config, output)?;
    info!(path = ?output, "Wrote default configuration");

    println!("Wrote {}", output.display());
    println!(
        "  {} blue chips, {} macro and {} global web targets, {} store",
        config.instruments.blue_chips.len(),
        config.sources.macro_targets.len(),
        config.sources.global_targets.len(),
        config.store.store_type
    );
    println!();
    println!("Point feed.quotes_path and flow.directory at the terminal exporter output,");
    println!("use ${{VAR}} placeholders for secrets such as the Redis password, then run:");
    println!("  qbridge validate --config {}", output.display());
    println!("  qbridge start --config {}", output.display());

    Ok(())
}
