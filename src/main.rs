//! HailCast - radar nowcasting pipeline
//!
//! # Usage
//!
//! ```bash
//! # Run the pipeline (default subcommand)
//! hailcast --config hailcast.toml
//!
//! # One iteration, then exit (smoke tests)
//! hailcast --once
//!
//! # Validate a config file and print the effective values
//! hailcast --config hailcast.toml check-config
//!
//! # Seed the subscriber database
//! hailcast subscribers import subscribers.json
//! ```
//!
//! # Environment Variables
//!
//! - `HAILCAST_CONFIG`: Path to the TOML config (when `--config` is absent)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hailcast::alerts::{LogNotifier, Notifier};
use hailcast::config::{self, NotifierKind, OpenSkyConfig, PipelineConfig, RegistryBackend};
use hailcast::converter::{ConverterGateway, ProcessInvoker};
use hailcast::inference::PersistencePredictor;
use hailcast::pipeline::{CycleCoordinator, ProcessingLoop};
use hailcast::storage::{
    FrameStore, InMemoryRegistry, ProcessLock, SledRegistry, StatusReporter, SubscriberRegistry,
};
use hailcast::telemetry::TelemetryMonitor;

/// sled database directory inside `paths.data_dir`.
const SUBSCRIBER_DB: &str = "subscribers.db";

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "hailcast")]
#[command(about = "HailCast radar nowcasting pipeline")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config (overrides HAILCAST_CONFIG and ./hailcast.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Run a single loop iteration and exit
    #[arg(long)]
    once: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline (default)
    Run,

    /// Load and validate the config, then print it as TOML
    CheckConfig,

    /// Manage the subscriber registry
    #[command(subcommand)]
    Subscribers(SubscriberCommand),
}

#[derive(Subcommand, Debug)]
enum SubscriberCommand {
    /// Import subscribers from a JSON array file into the sled registry
    Import {
        /// JSON file with an array of subscriber records
        file: PathBuf,
    },
}

// ============================================================================
// Setup helpers
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// An explicit `--config` must load; otherwise fall back through the
/// standard search order.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => {
            let config = PipelineConfig::load_from_file(p)
                .with_context(|| format!("Failed to load config from {}", p.display()))?;
            info!(path = %p.display(), "Loaded pipeline config");
            Ok(config)
        }
        None => Ok(PipelineConfig::load()),
    }
}

fn open_registry(config: &PipelineConfig) -> Result<Arc<dyn SubscriberRegistry>> {
    match config.alerts.registry {
        RegistryBackend::Sled => {
            let path = config.paths.data_dir.join(SUBSCRIBER_DB);
            let registry = SledRegistry::open(&path)
                .with_context(|| format!("Failed to open subscriber database {}", path.display()))?;
            Ok(Arc::new(registry))
        }
        RegistryBackend::Memory => Ok(Arc::new(InMemoryRegistry::new())),
    }
}

fn build_notifier(config: &PipelineConfig) -> Result<Arc<dyn Notifier>> {
    match config.alerts.notifier {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        #[cfg(feature = "webhook")]
        NotifierKind::Webhook => {
            let timeout = Duration::from_secs(config.alerts.webhook_timeout_secs);
            let notifier = hailcast::alerts::WebhookNotifier::new(timeout)
                .context("Failed to build webhook client")?;
            Ok(Arc::new(notifier))
        }
        #[cfg(not(feature = "webhook"))]
        NotifierKind::Webhook => bail!("alerts.notifier = \"webhook\" requires the `webhook` feature"),
    }
}

#[cfg(feature = "opensky")]
fn attach_opensky(monitor: TelemetryMonitor, config: &OpenSkyConfig) -> Result<TelemetryMonitor> {
    if !config.enabled {
        return Ok(monitor);
    }
    if config.aircraft.is_empty() {
        warn!("telemetry.opensky.aircraft is empty, OpenSky positions will all be ignored");
    }
    let client = hailcast::telemetry::OpenSkyClient::new(config).context("Failed to build OpenSky client")?;
    info!(url = %config.url, refresh_secs = config.refresh_secs, "✓ OpenSky positions merged into telemetry");
    Ok(monitor.with_opensky(client))
}

#[cfg(not(feature = "opensky"))]
fn attach_opensky(monitor: TelemetryMonitor, config: &OpenSkyConfig) -> Result<TelemetryMonitor> {
    if config.enabled {
        bail!("telemetry.opensky.enabled requires the `opensky` feature");
    }
    Ok(monitor)
}

// ============================================================================
// Subcommands
// ============================================================================

fn check_config(config: &PipelineConfig) -> Result<()> {
    config.validate().context("Configuration is invalid")?;
    println!("{}", config.to_toml().context("Failed to render config")?);
    info!("✓ Configuration is valid");
    Ok(())
}

fn import_subscribers(config: &PipelineConfig, file: &Path) -> Result<()> {
    let _lock = ProcessLock::acquire(&config.paths.data_dir).context("Failed to acquire process lock")?;
    let path = config.paths.data_dir.join(SUBSCRIBER_DB);
    let registry = SledRegistry::open(&path)
        .with_context(|| format!("Failed to open subscriber database {}", path.display()))?;
    let count = registry
        .import_json(file)
        .with_context(|| format!("Failed to import {}", file.display()))?;
    info!(count, file = %file.display(), "✓ Subscribers imported");
    Ok(())
}

async fn run_pipeline(config: &PipelineConfig, once: bool) -> Result<()> {
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  HailCast - Radar Nowcasting Pipeline");
    info!("  Radar: {} ({})", config.radar.radar_name, config.radar.institution);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");

    info!("🔒 Acquiring process lock...");
    let _process_lock = ProcessLock::acquire(&config.paths.data_dir).context("Failed to acquire process lock")?;
    info!("✓ Process lock acquired");

    let store = FrameStore::open(&config.paths, &config.window).context("Failed to open frame store")?;

    let converter = ConverterGateway::from_config(
        &config.converter,
        Arc::new(ProcessInvoker),
        &config.window.raw_extension,
        &config.window.converted_extension,
        &config.paths.raw_archive,
    )
    .context("Converter tools unavailable")?;

    let predictor = Arc::new(PersistencePredictor::new(
        config.window.length,
        config.model.input_height,
        config.model.input_width,
        config.model.forecast_steps,
    ));
    info!(
        input = ?(config.model.input_height, config.model.input_width),
        steps = config.model.forecast_steps,
        "✓ Predictor ready (persistence)"
    );

    let registry = open_registry(config)?;
    let notifier = build_notifier(config)?;
    info!(
        registry = registry.backend_name(),
        notifier = notifier.name(),
        alerts = config.alerts.enabled,
        "✓ Alerting configured"
    );

    let coordinator = CycleCoordinator::new(config, store, converter, predictor, registry, notifier);
    let status = StatusReporter::new(&config.paths.status_file);

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut processing_loop = ProcessingLoop::new(
        coordinator,
        status,
        Duration::from_secs(config.window.poll_interval_secs),
        cancel_token,
    );
    if config.telemetry.enabled {
        let monitor = TelemetryMonitor::new(&config.telemetry, config.alerts.radius_km, &config.paths.output_dir);
        let monitor = attach_opensky(monitor, &config.telemetry.opensky)?;
        info!(dir = %config.telemetry.directory.display(), "✓ Aircraft telemetry enabled");
        processing_loop =
            processing_loop.with_telemetry(monitor, Duration::from_secs(config.telemetry.interval_secs));
    }

    processing_loop.initialize().context("Pipeline initialization failed")?;

    let stats = if once {
        processing_loop.run_once().await
    } else {
        processing_loop.run().await
    };
    info!("{stats}");

    if once && stats.errors > 0 {
        bail!("iteration failed, see log for details");
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let pipeline_config = load_config(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Run) {
        Command::CheckConfig => check_config(&pipeline_config),
        Command::Subscribers(SubscriberCommand::Import { file }) => import_subscribers(&pipeline_config, &file),
        Command::Run => {
            config::init(pipeline_config);
            if let Err(e) = run_pipeline(config::get(), args.once).await {
                warn!(error = ?e, "Pipeline stopped with an error");
                return Err(e);
            }
            Ok(())
        }
    }
}
