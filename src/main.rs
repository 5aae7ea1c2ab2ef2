//! Machine Sentinel - Streaming Machine Condition Monitoring
//!
//! Multi-workspace inference engine for predictive maintenance over
//! industrial sensor streams.
//!
//! # Usage
//!
//! ```bash
//! # Run against the configured time-series store
//! cargo run --release
//!
//! # Run exactly one monitoring tick and exit (smoke tests, cron)
//! cargo run --release -- --once
//!
//! # Point at an explicit config file and artifact root
//! cargo run --release -- --config /etc/sentinel.toml --artifacts /var/lib/sentinel/models
//! ```
//!
//! # Environment Variables
//!
//! - `SENTINEL_CONFIG`: Path to the TOML config file
//! - `SENTINEL_STORE_TOKEN` (or the configured `feed.token_env`): store token
//! - `SENTINEL_MAIL_API_KEY` (or the configured `alerting.api_key_env`): mail key
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use machine_sentinel::alert::{AlertDispatcher, HttpMailTransport, StaticDirectory};
use machine_sentinel::config::MonitorConfig;
use machine_sentinel::events::InfluxEventSink;
use machine_sentinel::feed::InfluxFeed;
use machine_sentinel::registry::ModelRegistry;
use machine_sentinel::scheduler::{StreamingScheduler, WorkspaceStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "machine-sentinel")]
#[command(about = "Streaming machine condition monitoring engine")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file (overrides SENTINEL_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the model artifact root directory
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Override the scheduler poll interval in seconds
    #[arg(long, value_name = "SECS")]
    interval_secs: Option<u64>,

    /// Run exactly one monitoring tick, then exit
    #[arg(long)]
    once: bool,

    /// Validate one workspace's model against recent held-out data, then exit
    #[arg(long, value_name = "WORKSPACE")]
    validate: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut cfg = match &args.config {
        Some(path) => MonitorConfig::load_from_file(path)?,
        None => MonitorConfig::load(),
    };
    if let Some(root) = args.artifacts {
        cfg.artifacts.root = root;
    }
    if let Some(secs) = args.interval_secs {
        cfg.monitor.poll_interval_secs = secs;
    }
    cfg.validate()?;

    info!(
        artifact_root = %cfg.artifacts.root.display(),
        store = %cfg.feed.url,
        interval_secs = cfg.monitor.poll_interval_secs,
        "Machine Sentinel starting"
    );

    // Wire the components
    let registry = Arc::new(ModelRegistry::new(cfg.artifacts.root.clone()));
    let loaded = registry.discover_and_load();
    info!(bindings = loaded, "Initial model registry load complete");

    let feed = Arc::new(InfluxFeed::from_config(&cfg.feed)?);

    if let Some(workspace) = &args.validate {
        let lookback = std::time::Duration::from_secs(cfg.monitor.lookback_secs);
        let report =
            machine_sentinel::engine::validate_workspace(feed.as_ref(), &registry, workspace, lookback)
                .await?;
        for m in &report.per_feature {
            info!(
                feature = %m.feature,
                mae = m.mae,
                rmse = m.rmse,
                mape = m.mape,
                "Feature validation metrics"
            );
        }
        info!(
            workspace = %report.workspace_id,
            horizon = report.horizon,
            overall_accuracy = report.overall_accuracy,
            "Validation complete"
        );
        return Ok(());
    }

    let sink = Arc::new(InfluxEventSink::new(&cfg.feed, &cfg.events));
    let directory = Arc::new(StaticDirectory::new(cfg.alerting.recipients.clone()));
    let transport = HttpMailTransport::from_config(&cfg.alerting)
        .map(|t| Arc::new(t) as Arc<dyn machine_sentinel::AlertTransport>);
    let dispatcher = Arc::new(AlertDispatcher::new(directory, transport));
    let workspaces = Arc::new(WorkspaceStore::new(cfg.monitor.buffer_capacity));

    let cancel = CancellationToken::new();
    let scheduler = StreamingScheduler::new(
        &cfg,
        feed,
        registry,
        workspaces,
        sink,
        dispatcher,
        cancel.clone(),
    );

    if args.once {
        let stats = scheduler.run_tick().await;
        info!(
            discovered = stats.discovered,
            processed = stats.processed,
            skipped = stats.skipped,
            alerts = stats.alerts,
            "Single tick complete"
        );
        return Ok(());
    }

    // Ctrl-C triggers a clean shutdown of the tick loop
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    scheduler.run().await;
    Ok(())
}
