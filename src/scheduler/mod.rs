//! Streaming scheduler — the engine's heartbeat.
//!
//! Every tick: discover active workspaces from the feed, then run a full
//! inference cycle per workspace (fetch, buffer, forecast, assess, cache,
//! and on risk: record the event and dispatch alerts). Per-workspace
//! failures are isolated — one broken workspace never stops the others,
//! and a failed discovery only skips the current tick.

pub mod workspace;

pub use workspace::{Workspace, WorkspaceStore};

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alert::AlertDispatcher;
use crate::config::MonitorConfig;
use crate::engine::{AnomalyDetector, ForecastingEngine};
use crate::error::MonitorError;
use crate::events::{self, AnomalyEventSink};
use crate::feed::SensorFeed;
use crate::registry::ModelRegistry;
use crate::types::{LatestPrediction, TickStats};

/// Drives the poll/infer/assess/alert loop across all workspaces.
pub struct StreamingScheduler {
    feed: Arc<dyn SensorFeed>,
    registry: Arc<ModelRegistry>,
    engine: ForecastingEngine,
    detector: AnomalyDetector,
    workspaces: Arc<WorkspaceStore>,
    sink: Arc<dyn AnomalyEventSink>,
    dispatcher: Arc<AlertDispatcher>,
    poll_interval: Duration,
    lookback: Duration,
    /// Zero disables periodic registry reloads.
    registry_reload: Duration,
    last_reload: Mutex<Instant>,
    cancel: CancellationToken,
}

impl StreamingScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &MonitorConfig,
        feed: Arc<dyn SensorFeed>,
        registry: Arc<ModelRegistry>,
        workspaces: Arc<WorkspaceStore>,
        sink: Arc<dyn AnomalyEventSink>,
        dispatcher: Arc<AlertDispatcher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            feed,
            registry,
            engine: ForecastingEngine::new(),
            detector: AnomalyDetector::new(config.detector.anomaly_pct_threshold),
            workspaces,
            sink,
            dispatcher,
            poll_interval: Duration::from_secs(config.monitor.poll_interval_secs),
            lookback: Duration::from_secs(config.monitor.lookback_secs),
            registry_reload: Duration::from_secs(config.monitor.registry_reload_secs),
            last_reload: Mutex::new(Instant::now()),
            cancel,
        }
    }

    /// Read access to the per-workspace state (latest predictions etc.).
    pub fn workspaces(&self) -> &Arc<WorkspaceStore> {
        &self.workspaces
    }

    /// Run the scheduler until the cancellation token fires.
    pub async fn run(&self) {
        info!(
            feed = %self.feed.feed_name(),
            interval_secs = self.poll_interval.as_secs(),
            lookback_secs = self.lookback.as_secs(),
            "Streaming scheduler started"
        );

        loop {
            let stats = self.run_tick().await;
            debug!(
                discovered = stats.discovered,
                processed = stats.processed,
                skipped = stats.skipped,
                alerts = stats.alerts,
                "Tick complete"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Streaming scheduler stopped");
    }

    /// One full scheduler tick. Public so tests and the `--once` mode can
    /// drive the loop deterministically.
    pub async fn run_tick(&self) -> TickStats {
        self.maybe_reload_registry().await;

        let mut stats = TickStats::default();

        let ids = match self.feed.discover_workspaces(self.lookback).await {
            Ok(ids) => ids,
            Err(e) => {
                // Skip the whole tick; previously cached predictions stay
                // visible until a later tick succeeds.
                warn!(error = %e, "Workspace discovery failed, skipping tick");
                return stats;
            }
        };
        stats.discovered = ids.len();

        for id in &ids {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.process_workspace(id).await {
                Ok(at_risk) => {
                    stats.processed += 1;
                    if at_risk {
                        stats.alerts += 1;
                    }
                }
                Err(MonitorError::ModelNotFound { .. }) => {
                    debug!(workspace = %id, "No model binding, skipping");
                    stats.skipped += 1;
                }
                Err(MonitorError::InsufficientData { needed, got, .. }) => {
                    debug!(workspace = %id, needed, got, "Insufficient context, skipping");
                    stats.skipped += 1;
                }
                Err(e) => {
                    warn!(workspace = %id, error = %e, "Cycle failed, skipping workspace");
                    stats.skipped += 1;
                }
            }
        }

        stats
    }

    /// One inference cycle for one workspace. Returns whether the
    /// assessment ended at risk.
    async fn process_workspace(&self, id: &str) -> Result<bool, MonitorError> {
        let binding = self
            .registry
            .get(id)
            .ok_or_else(|| MonitorError::ModelNotFound {
                workspace: id.to_string(),
            })?;

        let points = self.feed.fetch_recent(id, self.lookback).await?;
        let ws = self.workspaces.get_or_create(id);
        let absorbed = ws.absorb(&points);
        debug!(workspace = %id, fetched = points.len(), absorbed, "Buffer updated");

        let needed = binding.model.context_length();
        let context = ws
            .context(needed)
            .ok_or_else(|| MonitorError::InsufficientData {
                workspace: id.to_string(),
                needed,
                got: ws.buffer_len(),
            })?;

        // One timestamp per cycle, shared by the forecast, the assessment,
        // the cache entry, and the event record.
        let now = Utc::now();

        let output = self.engine.predict(&binding, &context, now)?;
        let latest_actual = context
            .last()
            .map(|p| p.features())
            .unwrap_or([0.0; crate::types::NUM_FEATURES]);
        let assessment = self.detector.assess(&output, latest_actual, now);
        let at_risk = assessment.at_risk;

        ws.store_prediction(Arc::new(LatestPrediction {
            forecast: output.forecast.clone(),
            assessment: assessment.clone(),
            generated_at: now,
        }));

        if at_risk {
            info!(
                workspace = %id,
                severity = %assessment.severity_level,
                features = %assessment.at_risk_features.join(","),
                "Workspace at risk"
            );

            // Event log and alerting are best-effort; the cached
            // assessment is already visible either way.
            let event = events::build_event(&assessment);
            if let Err(e) = self.sink.record(&event).await {
                error!(workspace = %id, error = %e, "Failed to record anomaly event");
            }
            self.dispatcher.dispatch(&assessment).await;
        }

        Ok(at_risk)
    }

    /// Reload model bindings when the reload interval has elapsed.
    async fn maybe_reload_registry(&self) {
        if self.registry_reload.is_zero() {
            return;
        }
        let mut last = self.last_reload.lock().await;
        if last.elapsed() >= self.registry_reload {
            let count = self.registry.reload();
            info!(bindings = count, "Model registry reloaded");
            *last = Instant::now();
        }
    }
}
