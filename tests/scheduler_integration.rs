//! End-to-end scheduler ticks over the replay feed.
//!
//! Wires real registry, engine, and detector components to the in-memory
//! feed, event sink, and a recording alert transport, then drives
//! `run_tick` deterministically.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use machine_sentinel::alert::{AlertDispatcher, AlertTransport, StaticDirectory};
use machine_sentinel::config::defaults::CHECKPOINT_FILE;
use machine_sentinel::config::MonitorConfig;
use machine_sentinel::events::MemoryEventSink;
use machine_sentinel::feed::ReplayFeed;
use machine_sentinel::model::{LinearForecaster, MinMaxNormalizer};
use machine_sentinel::registry::ModelRegistry;
use machine_sentinel::scheduler::{StreamingScheduler, WorkspaceStore};
use machine_sentinel::types::{SensorPoint, SeverityLevel, NUM_FEATURES};
use machine_sentinel::MonitorError;

// ============================================================================
// Fixtures
// ============================================================================

/// Transport stub that records every delivered message.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AlertTransport for RecordingTransport {
    async fn send(&self, to: &str, _subject: &str, body: &str) -> Result<(), MonitorError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

/// Model whose `current` forecast always overshoots the context range,
/// leaving every other channel at its last observed value.
fn risky_model(context_length: usize, horizon: usize) -> LinearForecaster {
    let mut model = LinearForecaster::persistence(context_length, horizon);
    for step in model.bias[0].iter_mut() {
        *step = 0.3;
    }
    model
}

fn write_artifacts(root: &Path, workspace: &str, timestamp: &str, model: &LinearForecaster) {
    let dir = root.join(format!("model_{workspace}_{timestamp}"));
    std::fs::create_dir_all(&dir).expect("create model dir");
    model
        .save_to_disk(&dir.join(CHECKPOINT_FILE))
        .expect("save checkpoint");
    MinMaxNormalizer::identity()
        .save_to_disk(&root.join(format!("scaler_{workspace}_{timestamp}.json")))
        .expect("save scaler");
}

/// `n` constant points, spaced 10s apart, newest last. Values are already
/// inside the identity normalizer's [0, 1] band.
fn constant_points(workspace: &str, n: usize, value: f64) -> Vec<SensorPoint> {
    let start = Utc::now() - ChronoDuration::seconds(10 * n as i64);
    (0..n)
        .map(|i| {
            SensorPoint::from_features(
                workspace,
                start + ChronoDuration::seconds(10 * i as i64),
                [value; NUM_FEATURES],
            )
        })
        .collect()
}

struct Harness {
    feed: Arc<ReplayFeed>,
    sink: Arc<MemoryEventSink>,
    transport: Arc<RecordingTransport>,
    scheduler: StreamingScheduler,
    _artifacts: tempfile::TempDir,
}

fn harness(recipients: HashMap<String, Vec<String>>, setup: impl Fn(&Path)) -> Harness {
    let artifacts = tempfile::tempdir().expect("tempdir");
    setup(artifacts.path());

    let mut cfg = MonitorConfig::default();
    cfg.artifacts.root = artifacts.path().to_path_buf();
    cfg.monitor.registry_reload_secs = 0;

    let registry = Arc::new(ModelRegistry::new(artifacts.path()));
    registry.discover_and_load();

    let feed = Arc::new(ReplayFeed::new());
    let sink = Arc::new(MemoryEventSink::new());
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Arc::new(AlertDispatcher::new(
        Arc::new(StaticDirectory::new(recipients)),
        Some(transport.clone() as Arc<dyn AlertTransport>),
    ));
    let workspaces = Arc::new(WorkspaceStore::new(cfg.monitor.buffer_capacity));

    let scheduler = StreamingScheduler::new(
        &cfg,
        feed.clone(),
        registry,
        workspaces,
        sink.clone(),
        dispatcher,
        CancellationToken::new(),
    );

    Harness {
        feed,
        sink,
        transport,
        scheduler,
        _artifacts: artifacts,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn at_risk_cycle_caches_prediction_records_event_and_alerts() {
    let mut recipients = HashMap::new();
    recipients.insert("press-1".to_string(), vec!["ops@example.com".to_string()]);

    let h = harness(recipients, |root| {
        write_artifacts(root, "press-1", "20260101_000000", &risky_model(4, 2));
    });
    h.feed.set_points("press-1", constant_points("press-1", 6, 0.5));

    let stats = h.scheduler.run_tick().await;
    assert_eq!(stats.discovered, 1);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.alerts, 1);

    // Prediction cached for the query surface
    let latest = h
        .scheduler
        .workspaces()
        .latest_prediction("press-1")
        .expect("cached prediction");
    assert!(latest.assessment.at_risk);
    assert_eq!(latest.assessment.at_risk_features, ["current"]);
    assert_eq!(latest.assessment.primary_anomaly.as_deref(), Some("current"));
    // Forecast overshoots by 0.3 against a predicted 0.8: severity 0.375
    assert!((latest.assessment.severity_score - 0.375).abs() < 1e-9);
    assert_eq!(latest.assessment.severity_level, SeverityLevel::Medium);
    assert_eq!(latest.generated_at, latest.assessment.timestamp);

    // Event recorded with the cycle's values
    let events = h.sink.recorded();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].workspace_id, "press-1");
    assert_eq!(events[0].anomaly_type, "current");
    assert_eq!(events[0].affected_features, "current");
    assert_eq!(events[0].timestamp, latest.assessment.timestamp);

    // Alert delivered to the configured recipient
    let messages = h.transport.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "ops@example.com");
    assert!(messages[0].1.starts_with("Machine at Risk: Stay alert on current"));
}

#[tokio::test]
async fn healthy_cycle_caches_prediction_without_alerting() {
    let mut recipients = HashMap::new();
    recipients.insert("fan-9".to_string(), vec!["ops@example.com".to_string()]);

    let h = harness(recipients, |root| {
        // Plain persistence model: forecast stays inside the context range
        write_artifacts(
            root,
            "fan-9",
            "20260101_000000",
            &LinearForecaster::persistence(4, 2),
        );
    });
    h.feed.set_points("fan-9", constant_points("fan-9", 6, 0.4));

    let stats = h.scheduler.run_tick().await;
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.alerts, 0);

    let latest = h
        .scheduler
        .workspaces()
        .latest_prediction("fan-9")
        .expect("cached prediction");
    assert!(!latest.assessment.at_risk);
    assert!(latest
        .assessment
        .alert_message
        .starts_with("Machine Condition Normal"));

    assert!(h.sink.is_empty());
    assert!(h.transport.messages().is_empty());
}

#[tokio::test]
async fn workspace_failures_are_isolated_within_a_tick() {
    let h = harness(HashMap::new(), |root| {
        write_artifacts(
            root,
            "short-data",
            "20260101_000000",
            &LinearForecaster::persistence(4, 2),
        );
        write_artifacts(
            root,
            "healthy",
            "20260101_000000",
            &LinearForecaster::persistence(4, 2),
        );
    });
    // Discovered but no model binding
    h.feed.set_points("no-model", constant_points("no-model", 6, 0.5));
    // Binding exists but fewer points than the context length
    h.feed
        .set_points("short-data", constant_points("short-data", 2, 0.5));
    // Full cycle
    h.feed.set_points("healthy", constant_points("healthy", 6, 0.5));

    let stats = h.scheduler.run_tick().await;
    assert_eq!(stats.discovered, 3);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.alerts, 0);

    let workspaces = h.scheduler.workspaces();
    assert!(workspaces.latest_prediction("healthy").is_some());
    assert!(workspaces.latest_prediction("short-data").is_none());
    assert!(workspaces.latest_prediction("no-model").is_none());
}

#[tokio::test]
async fn discovery_failure_skips_tick_and_preserves_cache() {
    let h = harness(HashMap::new(), |root| {
        write_artifacts(root, "press-1", "20260101_000000", &risky_model(4, 2));
    });
    h.feed.set_points("press-1", constant_points("press-1", 6, 0.5));

    let first = h.scheduler.run_tick().await;
    assert_eq!(first.processed, 1);
    assert_eq!(h.sink.len(), 1);
    let cached = h.scheduler.workspaces().latest_prediction("press-1");
    assert!(cached.is_some());

    h.feed.set_discovery_error("store unreachable");
    let second = h.scheduler.run_tick().await;
    assert_eq!(second.discovered, 0);
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 0);

    // Cached prediction and event log are untouched
    assert!(h.scheduler.workspaces().latest_prediction("press-1").is_some());
    assert_eq!(h.sink.len(), 1);

    // Recovery on the next successful discovery
    h.feed.clear_discovery_error();
    let third = h.scheduler.run_tick().await;
    assert_eq!(third.processed, 1);
}

#[tokio::test]
async fn event_sink_failure_does_not_fail_the_cycle() {
    let h = harness(HashMap::new(), |root| {
        write_artifacts(root, "press-1", "20260101_000000", &risky_model(4, 2));
    });
    h.feed.set_points("press-1", constant_points("press-1", 6, 0.5));
    h.sink.set_failing(true);

    let stats = h.scheduler.run_tick().await;
    // Cycle still counts as processed and at-risk
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.alerts, 1);
    assert!(h.scheduler.workspaces().latest_prediction("press-1").is_some());
    assert!(h.sink.is_empty());
}
