//! Anomaly event logging.
//!
//! Every at-risk assessment is flattened into an append-only
//! [`AnomalyEvent`] and handed to a sink. The production sink writes
//! line protocol to the time-series store's events bucket; tests use the
//! in-memory sink. Sink failures are reported to the caller but must
//! never abort the monitoring cycle — the scheduler logs and moves on.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::defaults::HTTP_TIMEOUT_SECS;
use crate::config::{EventsSection, FeedSection};
use crate::error::MonitorError;
use crate::types::{AnomalyAssessment, AnomalyEvent, FEATURE_NAMES};

// ============================================================================
// Event Construction
// ============================================================================

/// Flatten an at-risk assessment into its event record.
///
/// Actual and first-step predicted values are captured for all six
/// features; deviation entries only for the features flagged at risk.
pub fn build_event(assessment: &AnomalyAssessment) -> AnomalyEvent {
    let mut actual = [0.0; FEATURE_NAMES.len()];
    let mut predicted = [0.0; FEATURE_NAMES.len()];
    for (i, d) in assessment.deviations.iter().enumerate() {
        actual[i] = d.actual;
        predicted[i] = d.predicted;
    }

    let deviations = assessment
        .at_risk_features
        .iter()
        .filter_map(|name| {
            let idx = FEATURE_NAMES.iter().position(|f| f == name)?;
            let d = &assessment.deviations[idx];
            Some((name.clone(), d.deviation, d.deviation_pct))
        })
        .collect();

    AnomalyEvent {
        workspace_id: assessment.workspace_id.clone(),
        timestamp: assessment.timestamp,
        anomaly_type: assessment
            .primary_anomaly
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        severity_level: assessment.severity_level,
        severity_score: assessment.severity_score,
        alert_message: assessment.alert_message.clone(),
        affected_features: assessment.at_risk_features.join(","),
        actual,
        predicted,
        deviations,
    }
}

// ============================================================================
// Sink Trait
// ============================================================================

/// Append-only destination for anomaly events.
#[async_trait]
pub trait AnomalyEventSink: Send + Sync {
    async fn record(&self, event: &AnomalyEvent) -> Result<(), MonitorError>;

    fn sink_name(&self) -> &str;
}

// ============================================================================
// Time-Series Store Sink
// ============================================================================

/// Writes events as line protocol to the store's events bucket.
pub struct InfluxEventSink {
    http: reqwest::Client,
    write_url: String,
    token: Option<String>,
    measurement: String,
}

impl InfluxEventSink {
    pub fn new(feed: &FeedSection, events: &EventsSection) -> Self {
        let token = std::env::var(&feed.token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            warn!(
                env_var = %feed.token_env,
                "Store token not set — event writes will be unauthenticated"
            );
        }
        let write_url = format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ns",
            feed.url.trim_end_matches('/'),
            feed.org,
            events.bucket
        );
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            write_url,
            token,
            measurement: events.measurement.clone(),
        }
    }

    /// Serialize one event as a single line-protocol record.
    ///
    /// Tags carry the low-cardinality dimensions (workspace, anomaly type,
    /// severity level); everything numeric or free-form goes in fields.
    fn to_line_protocol(&self, event: &AnomalyEvent) -> String {
        let mut line = format!(
            "{},workspace_id={},anomaly_type={},severity_level={}",
            self.measurement,
            escape_tag(&event.workspace_id),
            escape_tag(&event.anomaly_type),
            event.severity_level
        );

        let mut fields = vec![
            format!("severity_score={}", event.severity_score),
            format!("alert_message=\"{}\"", escape_field_str(&event.alert_message)),
            format!(
                "affected_features=\"{}\"",
                escape_field_str(&event.affected_features)
            ),
        ];
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            fields.push(format!("actual_{}={}", name, event.actual[i]));
            fields.push(format!("predicted_{}={}", name, event.predicted[i]));
        }
        for (name, deviation, deviation_pct) in &event.deviations {
            fields.push(format!("deviation_{name}={deviation}"));
            fields.push(format!("deviation_pct_{name}={deviation_pct}"));
        }

        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(
            &event
                .timestamp
                .timestamp_nanos_opt()
                .unwrap_or_else(|| event.timestamp.timestamp_millis() * 1_000_000)
                .to_string(),
        );
        line
    }
}

fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn escape_field_str(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl AnomalyEventSink for InfluxEventSink {
    async fn record(&self, event: &AnomalyEvent) -> Result<(), MonitorError> {
        let body = self.to_line_protocol(event);
        debug!(workspace = %event.workspace_id, "Recording anomaly event");

        let mut req = self
            .http
            .post(&self.write_url)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Token {token}"));
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(MonitorError::StoreConnection(format!(
                "event write returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "influx"
    }
}

// ============================================================================
// In-Memory Sink (tests)
// ============================================================================

/// Collects events in memory. Test double for the store-backed sink.
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<AnomalyEvent>>,
    fail: Mutex<bool>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<AnomalyEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make subsequent `record` calls fail.
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }
}

#[async_trait]
impl AnomalyEventSink for MemoryEventSink {
    async fn record(&self, event: &AnomalyEvent) -> Result<(), MonitorError> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(MonitorError::StoreConnection(
                "memory sink set to fail".to_string(),
            ));
        }
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "memory"
    }
}
