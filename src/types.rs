//! Core data model for the streaming inference engine.
//!
//! Everything that crosses a component boundary lives here: raw sensor
//! points, forecast results, anomaly assessments, and the records pushed
//! to the event sink. All types are serde-serializable so they can be
//! cached, persisted, and inspected by external tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Sensor Channels
// ============================================================================

/// Number of sensor channels per workspace.
pub const NUM_FEATURES: usize = 6;

/// Canonical feature order. Every `[f64; NUM_FEATURES]` in the crate
/// follows this ordering.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] =
    ["current", "accX", "accY", "accZ", "tempA", "tempB"];

/// One raw reading from a workspace's sensor package.
///
/// All six channels are required. A feed that omits a channel defaults it
/// to 0.0 — that is a documented degradation the feed logs, not a silent
/// success condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPoint {
    pub workspace_id: String,
    pub timestamp: DateTime<Utc>,
    pub current: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub temp_a: f64,
    pub temp_b: f64,
}

impl SensorPoint {
    /// Channel values in canonical [`FEATURE_NAMES`] order.
    pub fn features(&self) -> [f64; NUM_FEATURES] {
        [
            self.current,
            self.acc_x,
            self.acc_y,
            self.acc_z,
            self.temp_a,
            self.temp_b,
        ]
    }

    /// Build a point from a feature array in canonical order.
    pub fn from_features(
        workspace_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        values: [f64; NUM_FEATURES],
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            timestamp,
            current: values[0],
            acc_x: values[1],
            acc_y: values[2],
            acc_z: values[3],
            temp_a: values[4],
            temp_b: values[5],
        }
    }
}

// ============================================================================
// Forecast Output
// ============================================================================

/// Multivariate forecast produced by one inference cycle.
///
/// Rows are horizon steps, columns follow [`FEATURE_NAMES`]. Both the
/// normalized-scale output (what the model emitted) and the raw-scale
/// output (after inverse transform) are kept: anomaly percentages are
/// computed on the normalized scale, severity on the raw scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub workspace_id: String,
    /// Cycle timestamp — captured once, shared with the assessment.
    pub generated_at: DateTime<Utc>,
    /// Normalized-scale forecast, horizon × NUM_FEATURES.
    pub scaled: Vec<[f64; NUM_FEATURES]>,
    /// Raw-scale forecast, horizon × NUM_FEATURES.
    pub raw: Vec<[f64; NUM_FEATURES]>,
}

impl ForecastResult {
    /// Number of forecast steps.
    pub fn horizon(&self) -> usize {
        self.scaled.len()
    }
}

// ============================================================================
// Anomaly Assessment
// ============================================================================

/// Severity classification for an at-risk workspace.
///
/// Strict partition over the severity score: above
/// [`SEVERITY_HIGH_THRESHOLD`] is High, above
/// [`SEVERITY_MEDIUM_THRESHOLD`] is Medium, everything else Low.
///
/// [`SEVERITY_HIGH_THRESHOLD`]: crate::config::defaults::SEVERITY_HIGH_THRESHOLD
/// [`SEVERITY_MEDIUM_THRESHOLD`]: crate::config::defaults::SEVERITY_MEDIUM_THRESHOLD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
}

impl SeverityLevel {
    pub fn classify(score: f64) -> Self {
        use crate::config::defaults::{SEVERITY_HIGH_THRESHOLD, SEVERITY_MEDIUM_THRESHOLD};
        if score > SEVERITY_HIGH_THRESHOLD {
            Self::High
        } else if score > SEVERITY_MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actual-vs-predicted comparison for a single feature (raw scale).
///
/// `actual` is the most recent reading, `predicted` the first forecast
/// step. `deviation_pct` is relative to the predicted value, or equal to
/// the absolute deviation when the prediction is zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureDeviation {
    pub actual: f64,
    pub predicted: f64,
    pub deviation: f64,
    pub deviation_pct: f64,
}

/// Per-cycle anomaly decision for one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAssessment {
    pub workspace_id: String,
    /// Cycle timestamp, reused verbatim in the alert message, the cached
    /// prediction, and the event record.
    pub timestamp: DateTime<Utc>,
    /// Fraction of forecast steps outside the context range, per feature,
    /// in percent (0..=100).
    pub anomaly_pct: [f64; NUM_FEATURES],
    /// Feature names flagged at risk, in canonical order.
    pub at_risk_features: Vec<String>,
    pub at_risk: bool,
    /// Max severity over at-risk features; 0.0 when nothing is at risk.
    pub severity_score: f64,
    pub severity_level: SeverityLevel,
    /// At-risk feature with the maximum severity (ties: first in canonical
    /// order). None when the workspace is healthy.
    pub primary_anomaly: Option<String>,
    pub alert_message: String,
    /// Raw-scale actual/predicted comparison for every feature.
    pub deviations: [FeatureDeviation; NUM_FEATURES],
}

// ============================================================================
// Latest-Prediction Cache Entry
// ============================================================================

/// Cache entry swapped in whole after each successful cycle.
///
/// Readers on the query surface grab an `Arc` to this; the scheduler
/// replaces the whole object, never mutating fields in place, so a reader
/// can never observe a half-updated record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPrediction {
    pub forecast: ForecastResult,
    pub assessment: AnomalyAssessment,
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Anomaly Event (sink record)
// ============================================================================

/// Immutable, append-only record written to the event sink for each
/// at-risk assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub workspace_id: String,
    pub timestamp: DateTime<Utc>,
    /// Primary anomaly type (the worst at-risk feature).
    pub anomaly_type: String,
    pub severity_level: SeverityLevel,
    pub severity_score: f64,
    pub alert_message: String,
    /// Comma-joined at-risk feature names.
    pub affected_features: String,
    /// Raw-scale actual values for all six features, canonical order.
    pub actual: [f64; NUM_FEATURES],
    /// Raw-scale first-step predictions for all six features.
    pub predicted: [f64; NUM_FEATURES],
    /// `(feature, deviation, deviation_pct)` for each at-risk feature.
    pub deviations: Vec<(String, f64, f64)>,
}

// ============================================================================
// Validation Report
// ============================================================================

/// Per-feature error metrics from a held-out validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMetrics {
    pub feature: String,
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
}

/// Result of validating a workspace's model against recent held-out data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub workspace_id: String,
    pub validated_at: DateTime<Utc>,
    /// Held-out steps compared.
    pub horizon: usize,
    pub per_feature: Vec<FeatureMetrics>,
    /// `max(0, 100 - mean(MAPE))`, always in 0..=100.
    pub overall_accuracy: f64,
}

// ============================================================================
// Scheduler Statistics
// ============================================================================

/// Counters for a single scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Workspaces returned by feed discovery.
    pub discovered: usize,
    /// Workspaces that completed a full inference cycle.
    pub processed: usize,
    /// Workspaces skipped (no binding, insufficient data, or cycle error).
    pub skipped: usize,
    /// Cycles that ended at-risk.
    pub alerts: usize,
}
