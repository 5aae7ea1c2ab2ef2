//! System-wide default constants.
//!
//! Centralises the tunable magic numbers of the inference engine. Grouped
//! by subsystem for easy discovery. Runtime overrides live in
//! [`MonitorConfig`](super::MonitorConfig).

// ============================================================================
// Anomaly Detection
// ============================================================================

/// A feature is at risk when at least this percentage of its forecast
/// horizon falls outside the context's observed min/max range.
pub const ANOMALY_PCT_THRESHOLD: f64 = 30.0;

/// Severity above this is classified High.
pub const SEVERITY_HIGH_THRESHOLD: f64 = 0.5;

/// Severity above this (and not High) is classified Medium.
pub const SEVERITY_MEDIUM_THRESHOLD: f64 = 0.3;

// ============================================================================
// Scheduler
// ============================================================================

/// Seconds between scheduler ticks.
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Discovery / fetch lookback window (seconds). 3600 = 1 hour.
pub const LOOKBACK_SECS: u64 = 3_600;

/// Per-workspace rolling buffer capacity (points).
pub const BUFFER_CAPACITY: usize = 360;

/// Seconds between automatic registry reloads. 0 disables.
pub const REGISTRY_RELOAD_SECS: u64 = 3_600;

// ============================================================================
// Artifacts
// ============================================================================

/// Prefix for model artifact directories: `model_{workspace}_{timestamp}`.
pub const MODEL_DIR_PREFIX: &str = "model_";

/// Prefix for normalizer files: `scaler_{workspace}_{timestamp}.json`.
pub const SCALER_FILE_PREFIX: &str = "scaler_";

/// Normalizer file extension.
pub const SCALER_FILE_EXT: &str = "json";

/// Native checkpoint file inside a model directory.
pub const CHECKPOINT_FILE: &str = "forecaster.json";

/// Raw-weights fallback file inside a model directory.
pub const RAW_WEIGHTS_FILE: &str = "weights.json";

// ============================================================================
// Boundary Clients
// ============================================================================

/// HTTP timeout for feed / sink / mail requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Measurement name the feed queries for sensor rows.
pub const SENSOR_MEASUREMENT: &str = "sensor_data";

/// Measurement name the sink writes anomaly events to.
pub const ANOMALY_MEASUREMENT: &str = "anomaly_detections";
