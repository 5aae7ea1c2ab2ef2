//! Error taxonomy for the inference engine.
//!
//! Every variant maps to a recovery policy enforced at the scheduler or
//! dispatcher boundary — none of these are allowed to crash the tick loop.

use thiserror::Error;

/// Errors raised inside a monitoring cycle.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Sensor feed or artifact store unreachable. Recovered by retrying on
    /// the next tick / next call.
    #[error("store connection error: {0}")]
    StoreConnection(String),

    /// No valid model binding for a workspace. The workspace is skipped for
    /// the tick; this is not an alert condition.
    #[error("no model binding for workspace '{workspace}'")]
    ModelNotFound { workspace: String },

    /// Fewer context points than the model requires. Workspace skipped.
    #[error("insufficient data for workspace '{workspace}': need {needed}, got {got}")]
    InsufficientData {
        workspace: String,
        needed: usize,
        got: usize,
    },

    /// Shape mismatch or model execution failure. Workspace skipped, logged
    /// with detail.
    #[error("inference error: {0}")]
    Inference(String),

    /// Per-recipient alert delivery failure. Logged; does not affect other
    /// recipients or the already-persisted assessment.
    #[error("notification error: {0}")]
    Notification(String),

    /// Model/normalizer artifact could not be parsed or read. Confined to
    /// the registry's per-workspace failure isolation.
    #[error("artifact error: {0}")]
    Artifact(String),
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        Self::StoreConnection(err.to_string())
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        Self::Artifact(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Artifact(err.to_string())
    }
}
