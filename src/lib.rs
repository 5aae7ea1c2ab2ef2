//! Machine Sentinel: Streaming Machine Condition Monitoring
//!
//! Multi-workspace inference engine for predictive maintenance over
//! industrial sensor streams.
//!
//! ## Architecture
//!
//! - **Model Registry**: Discovers and loads per-workspace forecast
//!   model / normalizer artifact pairs from disk
//! - **Sensor Feed**: Pulls recent raw points from the time-series store
//! - **Forecasting Engine**: Normalized multivariate forecast per cycle
//! - **Anomaly Detector**: Range-based risk scoring with severity levels
//! - **Streaming Scheduler**: Periodic tick loop driving all workspaces
//! - **Alert Dispatcher / Event Sink**: Notification fan-out and an
//!   append-only anomaly event log

pub mod alert;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod feed;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod types;

// Re-export configuration
pub use config::MonitorConfig;

// Re-export commonly used types
pub use types::{
    AnomalyAssessment, AnomalyEvent, FeatureDeviation, FeatureMetrics, ForecastResult,
    LatestPrediction, SensorPoint, SeverityLevel, TickStats, ValidationReport, FEATURE_NAMES,
    NUM_FEATURES,
};

// Re-export errors
pub use error::MonitorError;

// Re-export the engine surface
pub use engine::{AnomalyDetector, ForecastingEngine};
pub use registry::{ModelBinding, ModelRegistry};
pub use scheduler::{StreamingScheduler, Workspace, WorkspaceStore};

// Re-export feed and sink traits
pub use alert::{AlertDispatcher, AlertTransport, RecipientDirectory};
pub use events::AnomalyEventSink;
pub use feed::SensorFeed;
