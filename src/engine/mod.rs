//! Forecasting engine: normalize, clamp, predict, denormalize.
//!
//! The engine is stateless. Everything model-specific (geometry, weights,
//! normalizer) lives in the [`ModelBinding`]; the engine applies the
//! binding to a raw context window and hands both scales of the forecast
//! to the detector.

pub mod anomaly;
pub mod validation;

pub use anomaly::AnomalyDetector;
pub use validation::validate_workspace;

use chrono::{DateTime, Utc};

use crate::error::MonitorError;
use crate::registry::ModelBinding;
use crate::types::{ForecastResult, SensorPoint, NUM_FEATURES};

/// Forecast plus the normalized context actually consumed by the model.
///
/// The detector needs the scaled context to compute the historical range
/// the forecast is scored against, so the engine returns it alongside.
#[derive(Debug, Clone)]
pub struct ForecastOutput {
    /// Normalized, clamped context rows (exactly `context_length`).
    pub scaled_context: Vec<[f64; NUM_FEATURES]>,
    pub forecast: ForecastResult,
}

/// Stateless forecast invocation wrapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForecastingEngine;

impl ForecastingEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run one inference pass for a workspace.
    ///
    /// Consumes the most recent `context_length` points of `window`
    /// (the model's constant, fixed per binding). The normalized context
    /// is clamped to `[0, 1]` before inference — a defensive bound against
    /// inputs outside the normalizer's training range.
    pub fn predict(
        &self,
        binding: &ModelBinding,
        window: &[SensorPoint],
        now: DateTime<Utc>,
    ) -> Result<ForecastOutput, MonitorError> {
        let needed = binding.model.context_length();
        if window.len() < needed {
            return Err(MonitorError::InsufficientData {
                workspace: binding.workspace_id.clone(),
                needed,
                got: window.len(),
            });
        }

        let tail = &window[window.len() - needed..];
        let scaled_context: Vec<[f64; NUM_FEATURES]> = tail
            .iter()
            .map(|p| {
                let mut scaled = binding.normalizer.transform(&p.features());
                for v in &mut scaled {
                    *v = v.clamp(0.0, 1.0);
                }
                scaled
            })
            .collect();

        let scaled = binding.model.predict(&scaled_context)?;
        let raw = scaled
            .iter()
            .map(|row| binding.normalizer.inverse(row))
            .collect();

        Ok(ForecastOutput {
            scaled_context,
            forecast: ForecastResult {
                workspace_id: binding.workspace_id.clone(),
                generated_at: now,
                scaled,
                raw,
            },
        })
    }
}
