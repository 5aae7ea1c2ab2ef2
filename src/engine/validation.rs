//! Model validation against held-out recent data.
//!
//! Serves the query surface's "validate model for workspace" operation:
//! forecast from an older context slice, compare against the points that
//! actually arrived afterwards, and report per-feature MAE/RMSE/MAPE plus
//! an overall accuracy figure.

use chrono::Utc;
use statrs::statistics::Statistics;
use std::time::Duration;

use crate::error::MonitorError;
use crate::feed::SensorFeed;
use crate::registry::ModelRegistry;
use crate::types::{FeatureMetrics, SensorPoint, ValidationReport, FEATURE_NAMES, NUM_FEATURES};

use super::ForecastingEngine;

/// Floor on the MAPE denominator so near-zero actuals don't explode the
/// percentage.
const MAPE_EPSILON: f64 = 1e-9;

/// Validate a workspace's model against the most recent held-out points.
///
/// The last `horizon` fetched points are held out; the `context_length`
/// points before them form the forecast context.
pub async fn validate_workspace(
    feed: &dyn SensorFeed,
    registry: &ModelRegistry,
    workspace_id: &str,
    lookback: Duration,
) -> Result<ValidationReport, MonitorError> {
    let binding = registry
        .get(workspace_id)
        .ok_or_else(|| MonitorError::ModelNotFound {
            workspace: workspace_id.to_string(),
        })?;

    let context_length = binding.model.context_length();
    let horizon = binding.model.horizon();
    let needed = context_length + horizon;

    let points = feed.fetch_recent(workspace_id, lookback).await?;
    if points.len() < needed {
        return Err(MonitorError::InsufficientData {
            workspace: workspace_id.to_string(),
            needed,
            got: points.len(),
        });
    }

    let split = points.len() - horizon;
    let context = &points[split - context_length..split];
    let held_out = &points[split..];

    let output = ForecastingEngine::new().predict(&binding, context, Utc::now())?;
    Ok(score_forecast(workspace_id, &output.forecast.raw, held_out))
}

/// Compare raw-scale forecast rows against held-out actual points.
pub fn score_forecast(
    workspace_id: &str,
    forecast_raw: &[[f64; NUM_FEATURES]],
    held_out: &[SensorPoint],
) -> ValidationReport {
    let steps = forecast_raw.len().min(held_out.len());
    if steps == 0 {
        // Nothing to compare; an empty report beats NaN metrics.
        return ValidationReport {
            workspace_id: workspace_id.to_string(),
            validated_at: Utc::now(),
            horizon: 0,
            per_feature: Vec::new(),
            overall_accuracy: 0.0,
        };
    }
    let mut per_feature = Vec::with_capacity(NUM_FEATURES);

    for f in 0..NUM_FEATURES {
        let mut abs_errors = Vec::with_capacity(steps);
        let mut sq_errors = Vec::with_capacity(steps);
        let mut pct_errors = Vec::with_capacity(steps);

        for (row, point) in forecast_raw.iter().zip(held_out.iter()).take(steps) {
            let actual = point.features()[f];
            let err = actual - row[f];
            abs_errors.push(err.abs());
            sq_errors.push(err * err);
            pct_errors.push(err.abs() / actual.abs().max(MAPE_EPSILON) * 100.0);
        }

        per_feature.push(FeatureMetrics {
            feature: FEATURE_NAMES[f].to_string(),
            mae: abs_errors.iter().mean(),
            rmse: sq_errors.iter().mean().sqrt(),
            mape: pct_errors.iter().mean(),
        });
    }

    let mean_mape = per_feature.iter().map(|m| m.mape).mean();
    let overall_accuracy = (100.0 - mean_mape).max(0.0);

    ValidationReport {
        workspace_id: workspace_id.to_string(),
        validated_at: Utc::now(),
        horizon: steps,
        per_feature,
        overall_accuracy,
    }
}
