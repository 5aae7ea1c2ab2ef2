//! Forecasting model artifacts: loading, format fallback, prediction.
//!
//! A model artifact is a directory containing either a native checkpoint
//! (`forecaster.json`: version + geometry + weights) or a bare
//! `weights.json` produced by older training jobs. The format is decided
//! once at load time and carried as a tagged variant, not re-decided per
//! call.

pub mod forecaster;
pub mod normalizer;

pub use forecaster::{LinearForecaster, RawWeights, CHECKPOINT_VERSION};
pub use normalizer::MinMaxNormalizer;

use std::path::Path;
use tracing::debug;

use crate::config::defaults::{CHECKPOINT_FILE, RAW_WEIGHTS_FILE};
use crate::error::MonitorError;
use crate::types::NUM_FEATURES;

/// A loaded model behind one `predict` capability.
///
/// The variant records which artifact format the model came from.
#[derive(Debug, Clone)]
pub enum ForecastModel {
    /// Native checkpoint (`forecaster.json`).
    Checkpoint(LinearForecaster),
    /// Bare weight arrays (`weights.json`), geometry inferred.
    RawWeights(LinearForecaster),
}

impl ForecastModel {
    /// Load a model from an artifact directory, trying the native
    /// checkpoint first and falling back to raw weights.
    ///
    /// A directory with neither file is a load failure the registry
    /// isolates per workspace, never a crash.
    pub fn load(dir: &Path) -> Result<Self, MonitorError> {
        let checkpoint_path = dir.join(CHECKPOINT_FILE);
        if checkpoint_path.is_file() {
            let model = LinearForecaster::load_from_disk(&checkpoint_path)?;
            debug!(path = %checkpoint_path.display(), "Loaded native model checkpoint");
            return Ok(Self::Checkpoint(model));
        }

        let raw_path = dir.join(RAW_WEIGHTS_FILE);
        if raw_path.is_file() {
            let data = std::fs::read(&raw_path)?;
            let raw: RawWeights = serde_json::from_slice(&data)?;
            let model = LinearForecaster::from_raw_weights(raw)?;
            debug!(path = %raw_path.display(), "Loaded raw-weights model (fallback format)");
            return Ok(Self::RawWeights(model));
        }

        Err(MonitorError::Artifact(format!(
            "model directory {} has neither {CHECKPOINT_FILE} nor {RAW_WEIGHTS_FILE}",
            dir.display()
        )))
    }

    fn inner(&self) -> &LinearForecaster {
        match self {
            Self::Checkpoint(m) | Self::RawWeights(m) => m,
        }
    }

    /// Context points consumed per prediction. Fixed per binding.
    pub fn context_length(&self) -> usize {
        self.inner().context_length
    }

    /// Forecast steps produced per prediction.
    pub fn horizon(&self) -> usize {
        self.inner().horizon
    }

    /// Artifact format name for logging.
    pub fn format_name(&self) -> &'static str {
        match self {
            Self::Checkpoint(_) => "checkpoint",
            Self::RawWeights(_) => "raw-weights",
        }
    }

    /// Run inference over a normalized context window.
    pub fn predict(
        &self,
        context: &[[f64; NUM_FEATURES]],
    ) -> Result<Vec<[f64; NUM_FEATURES]>, MonitorError> {
        self.inner().predict(context)
    }
}
