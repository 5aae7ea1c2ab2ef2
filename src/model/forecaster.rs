//! Direct multi-horizon linear forecaster.
//!
//! Each feature channel gets an independent set of horizon-step regressors:
//! step `t` of feature `f` is a linear combination of the normalized context
//! tail (`context_length` lags, oldest first) plus a bias. The weights are
//! produced offline by the training job and shipped as JSON artifacts;
//! inference here is a pure function with no gradient or training state.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::error::MonitorError;
use crate::types::NUM_FEATURES;

/// Checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable multi-horizon linear model.
///
/// Weight layout: `weights[f][t][k]` is the coefficient for lag `k`
/// (oldest-first within the context window) contributing to horizon step
/// `t` of feature `f`. `bias[f][t]` is the intercept for that step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearForecaster {
    /// Format version for forward compatibility.
    pub version: u32,
    /// Number of context points consumed per prediction.
    pub context_length: usize,
    /// Number of steps predicted per invocation.
    pub horizon: usize,
    /// NUM_FEATURES × horizon × context_length coefficients.
    pub weights: Vec<Vec<Vec<f64>>>,
    /// NUM_FEATURES × horizon intercepts.
    pub bias: Vec<Vec<f64>>,
}

/// Bare weight arrays without version/geometry metadata — the fallback
/// artifact format. Geometry is inferred from the array dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWeights {
    pub weights: Vec<Vec<Vec<f64>>>,
    pub bias: Vec<Vec<f64>>,
}

impl LinearForecaster {
    /// Persistence (naive last-value) model: every horizon step repeats the
    /// most recent context value. Used by tests and as a training-job
    /// seed artifact.
    pub fn persistence(context_length: usize, horizon: usize) -> Self {
        let mut weights =
            vec![vec![vec![0.0; context_length]; horizon]; NUM_FEATURES];
        for feature in weights.iter_mut() {
            for step in feature.iter_mut() {
                if let Some(last) = step.last_mut() {
                    *last = 1.0;
                }
            }
        }
        Self {
            version: CHECKPOINT_VERSION,
            context_length,
            horizon,
            weights,
            bias: vec![vec![0.0; horizon]; NUM_FEATURES],
        }
    }

    /// Check that the weight arrays agree with the declared geometry.
    pub fn validate_geometry(&self) -> Result<(), MonitorError> {
        if self.context_length == 0 || self.horizon == 0 {
            return Err(MonitorError::Artifact(
                "forecaster geometry must be non-zero".to_string(),
            ));
        }
        if self.weights.len() != NUM_FEATURES || self.bias.len() != NUM_FEATURES {
            return Err(MonitorError::Artifact(format!(
                "expected {} feature channels, got {} weight / {} bias rows",
                NUM_FEATURES,
                self.weights.len(),
                self.bias.len()
            )));
        }
        for (f, (w, b)) in self.weights.iter().zip(self.bias.iter()).enumerate() {
            if w.len() != self.horizon || b.len() != self.horizon {
                return Err(MonitorError::Artifact(format!(
                    "feature {f}: horizon mismatch (declared {}, weights {}, bias {})",
                    self.horizon,
                    w.len(),
                    b.len()
                )));
            }
            if let Some(step) = w.iter().find(|s| s.len() != self.context_length) {
                return Err(MonitorError::Artifact(format!(
                    "feature {f}: lag vector length {} != context length {}",
                    step.len(),
                    self.context_length
                )));
            }
        }
        Ok(())
    }

    /// Predict `horizon` steps from a normalized context window.
    ///
    /// `context` must be exactly `context_length` rows, oldest first.
    pub fn predict(
        &self,
        context: &[[f64; NUM_FEATURES]],
    ) -> Result<Vec<[f64; NUM_FEATURES]>, MonitorError> {
        if context.len() != self.context_length {
            return Err(MonitorError::Inference(format!(
                "context shape mismatch: model expects {} points, got {}",
                self.context_length,
                context.len()
            )));
        }

        let mut forecast = vec![[0.0; NUM_FEATURES]; self.horizon];
        for f in 0..NUM_FEATURES {
            for t in 0..self.horizon {
                let lags = &self.weights[f][t];
                let mut acc = self.bias[f][t];
                for (k, coeff) in lags.iter().enumerate() {
                    acc += coeff * context[k][f];
                }
                forecast[t][f] = acc;
            }
        }
        Ok(forecast)
    }

    /// Save a checkpoint to disk atomically (write temp file, then rename).
    pub fn save_to_disk(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp_path = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load a native checkpoint from disk.
    pub fn load_from_disk(path: &Path) -> Result<Self, MonitorError> {
        let data = std::fs::read(path)?;
        let forecaster: Self = serde_json::from_slice(&data)?;
        forecaster.validate_geometry()?;
        Ok(forecaster)
    }

    /// Reconstruct a forecaster from bare weight arrays, inferring geometry
    /// from the array dimensions.
    pub fn from_raw_weights(raw: RawWeights) -> Result<Self, MonitorError> {
        let horizon = raw
            .bias
            .first()
            .map(Vec::len)
            .ok_or_else(|| MonitorError::Artifact("raw weights have no bias rows".to_string()))?;
        let context_length = raw
            .weights
            .first()
            .and_then(|f| f.first())
            .map(Vec::len)
            .ok_or_else(|| {
                MonitorError::Artifact("raw weights have no lag vectors".to_string())
            })?;

        let forecaster = Self {
            version: CHECKPOINT_VERSION,
            context_length,
            horizon,
            weights: raw.weights,
            bias: raw.bias,
        };
        forecaster.validate_geometry()?;
        Ok(forecaster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_context(value: f64, len: usize) -> Vec<[f64; NUM_FEATURES]> {
        vec![[value; NUM_FEATURES]; len]
    }

    #[test]
    fn persistence_model_repeats_last_value() {
        let model = LinearForecaster::persistence(10, 4);
        let mut context = flat_context(0.2, 10);
        context[9] = [0.9; NUM_FEATURES];

        let forecast = model.predict(&context).expect("predict");
        assert_eq!(forecast.len(), 4);
        for row in &forecast {
            for v in row {
                assert!((v - 0.9).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn shape_mismatch_is_an_inference_error() {
        let model = LinearForecaster::persistence(10, 4);
        let err = model
            .predict(&flat_context(0.5, 7))
            .expect_err("short context must be rejected");
        assert!(matches!(err, MonitorError::Inference(_)));
    }

    #[test]
    fn geometry_validation_rejects_truncated_weights() {
        let mut model = LinearForecaster::persistence(10, 4);
        model.weights[2][1].pop();
        assert!(model.validate_geometry().is_err());
    }

    #[test]
    fn checkpoint_round_trip() {
        let model = LinearForecaster::persistence(50, 10);
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("forecaster.json");

        model.save_to_disk(&path).expect("save");
        let loaded = LinearForecaster::load_from_disk(&path).expect("load");

        assert_eq!(loaded.version, CHECKPOINT_VERSION);
        assert_eq!(loaded.context_length, 50);
        assert_eq!(loaded.horizon, 10);

        let context = flat_context(0.4, 50);
        let a = model.predict(&context).expect("predict a");
        let b = loaded.predict(&context).expect("predict b");
        assert_eq!(a, b);
    }

    #[test]
    fn raw_weights_infer_geometry() {
        let model = LinearForecaster::persistence(8, 3);
        let raw = RawWeights {
            weights: model.weights.clone(),
            bias: model.bias.clone(),
        };
        let rebuilt = LinearForecaster::from_raw_weights(raw).expect("rebuild");
        assert_eq!(rebuilt.context_length, 8);
        assert_eq!(rebuilt.horizon, 3);
    }
}
