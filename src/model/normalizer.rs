//! Min/max feature normalizer paired with each trained model.
//!
//! Artifacts are produced by the (external) training job together with the
//! model they were fitted alongside; the registry enforces that pairing.
//! Forward transform maps each channel into the model's training range;
//! the engine clamps the result to `[0, 1]` before inference.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MonitorError;
use crate::types::NUM_FEATURES;

/// Guard against degenerate (constant) training ranges.
const MIN_RANGE: f64 = 1e-12;

/// Per-feature min/max scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxNormalizer {
    pub min: [f64; NUM_FEATURES],
    pub max: [f64; NUM_FEATURES],
}

impl MinMaxNormalizer {
    pub fn new(min: [f64; NUM_FEATURES], max: [f64; NUM_FEATURES]) -> Self {
        Self { min, max }
    }

    /// Identity normalizer (unit range). Useful for tests and for models
    /// trained on pre-scaled data.
    pub fn identity() -> Self {
        Self {
            min: [0.0; NUM_FEATURES],
            max: [1.0; NUM_FEATURES],
        }
    }

    /// Forward transform: `(x - min) / (max - min)` per feature.
    ///
    /// A degenerate range (max == min) maps to 0.0 rather than dividing
    /// by zero. Out-of-training-range inputs produce values outside
    /// `[0, 1]`; the caller is responsible for clamping.
    pub fn transform(&self, raw: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
        let mut scaled = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            let range = self.max[i] - self.min[i];
            scaled[i] = if range.abs() < MIN_RANGE {
                0.0
            } else {
                (raw[i] - self.min[i]) / range
            };
        }
        scaled
    }

    /// Inverse transform back to raw scale.
    pub fn inverse(&self, scaled: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
        let mut raw = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            let range = self.max[i] - self.min[i];
            raw[i] = if range.abs() < MIN_RANGE {
                self.min[i]
            } else {
                scaled[i] * range + self.min[i]
            };
        }
        raw
    }

    /// Load a normalizer artifact (JSON) from disk.
    pub fn load_from_disk(path: &Path) -> Result<Self, MonitorError> {
        let data = std::fs::read(path)?;
        let normalizer: Self = serde_json::from_slice(&data)?;
        Ok(normalizer)
    }

    /// Save to disk atomically (write temp file, then rename).
    pub fn save_to_disk(&self, path: &Path) -> Result<(), MonitorError> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
