//! Model registry: discovery and lifecycle of per-workspace bindings.
//!
//! The registry is the sole writer of the binding map. Bindings are
//! replaced wholesale (a fresh `Arc<ModelBinding>` per workspace), never
//! mutated in place, so a reload that races a tick can never expose a
//! half-updated binding to the scheduler.

pub mod artifact;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::error::MonitorError;
use crate::model::{ForecastModel, MinMaxNormalizer};
use artifact::{latest_artifact, scan_artifact_root, ArtifactRef};

/// The paired (model, normalizer) artifact currently active for a
/// workspace. Model and normalizer must come from the same training run,
/// enforced by the matching timestamp suffix.
#[derive(Debug, Clone)]
pub struct ModelBinding {
    pub workspace_id: String,
    pub model: ForecastModel,
    pub normalizer: MinMaxNormalizer,
    /// Artifact timestamp suffix shared by model and normalizer.
    pub artifact_timestamp: String,
    pub model_dir: PathBuf,
    pub loaded_at: DateTime<Utc>,
}

/// Discovers and owns all model bindings.
pub struct ModelRegistry {
    root: PathBuf,
    bindings: RwLock<HashMap<String, Arc<ModelBinding>>>,
}

impl ModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Scan the artifact root and load the latest valid (model, normalizer)
    /// pair for every workspace found there.
    ///
    /// Idempotent: an unchanged artifact set yields the same bindings, and
    /// a workspace whose selected artifact is unchanged is not re-loaded.
    /// Loading failures are isolated per workspace: logged, that workspace
    /// keeps its previous binding if it had one, and discovery continues.
    ///
    /// Returns the number of workspaces with a valid binding afterwards.
    pub fn discover_and_load(&self) -> usize {
        let (models, scalers) = scan_artifact_root(&self.root);

        if models.is_empty() {
            warn!(root = %self.root.display(), "No model artifacts found");
        }

        // Group model directories by workspace id.
        let mut by_workspace: HashMap<String, Vec<ArtifactRef>> = HashMap::new();
        for m in models {
            by_workspace.entry(m.workspace_id.clone()).or_default().push(m);
        }

        let previous = {
            let guard = self.bindings.read().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };

        let mut next: HashMap<String, Arc<ModelBinding>> = HashMap::new();

        for (workspace_id, candidates) in &by_workspace {
            let Some(selected) = latest_artifact(candidates) else {
                continue;
            };

            // Unchanged artifact: keep the existing binding, skip the I/O.
            if let Some(existing) = previous.get(workspace_id) {
                if existing.model_dir == selected.path
                    && existing.artifact_timestamp == selected.timestamp
                {
                    debug!(workspace = %workspace_id, "Model artifact unchanged, skipping reload");
                    next.insert(workspace_id.clone(), Arc::clone(existing));
                    continue;
                }
            }

            match load_binding(workspace_id, selected, &scalers) {
                Ok(binding) => {
                    info!(
                        workspace = %workspace_id,
                        artifact = %selected.path.display(),
                        format = binding.model.format_name(),
                        context_length = binding.model.context_length(),
                        horizon = binding.model.horizon(),
                        "Loaded model binding"
                    );
                    next.insert(workspace_id.clone(), Arc::new(binding));
                }
                Err(e) => {
                    warn!(workspace = %workspace_id, error = %e, "Failed to load model binding");
                    // A previously working binding survives a broken
                    // replacement artifact.
                    if let Some(existing) = previous.get(workspace_id) {
                        next.insert(workspace_id.clone(), Arc::clone(existing));
                    }
                }
            }
        }

        let loaded = next.len();
        {
            let mut guard = self.bindings.write().unwrap_or_else(|e| e.into_inner());
            *guard = next;
        }
        info!(total = loaded, "Model registry loaded");
        loaded
    }

    /// Re-run discovery. Workspaces whose latest artifact is unchanged are
    /// not re-loaded.
    pub fn reload(&self) -> usize {
        debug!("Checking for new or updated workspace models");
        self.discover_and_load()
    }

    /// Current binding for a workspace, if any.
    pub fn get(&self, workspace_id: &str) -> Option<Arc<ModelBinding>> {
        let guard = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        guard.get(workspace_id).cloned()
    }

    /// Workspace ids that currently have a valid binding, sorted.
    pub fn available_workspaces(&self) -> Vec<String> {
        let guard = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = guard.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        let guard = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load the (model, normalizer) pair for a selected model artifact.
///
/// The normalizer must carry the same timestamp suffix as the model
/// directory — a binding without its paired normalizer is invalid.
fn load_binding(
    workspace_id: &str,
    selected: &ArtifactRef,
    scalers: &[ArtifactRef],
) -> Result<ModelBinding, MonitorError> {
    let scaler = scalers
        .iter()
        .find(|s| s.workspace_id == workspace_id && s.timestamp == selected.timestamp)
        .ok_or_else(|| {
            MonitorError::Artifact(format!(
                "no normalizer with timestamp {} for workspace '{}'",
                selected.timestamp, workspace_id
            ))
        })?;

    let model = ForecastModel::load(&selected.path)?;
    let normalizer = MinMaxNormalizer::load_from_disk(&scaler.path)?;

    Ok(ModelBinding {
        workspace_id: workspace_id.to_string(),
        model,
        normalizer,
        artifact_timestamp: selected.timestamp.clone(),
        model_dir: selected.path.clone(),
        loaded_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearForecaster;
    use crate::types::NUM_FEATURES;
    use std::path::PathBuf;

    /// Write a complete (model dir, scaler file) pair under `root`.
    fn write_artifact_pair(root: &Path, workspace: &str, timestamp: &str) -> PathBuf {
        let dir = root.join(format!("model_{workspace}_{timestamp}"));
        LinearForecaster::persistence(10, 4)
            .save_to_disk(&dir.join("forecaster.json"))
            .expect("save model");
        MinMaxNormalizer::new([0.0; NUM_FEATURES], [10.0; NUM_FEATURES])
            .save_to_disk(&root.join(format!("scaler_{workspace}_{timestamp}.json")))
            .expect("save scaler");
        dir
    }

    #[test]
    fn binding_requires_paired_normalizer() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let dir = tmp.path().join("model_mill-3_20240101_120000");
        LinearForecaster::persistence(10, 4)
            .save_to_disk(&dir.join("forecaster.json"))
            .expect("save model");
        // Scaler from a different training run must not satisfy the pairing
        MinMaxNormalizer::identity()
            .save_to_disk(&tmp.path().join("scaler_mill-3_20230101_000000.json"))
            .expect("save stale scaler");

        let registry = ModelRegistry::new(tmp.path());
        assert_eq!(registry.discover_and_load(), 0);
        assert!(registry.get("mill-3").is_none());
    }

    #[test]
    fn load_failure_does_not_block_other_workspaces() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        write_artifact_pair(tmp.path(), "lathe-1", "20240101_120000");
        // Broken workspace: model dir exists but has no weights at all
        std::fs::create_dir(tmp.path().join("model_broken_20240101_120000")).expect("mkdir");
        MinMaxNormalizer::identity()
            .save_to_disk(&tmp.path().join("scaler_broken_20240101_120000.json"))
            .expect("save scaler");

        let registry = ModelRegistry::new(tmp.path());
        assert_eq!(registry.discover_and_load(), 1);
        assert!(registry.get("lathe-1").is_some());
        assert!(registry.get("broken").is_none());
    }

    #[test]
    fn discovery_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let dir = write_artifact_pair(tmp.path(), "robot-arm-02", "20240101_120000");

        let registry = ModelRegistry::new(tmp.path());
        registry.discover_and_load();
        let first = registry.get("robot-arm-02").expect("binding");
        registry.discover_and_load();
        let second = registry.get("robot-arm-02").expect("binding");

        assert_eq!(first.model_dir, dir);
        assert_eq!(second.model_dir, dir);
        // Unchanged artifact set: the same Arc is reused, not re-loaded.
        assert!(Arc::ptr_eq(&first, &second));
    }
}
