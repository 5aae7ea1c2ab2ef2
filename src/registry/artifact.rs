//! Artifact naming and discovery helpers.
//!
//! The training job publishes one directory per model run plus one
//! normalizer file, both named with the workspace id and a creation
//! timestamp:
//!
//! ```text
//! model_{workspace_id}_{YYYYMMDD}_{HHMMSS}/
//! scaler_{workspace_id}_{YYYYMMDD}_{HHMMSS}.json
//! ```
//!
//! Workspace ids may themselves contain the `_` delimiter, so parsing
//! strips the known prefix, splits on `_`, and treats everything except
//! the trailing two timestamp segments as the workspace id.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use crate::config::defaults::{MODEL_DIR_PREFIX, SCALER_FILE_EXT, SCALER_FILE_PREFIX};

/// `YYYYMMDD_HHMMSS` timestamp suffix.
fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{8}_\d{6}$").expect("static regex"))
}

/// A discovered artifact (model directory or normalizer file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub workspace_id: String,
    /// Timestamp suffix, e.g. `20240315_142530`.
    pub timestamp: String,
    pub path: PathBuf,
}

/// Parse `{prefix}{workspace}_{YYYYMMDD}_{HHMMSS}` into workspace id and
/// timestamp. Returns `None` for names that don't follow the convention.
pub fn parse_artifact_name(name: &str, prefix: &str) -> Option<(String, String)> {
    let rest = name.strip_prefix(prefix)?;
    let segments: Vec<&str> = rest.split('_').collect();
    if segments.len() < 3 {
        return None;
    }
    // Everything except the trailing two timestamp segments is the
    // workspace id (ids like "lathe_1_spindle" reconstruct correctly).
    let (id_segments, ts_segments) = segments.split_at(segments.len() - 2);
    let timestamp = ts_segments.join("_");
    if !timestamp_re().is_match(&timestamp) {
        return None;
    }
    Some((id_segments.join("_"), timestamp))
}

/// Filesystem creation time, falling back to modification time where the
/// platform does not expose creation time.
pub fn created_at(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Scan the artifact root for model directories and normalizer files.
///
/// Returns `(models, scalers)`. IO errors on individual entries are
/// skipped; an unreadable root yields empty results (the caller decides
/// how loudly to complain).
pub fn scan_artifact_root(root: &Path) -> (Vec<ArtifactRef>, Vec<ArtifactRef>) {
    let mut models = Vec::new();
    let mut scalers = Vec::new();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return (models, scalers),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if path.is_dir() {
            if let Some((workspace_id, timestamp)) = parse_artifact_name(name, MODEL_DIR_PREFIX) {
                models.push(ArtifactRef {
                    workspace_id,
                    timestamp,
                    path,
                });
            }
        } else if path.is_file() {
            let Some(stem) = name.strip_suffix(&format!(".{SCALER_FILE_EXT}")) else {
                continue;
            };
            if let Some((workspace_id, timestamp)) = parse_artifact_name(stem, SCALER_FILE_PREFIX) {
                scalers.push(ArtifactRef {
                    workspace_id,
                    timestamp,
                    path,
                });
            }
        }
    }

    (models, scalers)
}

/// Select the latest artifact by filesystem creation time.
///
/// Ties are broken by lexicographic path, which is undefined upstream but
/// deterministic for a fixed filesystem state.
pub fn latest_artifact(candidates: &[ArtifactRef]) -> Option<&ArtifactRef> {
    candidates
        .iter()
        .max_by(|a, b| {
            created_at(&a.path)
                .cmp(&created_at(&b.path))
                .then_with(|| a.path.cmp(&b.path))
        })
}
