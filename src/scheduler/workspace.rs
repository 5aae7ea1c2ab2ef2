//! Per-workspace runtime state.
//!
//! One aggregate per workspace id holds the rolling buffer, the last-seen
//! watermark, and the latest-prediction cache — a single lookup per tick
//! instead of three maps that can drift out of sync.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use crate::types::{LatestPrediction, SensorPoint};

/// Runtime state for one monitored workspace.
///
/// The buffer and watermark are written only by the scheduler (single
/// writer within a tick); the latest-prediction cache is a lock-free
/// whole-object swap so concurrent readers never see a partial update.
pub struct Workspace {
    pub id: String,
    capacity: usize,
    buffer: Mutex<VecDeque<SensorPoint>>,
    last_seen: Mutex<Option<DateTime<Utc>>>,
    latest: ArcSwapOption<LatestPrediction>,
}

impl Workspace {
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            last_seen: Mutex::new(None),
            latest: ArcSwapOption::const_empty(),
        }
    }

    /// Absorb freshly fetched points, keeping only those newer than the
    /// last-seen watermark and evicting the oldest beyond capacity.
    ///
    /// Returns the number of points actually appended.
    pub fn absorb(&self, points: &[SensorPoint]) -> usize {
        let mut watermark = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());

        let mut appended = 0;
        for point in points {
            if watermark.is_some_and(|seen| point.timestamp <= seen) {
                continue;
            }
            *watermark = Some(point.timestamp);
            if buffer.len() >= self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(point.clone());
            appended += 1;
        }
        appended
    }

    /// The most recent `n` buffered points, oldest first, or `None` when
    /// the buffer is still short of `n`.
    pub fn context(&self, n: usize) -> Option<Vec<SensorPoint>> {
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if buffer.len() < n {
            return None;
        }
        Some(buffer.iter().skip(buffer.len() - n).cloned().collect())
    }

    pub fn buffer_len(&self) -> usize {
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.len()
    }

    /// Atomically replace the latest prediction.
    pub fn store_prediction(&self, prediction: Arc<LatestPrediction>) {
        self.latest.store(Some(prediction));
    }

    /// Read the latest prediction, if one has been produced yet.
    pub fn latest_prediction(&self) -> Option<Arc<LatestPrediction>> {
        self.latest.load_full()
    }
}

/// Owned store of all workspace aggregates.
///
/// Workspaces are created on first observation from the feed and never
/// explicitly destroyed. The scheduler is the sole creator; the query
/// surface only reads.
pub struct WorkspaceStore {
    capacity: usize,
    inner: RwLock<HashMap<String, Arc<Workspace>>>,
}

impl WorkspaceStore {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            capacity: buffer_capacity,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a workspace, creating it on first observation.
    pub fn get_or_create(&self, id: &str) -> Arc<Workspace> {
        {
            let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if let Some(ws) = guard.get(id) {
                return Arc::clone(ws);
            }
        }
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            guard
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Workspace::new(id, self.capacity))),
        )
    }

    /// Read-only lookup without creating.
    pub fn get(&self, id: &str) -> Option<Arc<Workspace>> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.get(id).cloned()
    }

    /// Latest cached prediction for a workspace, if any.
    pub fn latest_prediction(&self, id: &str) -> Option<Arc<LatestPrediction>> {
        self.get(id).and_then(|ws| ws.latest_prediction())
    }

    /// Ids of all workspaces observed so far, sorted.
    pub fn workspace_ids(&self) -> Vec<String> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = guard.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
