//! Sensor feed abstraction.
//!
//! The feed is an external time-series store queried per tick: once to
//! discover which workspaces are actively reporting, then per workspace
//! for the recent raw points. Implementations handle transport and format
//! concerns internally; the scheduler only sees chronologically ascending
//! [`SensorPoint`]s.

pub mod influx;

pub use influx::InfluxFeed;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::MonitorError;
use crate::types::SensorPoint;

/// Trait abstracting where sensor points come from.
#[async_trait]
pub trait SensorFeed: Send + Sync {
    /// Workspace ids with data inside the lookback window.
    async fn discover_workspaces(&self, lookback: Duration) -> Result<Vec<String>, MonitorError>;

    /// Recent points for one workspace, chronologically ascending.
    async fn fetch_recent(
        &self,
        workspace_id: &str,
        lookback: Duration,
    ) -> Result<Vec<SensorPoint>, MonitorError>;

    /// Human-readable name for logging.
    fn feed_name(&self) -> &str;
}

// ============================================================================
// Replay Feed (tests / offline runs)
// ============================================================================

/// In-memory scripted feed.
///
/// Serves pre-loaded points per workspace; used by integration tests and
/// offline replay runs. Discovery order follows insertion order, which
/// keeps tick processing order deterministic in tests.
#[derive(Default)]
pub struct ReplayFeed {
    inner: Mutex<ReplayState>,
}

#[derive(Default)]
struct ReplayState {
    order: Vec<String>,
    points: HashMap<String, Vec<SensorPoint>>,
    discovery_error: Option<String>,
}

impl ReplayFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the scripted points for a workspace.
    pub fn set_points(&self, workspace_id: &str, points: Vec<SensorPoint>) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !state.order.iter().any(|w| w == workspace_id) {
            state.order.push(workspace_id.to_string());
        }
        state.points.insert(workspace_id.to_string(), points);
    }

    /// Make the next discovery calls fail with a store error.
    pub fn set_discovery_error(&self, message: impl Into<String>) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.discovery_error = Some(message.into());
    }

    /// Clear a previously scripted discovery error.
    pub fn clear_discovery_error(&self) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.discovery_error = None;
    }
}

#[async_trait]
impl SensorFeed for ReplayFeed {
    async fn discover_workspaces(&self, _lookback: Duration) -> Result<Vec<String>, MonitorError> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(msg) = &state.discovery_error {
            return Err(MonitorError::StoreConnection(msg.clone()));
        }
        Ok(state.order.clone())
    }

    async fn fetch_recent(
        &self,
        workspace_id: &str,
        _lookback: Duration,
    ) -> Result<Vec<SensorPoint>, MonitorError> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.points.get(workspace_id).cloned().unwrap_or_default())
    }

    fn feed_name(&self) -> &str {
        "replay"
    }
}
