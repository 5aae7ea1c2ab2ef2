//! Time-series store feed over HTTP (Flux query API).
//!
//! Queries the store's `/api/v2/query` endpoint and parses the annotated
//! CSV responses. Two query shapes are used: a `distinct` query for
//! workspace discovery and a column-pivoted range query for the raw
//! sensor rows.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

use async_trait::async_trait;

use crate::config::defaults::HTTP_TIMEOUT_SECS;
use crate::config::FeedSection;
use crate::error::MonitorError;
use crate::types::{SensorPoint, FEATURE_NAMES, NUM_FEATURES};

use super::SensorFeed;

/// HTTP client for the sensor time-series store.
#[derive(Clone)]
pub struct InfluxFeed {
    http: reqwest::Client,
    url: String,
    org: String,
    bucket: String,
    token: String,
    measurement: String,
}

impl InfluxFeed {
    /// Build a feed from the `[feed]` config section. The token is read
    /// from the configured environment variable; an absent token yields an
    /// unauthenticated client (useful against open dev stores).
    pub fn from_config(cfg: &FeedSection) -> Result<Self, MonitorError> {
        let token = std::env::var(&cfg.token_env).unwrap_or_default();
        if token.is_empty() {
            warn!(env = %cfg.token_env, "Store token not set — connecting unauthenticated");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| MonitorError::StoreConnection(e.to_string()))?;
        Ok(Self {
            http,
            url: cfg.url.trim_end_matches('/').to_string(),
            org: cfg.org.clone(),
            bucket: cfg.bucket.clone(),
            token,
            measurement: cfg.measurement.clone(),
        })
    }

    async fn query(&self, flux: String) -> Result<String, MonitorError> {
        let mut req = self
            .http
            .post(format!("{}/api/v2/query?org={}", self.url, self.org))
            .header("Accept", "application/csv")
            .header("Content-Type", "application/vnd.flux")
            .body(flux);
        if !self.token.is_empty() {
            req = req.header("Authorization", format!("Token {}", self.token));
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(MonitorError::StoreConnection(format!(
                "store query returned status {}",
                resp.status()
            )));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl SensorFeed for InfluxFeed {
    async fn discover_workspaces(&self, lookback: Duration) -> Result<Vec<String>, MonitorError> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
  |> range(start: -{secs}s)
  |> filter(fn: (r) => r._measurement == "{measurement}")
  |> keep(columns: ["workspace_id"])
  |> distinct(column: "workspace_id")"#,
            bucket = self.bucket,
            secs = lookback.as_secs(),
            measurement = self.measurement,
        );
        let body = self.query(flux).await?;
        Ok(parse_distinct_csv(&body))
    }

    async fn fetch_recent(
        &self,
        workspace_id: &str,
        lookback: Duration,
    ) -> Result<Vec<SensorPoint>, MonitorError> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
  |> range(start: -{secs}s)
  |> filter(fn: (r) => r._measurement == "{measurement}")
  |> filter(fn: (r) => r.workspace_id == "{workspace}")
  |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")
  |> sort(columns: ["_time"], desc: false)"#,
            bucket = self.bucket,
            secs = lookback.as_secs(),
            measurement = self.measurement,
            workspace = workspace_id,
        );
        let body = self.query(flux).await?;
        Ok(parse_pivot_csv(&body, workspace_id))
    }

    fn feed_name(&self) -> &str {
        "influx"
    }
}

// ============================================================================
// Annotated-CSV parsing
// ============================================================================

/// Extract workspace ids from a `distinct` query response.
fn parse_distinct_csv(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut value_col: Option<usize> = None;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            value_col = None;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        match value_col {
            None => {
                value_col = cells
                    .iter()
                    .position(|c| *c == "workspace_id")
                    .or_else(|| cells.iter().position(|c| *c == "_value"));
            }
            Some(idx) => {
                if let Some(value) = cells.get(idx) {
                    let value = value.trim();
                    if !value.is_empty() && !out.iter().any(|v| v == value) {
                        out.push(value.to_string());
                    }
                }
            }
        }
    }
    out
}

/// Parse column-pivoted sensor rows into [`SensorPoint`]s.
///
/// A row missing one of the six channels gets 0.0 for that channel — a
/// documented degradation that is logged, not silently accepted.
fn parse_pivot_csv(body: &str, workspace_id: &str) -> Vec<SensorPoint> {
    let mut points = Vec::new();
    let mut header: Option<PivotHeader> = None;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            header = None;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();

        let Some(h) = &header else {
            let parsed = PivotHeader::parse(&cells);
            for (feature, idx) in FEATURE_NAMES.iter().zip(parsed.features.iter()) {
                if idx.is_none() {
                    warn!(
                        workspace = %workspace_id,
                        feature = %feature,
                        "Feed response missing channel — defaulting to 0.0"
                    );
                }
            }
            header = Some(parsed);
            continue;
        };

        let Some(time_idx) = h.time else { continue };
        let Some(raw_time) = cells.get(time_idx) else {
            continue;
        };
        let Ok(timestamp) = DateTime::parse_from_rfc3339(raw_time.trim()) else {
            continue;
        };
        let timestamp: DateTime<Utc> = timestamp.with_timezone(&Utc);

        let mut values = [0.0; NUM_FEATURES];
        for (slot, idx) in values.iter_mut().zip(h.features.iter()) {
            if let Some(idx) = idx {
                *slot = cells
                    .get(*idx)
                    .and_then(|c| c.trim().parse::<f64>().ok())
                    .unwrap_or(0.0);
            }
        }
        points.push(SensorPoint::from_features(workspace_id, timestamp, values));
    }

    points.sort_by_key(|p| p.timestamp);
    points
}

/// Column indices for one pivoted table block.
struct PivotHeader {
    time: Option<usize>,
    features: [Option<usize>; NUM_FEATURES],
}

impl PivotHeader {
    fn parse(cells: &[&str]) -> Self {
        let mut features = [None; NUM_FEATURES];
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            features[i] = cells.iter().position(|c| c == name);
        }
        Self {
            time: cells.iter().position(|c| *c == "_time"),
            features,
        }
    }
}
