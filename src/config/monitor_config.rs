//! Monitor configuration — operator-tunable TOML values.
//!
//! Every struct implements `Default` with values matching the constants in
//! [`defaults`](super::defaults), so behaviour is unchanged when no config
//! file is present.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Root configuration for a monitoring deployment.
///
/// Load with [`MonitorConfig::load`], which searches:
/// 1. `$SENTINEL_CONFIG` env var
/// 2. `./sentinel.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub detector: DetectorSection,

    #[serde(default)]
    pub artifacts: ArtifactsSection,

    #[serde(default)]
    pub feed: FeedSection,

    #[serde(default)]
    pub events: EventsSection,

    #[serde(default)]
    pub alerting: AlertingSection,
}

/// Scheduler timing and buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSection {
    /// Seconds between scheduler ticks.
    pub poll_interval_secs: u64,
    /// Discovery / fetch lookback window (seconds).
    pub lookback_secs: u64,
    /// Per-workspace rolling buffer capacity (points).
    pub buffer_capacity: usize,
    /// Seconds between automatic registry reloads (0 disables).
    pub registry_reload_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
            lookback_secs: defaults::LOOKBACK_SECS,
            buffer_capacity: defaults::BUFFER_CAPACITY,
            registry_reload_secs: defaults::REGISTRY_RELOAD_SECS,
        }
    }
}

/// Anomaly detection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSection {
    /// At-risk threshold on the per-feature anomaly percentage.
    pub anomaly_pct_threshold: f64,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            anomaly_pct_threshold: defaults::ANOMALY_PCT_THRESHOLD,
        }
    }
}

/// Model artifact store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsSection {
    /// Root directory scanned for model/normalizer pairs.
    pub root: PathBuf,
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./model-artifacts"),
        }
    }
}

/// Time-series store (sensor feed) connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSection {
    pub url: String,
    pub org: String,
    pub bucket: String,
    /// Env var holding the store token. Indirection keeps secrets out of
    /// the TOML file.
    pub token_env: String,
    pub measurement: String,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            org: "sentinel".to_string(),
            bucket: "sensors".to_string(),
            token_env: "SENTINEL_STORE_TOKEN".to_string(),
            measurement: defaults::SENSOR_MEASUREMENT.to_string(),
        }
    }
}

/// Anomaly event sink destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsSection {
    /// Bucket anomaly events are appended to.
    pub bucket: String,
    pub measurement: String,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            bucket: "anomalies".to_string(),
            measurement: defaults::ANOMALY_MEASUREMENT.to_string(),
        }
    }
}

/// Alert delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingSection {
    /// Sender address on outgoing alert mail.
    pub from_address: String,
    /// Env var holding the mail API key. Missing key degrades to
    /// "alerting disabled" (logged once), never an error.
    pub api_key_env: String,
    /// Mail API endpoint.
    pub endpoint: String,
    /// Static recipient directory: workspace id -> addresses.
    #[serde(default)]
    pub recipients: HashMap<String, Vec<String>>,
}

impl Default for AlertingSection {
    fn default() -> Self {
        Self {
            from_address: "alerts@machine-sentinel.local".to_string(),
            api_key_env: "SENTINEL_MAIL_API_KEY".to_string(),
            endpoint: "https://api.sendgrid.com/v3/mail/send".to_string(),
            recipients: HashMap::new(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("SENTINEL_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from SENTINEL_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from SENTINEL_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "SENTINEL_CONFIG points to non-existent file, falling back");
            }
        }

        let local = Path::new("sentinel.toml");
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!("Loaded config from ./sentinel.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./sentinel.toml, using defaults");
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Parse a specific TOML file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would wedge the scheduler.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.monitor.poll_interval_secs == 0 {
            anyhow::bail!("monitor.poll_interval_secs must be > 0");
        }
        if self.monitor.buffer_capacity == 0 {
            anyhow::bail!("monitor.buffer_capacity must be > 0");
        }
        if !(0.0..=100.0).contains(&self.detector.anomaly_pct_threshold) {
            anyhow::bail!(
                "detector.anomaly_pct_threshold must be within 0..=100 (got {})",
                self.detector.anomaly_pct_threshold
            );
        }
        Ok(())
    }
}
