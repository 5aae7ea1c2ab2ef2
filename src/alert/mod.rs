//! Alert dispatch boundary.
//!
//! Given an at-risk assessment, resolve the workspace's notification
//! recipients and attempt delivery per recipient independently. Nothing
//! in this module is allowed to abort a monitoring cycle: absent
//! recipients are a no-op, a missing transport credential degrades to
//! "alerting disabled" (logged once), and one recipient's failure never
//! blocks another's delivery.

use async_trait::async_trait;
use futures::future;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::defaults::HTTP_TIMEOUT_SECS;
use crate::config::AlertingSection;
use crate::error::MonitorError;
use crate::types::AnomalyAssessment;

/// Subject line on outgoing alert mail.
const ALERT_SUBJECT: &str = "Machine Condition Alert";

// ============================================================================
// Boundary Traits
// ============================================================================

/// Resolves a workspace id to its notification recipients.
///
/// Absent directory data yields an empty list, not an error.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn recipients(&self, workspace_id: &str) -> Vec<String>;
}

/// Delivers one alert message to one recipient.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MonitorError>;
}

// ============================================================================
// Static Directory (config-backed)
// ============================================================================

/// Recipient directory backed by the `[alerting].recipients` config table.
pub struct StaticDirectory {
    recipients: HashMap<String, Vec<String>>,
}

impl StaticDirectory {
    pub fn new(recipients: HashMap<String, Vec<String>>) -> Self {
        Self { recipients }
    }
}

#[async_trait]
impl RecipientDirectory for StaticDirectory {
    async fn recipients(&self, workspace_id: &str) -> Vec<String> {
        self.recipients.get(workspace_id).cloned().unwrap_or_default()
    }
}

// ============================================================================
// HTTP Mail Transport
// ============================================================================

/// JSON mail-API transport (SendGrid wire shape).
pub struct HttpMailTransport {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    from_address: String,
}

impl HttpMailTransport {
    /// Build from the `[alerting]` config section. Returns `None` when the
    /// API key env var is unset — the dispatcher treats that as "alerting
    /// disabled" rather than an error.
    pub fn from_config(cfg: &AlertingSection) -> Option<Self> {
        let api_key = std::env::var(&cfg.api_key_env).ok()?;
        if api_key.is_empty() {
            return None;
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .ok()?;
        Some(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key,
            from_address: cfg.from_address.clone(),
        })
    }
}

#[async_trait]
impl AlertTransport for HttpMailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MonitorError> {
        let payload = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from_address },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MonitorError::Notification(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MonitorError::Notification(format!(
                "mail API returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Resolves recipients and fans an alert out through the transport.
pub struct AlertDispatcher {
    directory: Arc<dyn RecipientDirectory>,
    /// `None` means alerting is disabled (no credentials).
    transport: Option<Arc<dyn AlertTransport>>,
    disabled_logged: AtomicBool,
}

impl AlertDispatcher {
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        transport: Option<Arc<dyn AlertTransport>>,
    ) -> Self {
        Self {
            directory,
            transport,
            disabled_logged: AtomicBool::new(false),
        }
    }

    /// Deliver an at-risk alert to every recipient of the workspace.
    ///
    /// Returns the number of successful deliveries. Failures are logged
    /// per recipient; the already-persisted assessment is unaffected.
    pub async fn dispatch(&self, assessment: &AnomalyAssessment) -> usize {
        let Some(transport) = &self.transport else {
            // Logged once for the process lifetime, not per cycle.
            if !self.disabled_logged.swap(true, Ordering::Relaxed) {
                info!("Alert transport credentials not configured — alerting disabled");
            }
            return 0;
        };

        let recipients = self.directory.recipients(&assessment.workspace_id).await;
        if recipients.is_empty() {
            debug!(
                workspace = %assessment.workspace_id,
                "No alert recipients configured — skipping notification"
            );
            return 0;
        }

        // Deliveries are independent; fan out concurrently.
        let attempts = recipients.iter().map(|to| async move {
            let result = transport
                .send(to, ALERT_SUBJECT, &assessment.alert_message)
                .await;
            (to, result)
        });

        let mut delivered = 0;
        for (to, result) in future::join_all(attempts).await {
            match result {
                Ok(()) => {
                    debug!(workspace = %assessment.workspace_id, recipient = %to, "Alert delivered");
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        workspace = %assessment.workspace_id,
                        recipient = %to,
                        error = %e,
                        "Alert delivery failed"
                    );
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureDeviation, SeverityLevel, NUM_FEATURES};
    use std::sync::Mutex;

    fn assessment(workspace: &str) -> AnomalyAssessment {
        AnomalyAssessment {
            workspace_id: workspace.to_string(),
            timestamp: chrono::Utc::now(),
            anomaly_pct: [100.0; NUM_FEATURES],
            at_risk_features: vec!["current".to_string()],
            at_risk: true,
            severity_score: 0.8,
            severity_level: SeverityLevel::High,
            primary_anomaly: Some("current".to_string()),
            alert_message: "Machine at Risk: Stay alert on current".to_string(),
            deviations: [FeatureDeviation {
                actual: 0.0,
                predicted: 0.0,
                deviation: 0.0,
                deviation_pct: 0.0,
            }; NUM_FEATURES],
        }
    }

    /// Transport stub that fails for scripted recipients.
    struct FlakyTransport {
        fail_for: Vec<String>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertTransport for FlakyTransport {
        async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), MonitorError> {
            if self.fail_for.iter().any(|f| f == to) {
                return Err(MonitorError::Notification(format!("refused {to}")));
            }
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(to.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_failed_recipient_does_not_block_others() {
        let mut recipients = HashMap::new();
        recipients.insert(
            "mill-1".to_string(),
            vec![
                "a@example.com".to_string(),
                "b@example.com".to_string(),
                "c@example.com".to_string(),
            ],
        );
        let transport = Arc::new(FlakyTransport {
            fail_for: vec!["b@example.com".to_string()],
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = AlertDispatcher::new(
            Arc::new(StaticDirectory::new(recipients)),
            Some(transport.clone()),
        );

        let delivered = dispatcher.dispatch(&assessment("mill-1")).await;
        assert_eq!(delivered, 2);
        let sent = transport.sent.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(sent.as_slice(), ["a@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn no_recipients_is_a_noop() {
        let transport = Arc::new(FlakyTransport {
            fail_for: Vec::new(),
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = AlertDispatcher::new(
            Arc::new(StaticDirectory::new(HashMap::new())),
            Some(transport),
        );
        assert_eq!(dispatcher.dispatch(&assessment("unknown-ws")).await, 0);
    }

    #[tokio::test]
    async fn missing_transport_degrades_to_disabled() {
        let dispatcher =
            AlertDispatcher::new(Arc::new(StaticDirectory::new(HashMap::new())), None);
        assert_eq!(dispatcher.dispatch(&assessment("mill-1")).await, 0);
        // Second dispatch takes the already-logged path
        assert_eq!(dispatcher.dispatch(&assessment("mill-1")).await, 0);
        assert!(dispatcher.disabled_logged.load(Ordering::Relaxed));
    }
}
