//! # Notification channel boundary
//!
//! Each channel implements "attempt delivery, report success/failure,
//! never raise past the boundary": a failing channel logs and returns
//! `false` instead of aborting alert creation.
//!
//! - `LogChannel`: structured log line, always succeeds
//! - `WebhookChannel` / `EmailChannel`: HTTP POST of the structured
//!   alert payload with a configured timeout
//! - `DashboardChannel`: in-process broadcast push for live dashboards

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerts::{Alert, AlertSeverity};
use crate::error::MonitorError;

/// Identifies a notification channel in alert-rule configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Log,
    Email,
    Webhook,
    Dashboard,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Log => "log",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Dashboard => "dashboard",
        }
    }
}

/// Structured payload delivered to external channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub alert_id: Uuid,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metric_value: f64,
    pub threshold_value: f64,
    pub session_id: Option<Uuid>,
    pub details: HashMap<String, Value>,
}

impl AlertPayload {
    pub fn from_alert(alert: &Alert) -> Self {
        Self {
            alert_id: alert.alert_id,
            severity: alert.severity,
            title: alert.title.clone(),
            message: alert.message.clone(),
            timestamp: alert.timestamp,
            metric_value: alert.metric_value,
            threshold_value: alert.threshold_value,
            session_id: alert.session_id,
            details: alert.details.clone(),
        }
    }
}

/// Delivery capability for one notification channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Attempt delivery. Returns `false` on failure, never errors.
    async fn notify(&self, alert: &Alert) -> bool;
}

/// Always-available channel that writes alerts to the service log.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Log
    }

    async fn notify(&self, alert: &Alert) -> bool {
        match alert.severity {
            AlertSeverity::Info => {
                info!(alert_id = %alert.alert_id, rule = %alert.rule_id, "ALERT: {}", alert.message)
            }
            AlertSeverity::Warning => {
                warn!(alert_id = %alert.alert_id, rule = %alert.rule_id, "ALERT: {}", alert.message)
            }
            AlertSeverity::Error | AlertSeverity::Critical => {
                error!(alert_id = %alert.alert_id, rule = %alert.rule_id, "ALERT: {}", alert.message)
            }
        }
        true
    }
}

/// Posts the alert payload to a configured webhook endpoint.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: String, timeout: Duration) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Notification(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn notify(&self, alert: &Alert) -> bool {
        let payload = AlertPayload::from_alert(alert);
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(alert_id = %alert.alert_id, "Webhook notification delivered");
                true
            }
            Ok(response) => {
                warn!(
                    alert_id = %alert.alert_id,
                    status = %response.status(),
                    "Webhook endpoint rejected notification"
                );
                false
            }
            Err(e) => {
                warn!(alert_id = %alert.alert_id, "Webhook notification failed: {}", e);
                false
            }
        }
    }
}

/// Email delivery through an HTTP mail gateway.
pub struct EmailChannel {
    client: reqwest::Client,
    gateway_url: String,
    recipients: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    recipients: &'a [String],
    subject: String,
    alert: AlertPayload,
}

impl EmailChannel {
    pub fn new(
        gateway_url: String,
        recipients: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Notification(e.to_string()))?;
        Ok(Self {
            client,
            gateway_url,
            recipients,
        })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn notify(&self, alert: &Alert) -> bool {
        if self.recipients.is_empty() {
            debug!("Email channel has no recipients configured, skipping");
            return false;
        }
        let request = EmailRequest {
            recipients: &self.recipients,
            subject: format!("[{}] {}", alert.severity.as_str(), alert.title),
            alert: AlertPayload::from_alert(alert),
        };
        match self
            .client
            .post(&self.gateway_url)
            .json(&request)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(
                    alert_id = %alert.alert_id,
                    status = %response.status(),
                    "Mail gateway rejected notification"
                );
                false
            }
            Err(e) => {
                warn!(alert_id = %alert.alert_id, "Email notification failed: {}", e);
                false
            }
        }
    }
}

/// In-process push channel for dashboard consumers.
pub struct DashboardChannel {
    sender: broadcast::Sender<AlertPayload>,
}

impl DashboardChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe a dashboard consumer to live alert pushes.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertPayload> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationChannel for DashboardChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Dashboard
    }

    async fn notify(&self, alert: &Alert) -> bool {
        // A send error only means no dashboard is currently subscribed.
        if self.sender.send(AlertPayload::from_alert(alert)).is_err() {
            debug!(alert_id = %alert.alert_id, "No dashboard subscribers for alert push");
        }
        true
    }
}
