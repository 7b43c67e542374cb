//! # Alert lifecycle manager
//!
//! Rule matching, cooldown suppression, severity classification, and
//! multi-channel notification dispatch:
//! - Rule-driven alerts carry their rule's configured severity
//! - Scorer-raised threshold alerts use the deviation ladder
//!   (>=25% critical, >=15% error, >=5% warning, else info)
//! - Cooldown checks are linearizable with alert creation: the
//!   recent-alert index and the insertion happen under one lock
//! - Lifecycle: active -> acknowledged -> resolved, active -> resolved,
//!   active -> suppressed; resolved and suppressed are terminal

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{gauge, increment_counter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AlertConfig;
use crate::notify::{ChannelKind, NotificationChannel};

/// Alert severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// Alert lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Suppressed,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Suppressed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Suppressed => "suppressed",
        }
    }
}

/// Comparison applied by a rule to its metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

impl AlertCondition {
    /// Condition wording used in human-readable alert messages.
    pub fn word(&self) -> &'static str {
        match self {
            AlertCondition::Gt => "above",
            AlertCondition::Lt => "below",
            AlertCondition::Eq => "equal to",
            AlertCondition::Gte => "at or above",
            AlertCondition::Lte => "at or below",
        }
    }

    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            AlertCondition::Gt => value > threshold,
            AlertCondition::Lt => value < threshold,
            AlertCondition::Eq => (value - threshold).abs() < f64::EPSILON,
            AlertCondition::Gte => value >= threshold,
            AlertCondition::Lte => value <= threshold,
        }
    }
}

/// Mutable alerting rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub rule_id: String,
    pub name: String,
    pub metric_name: String,
    pub condition: AlertCondition,
    pub threshold_value: f64,
    pub severity: AlertSeverity,
    pub enabled: bool,
    pub cooldown_minutes: u64,
    pub notification_channels: Vec<ChannelKind>,
}

impl AlertRule {
    fn validate(&self) -> Result<(), String> {
        if self.rule_id.trim().is_empty() {
            return Err("rule_id must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.metric_name.trim().is_empty() {
            return Err("metric_name must not be empty".to_string());
        }
        if !self.threshold_value.is_finite() {
            return Err(format!("threshold must be finite: {}", self.threshold_value));
        }
        Ok(())
    }
}

/// One raised alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: Uuid,
    pub rule_id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub title: String,
    pub message: String,
    pub metric_value: f64,
    pub threshold_value: f64,
    pub session_id: Option<Uuid>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub escalated: bool,
    pub escalation_level: u32,
    pub details: HashMap<String, Value>,
}

/// Aggregate alerting counters for the query surface.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlertMetricsSnapshot {
    pub total_created: u64,
    pub active: usize,
    pub created_by_severity: HashMap<String, u64>,
    pub active_by_status: HashMap<String, usize>,
    pub resolved_total: u64,
    pub avg_resolution_seconds: f64,
    pub escalated_active: usize,
}

/// Severity for scorer-raised threshold alerts, from fractional deviation.
pub fn severity_for_deviation(deviation: f64) -> AlertSeverity {
    if deviation >= 0.25 {
        AlertSeverity::Critical
    } else if deviation >= 0.15 {
        AlertSeverity::Error
    } else if deviation >= 0.05 {
        AlertSeverity::Warning
    } else {
        AlertSeverity::Info
    }
}

struct AlertState {
    rules: HashMap<String, AlertRule>,
    active: HashMap<Uuid, Alert>,
    history: Vec<Alert>,
    last_fired: HashMap<String, DateTime<Utc>>,
    total_created: u64,
    created_by_severity: HashMap<AlertSeverity, u64>,
    resolved_total: u64,
    avg_resolution_seconds: f64,
}

/// Owns alert state and the notification channel set.
pub struct AlertManager {
    config: AlertConfig,
    state: Mutex<AlertState>,
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
}

impl AlertManager {
    pub fn new(
        config: AlertConfig,
        channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
    ) -> Self {
        let mut rules = HashMap::new();
        for rule in Self::default_rules() {
            rules.insert(rule.rule_id.clone(), rule);
        }
        Self {
            config,
            state: Mutex::new(AlertState {
                rules,
                active: HashMap::new(),
                history: Vec::new(),
                last_fired: HashMap::new(),
                total_created: 0,
                created_by_severity: HashMap::new(),
                resolved_total: 0,
                avg_resolution_seconds: 0.0,
            }),
            channels,
        }
    }

    /// Rules registered at startup; persisted configuration overrides them.
    pub fn default_rules() -> Vec<AlertRule> {
        vec![
            AlertRule {
                rule_id: "generation_time_warning".to_string(),
                name: "Generation time elevated".to_string(),
                metric_name: "generation_time_seconds".to_string(),
                condition: AlertCondition::Gt,
                threshold_value: 30.0,
                severity: AlertSeverity::Warning,
                enabled: true,
                cooldown_minutes: 10,
                notification_channels: vec![ChannelKind::Log, ChannelKind::Dashboard],
            },
            AlertRule {
                rule_id: "performance_critical".to_string(),
                name: "Generation time critical".to_string(),
                metric_name: "generation_time_seconds".to_string(),
                condition: AlertCondition::Gt,
                threshold_value: 45.0,
                severity: AlertSeverity::Critical,
                enabled: true,
                cooldown_minutes: 10,
                notification_channels: vec![
                    ChannelKind::Log,
                    ChannelKind::Dashboard,
                    ChannelKind::Webhook,
                ],
            },
            AlertRule {
                rule_id: "extraction_quality_low".to_string(),
                name: "Extraction quality low".to_string(),
                metric_name: "extraction_accuracy".to_string(),
                condition: AlertCondition::Lt,
                threshold_value: 0.7,
                severity: AlertSeverity::Warning,
                enabled: true,
                cooldown_minutes: 30,
                notification_channels: vec![ChannelKind::Log, ChannelKind::Dashboard],
            },
            AlertRule {
                rule_id: "consistency_low".to_string(),
                name: "Ecosystem consistency low".to_string(),
                metric_name: "ecosystem_consistency".to_string(),
                condition: AlertCondition::Lt,
                threshold_value: 0.6,
                severity: AlertSeverity::Warning,
                enabled: true,
                cooldown_minutes: 30,
                notification_channels: vec![ChannelKind::Log, ChannelKind::Dashboard],
            },
            AlertRule {
                rule_id: "satisfaction_low".to_string(),
                name: "Predicted satisfaction low".to_string(),
                metric_name: "user_satisfaction".to_string(),
                condition: AlertCondition::Lt,
                threshold_value: 0.6,
                severity: AlertSeverity::Error,
                enabled: true,
                cooldown_minutes: 30,
                notification_channels: vec![
                    ChannelKind::Log,
                    ChannelKind::Dashboard,
                    ChannelKind::Webhook,
                ],
            },
            AlertRule {
                rule_id: "session_error_rate_high".to_string(),
                name: "Session error rate high".to_string(),
                metric_name: "session_error_rate".to_string(),
                condition: AlertCondition::Gt,
                threshold_value: 0.25,
                severity: AlertSeverity::Error,
                enabled: true,
                cooldown_minutes: 15,
                notification_channels: vec![ChannelKind::Log, ChannelKind::Dashboard],
            },
            AlertRule {
                rule_id: "multi_metric_degradation".to_string(),
                name: "Multiple quality metrics degraded".to_string(),
                metric_name: "degraded_metric_count".to_string(),
                condition: AlertCondition::Gte,
                threshold_value: 2.0,
                severity: AlertSeverity::Error,
                enabled: true,
                cooldown_minutes: 60,
                notification_channels: vec![
                    ChannelKind::Log,
                    ChannelKind::Dashboard,
                    ChannelKind::Webhook,
                ],
            },
        ]
    }

    /// Register a rule. Invalid rules are rejected with `false`.
    pub async fn register_rule(&self, rule: AlertRule) -> bool {
        if let Err(reason) = rule.validate() {
            warn!(rule_id = %rule.rule_id, "Rejected alert rule: {}", reason);
            return false;
        }
        let mut state = self.state.lock().await;
        info!(rule_id = %rule.rule_id, "Alert rule registered");
        state.rules.insert(rule.rule_id.clone(), rule);
        true
    }

    /// Update an existing rule in place; `false` if it does not exist.
    pub async fn update_rule(&self, rule: AlertRule) -> bool {
        if rule.validate().is_err() {
            return false;
        }
        let mut state = self.state.lock().await;
        if !state.rules.contains_key(&rule.rule_id) {
            return false;
        }
        state.rules.insert(rule.rule_id.clone(), rule);
        true
    }

    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        let mut state = self.state.lock().await;
        state.rules.remove(rule_id).is_some()
    }

    pub async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> bool {
        let mut state = self.state.lock().await;
        match state.rules.get_mut(rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn get_rule(&self, rule_id: &str) -> Option<AlertRule> {
        self.state.lock().await.rules.get(rule_id).cloned()
    }

    /// Apply persisted rules over the defaults. Returns how many applied.
    pub async fn load_rules(&self, rules: Vec<AlertRule>) -> usize {
        let mut applied = 0;
        for rule in rules {
            if rule.validate().is_ok() {
                let mut state = self.state.lock().await;
                state.rules.insert(rule.rule_id.clone(), rule);
                applied += 1;
            }
        }
        applied
    }

    pub async fn export_rules(&self) -> Vec<AlertRule> {
        let state = self.state.lock().await;
        let mut rules: Vec<AlertRule> = state.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        rules
    }

    /// Create a rule-driven alert.
    ///
    /// Returns `None` when the rule is unknown, disabled, or within its
    /// cooldown window. The alert carries the rule's configured severity.
    pub async fn create_alert(
        &self,
        rule_id: &str,
        value: f64,
        session_id: Option<Uuid>,
        details: Option<HashMap<String, Value>>,
    ) -> Option<Alert> {
        let (alert, channel_kinds) = {
            let mut state = self.state.lock().await;
            let rule = match state.rules.get(rule_id) {
                Some(rule) => rule.clone(),
                None => {
                    warn!(rule_id, "Alert requested for unknown rule");
                    return None;
                }
            };
            if !rule.enabled {
                debug!(rule_id, "Alert suppressed: rule disabled");
                return None;
            }
            if self.in_cooldown(&state, rule_id, rule.cooldown_minutes) {
                debug!(rule_id, "Alert suppressed: cooldown active");
                return None;
            }
            let alert = Self::build_alert(&rule, rule.severity, value, session_id, details);
            Self::store_alert(&mut state, &alert);
            (alert, rule.notification_channels)
        };

        self.publish_metrics(&alert).await;
        self.dispatch(&alert, &channel_kinds).await;
        Some(alert)
    }

    /// Create a threshold-crossing alert raised directly by a scorer.
    ///
    /// Severity comes from the deviation ladder rather than from a
    /// configured rule; an implicit rule entry keeps the alert traceable
    /// via `rule_id` and gives it a cooldown of its own.
    #[allow(clippy::too_many_arguments)]
    pub async fn raise_threshold_alert(
        &self,
        metric_name: &str,
        value: f64,
        threshold: f64,
        deviation: f64,
        condition: AlertCondition,
        cooldown_minutes: u64,
        session_id: Option<Uuid>,
        details: Option<HashMap<String, Value>>,
    ) -> Option<Alert> {
        let severity = severity_for_deviation(deviation);
        let rule_id = format!("threshold_{metric_name}");

        let (alert, channel_kinds) = {
            let mut state = self.state.lock().await;
            if self.in_cooldown(&state, &rule_id, cooldown_minutes) {
                debug!(rule_id = %rule_id, "Threshold alert suppressed: cooldown active");
                return None;
            }
            let rule = AlertRule {
                rule_id: rule_id.clone(),
                name: format!("{metric_name} threshold crossing"),
                metric_name: metric_name.to_string(),
                condition,
                threshold_value: threshold,
                severity,
                enabled: true,
                cooldown_minutes,
                notification_channels: vec![ChannelKind::Log, ChannelKind::Dashboard],
            };
            // Keep the implicit rule visible so rule_id stays traceable.
            state.rules.insert(rule_id.clone(), rule.clone());
            let alert = Self::build_alert(&rule, severity, value, session_id, details);
            Self::store_alert(&mut state, &alert);
            (alert, rule.notification_channels)
        };

        self.publish_metrics(&alert).await;
        self.dispatch(&alert, &channel_kinds).await;
        Some(alert)
    }

    /// Evaluate a workflow metric against every enabled rule watching it,
    /// creating an alert for each rule whose condition holds.
    pub async fn evaluate_metric(
        &self,
        metric_name: &str,
        value: f64,
        session_id: Option<Uuid>,
    ) -> Vec<Alert> {
        let matching: Vec<String> = {
            let state = self.state.lock().await;
            state
                .rules
                .values()
                .filter(|r| {
                    r.enabled
                        && r.metric_name == metric_name
                        && r.condition.holds(value, r.threshold_value)
                })
                .map(|r| r.rule_id.clone())
                .collect()
        };
        let mut created = Vec::new();
        for rule_id in matching {
            if let Some(alert) = self.create_alert(&rule_id, value, session_id, None).await {
                created.push(alert);
            }
        }
        created
    }

    pub async fn acknowledge(&self, alert_id: Uuid, user: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.active.get_mut(&alert_id) {
            Some(alert) if alert.status == AlertStatus::Active => {
                alert.status = AlertStatus::Acknowledged;
                alert.acknowledged_by = Some(user.to_string());
                alert.acknowledged_at = Some(Utc::now());
                info!(%alert_id, user, "Alert acknowledged");
                true
            }
            _ => false,
        }
    }

    /// Resolve an alert and fold its resolution latency into the running
    /// average.
    pub async fn resolve(&self, alert_id: Uuid, user: Option<&str>) -> bool {
        let mut state = self.state.lock().await;
        let resolved_at = Utc::now();
        let latency = match state.active.get_mut(&alert_id) {
            Some(alert) if !alert.status.is_terminal() => {
                alert.status = AlertStatus::Resolved;
                alert.resolved_at = Some(resolved_at);
                if let Some(user) = user {
                    alert
                        .details
                        .insert("resolved_by".to_string(), Value::String(user.to_string()));
                }
                (resolved_at - alert.timestamp).num_milliseconds().max(0) as f64 / 1000.0
            }
            _ => return false,
        };

        state.resolved_total += 1;
        let n = state.resolved_total as f64;
        state.avg_resolution_seconds = (state.avg_resolution_seconds * (n - 1.0) + latency) / n;
        info!(%alert_id, latency_seconds = latency, "Alert resolved");
        true
    }

    pub async fn suppress(&self, alert_id: Uuid, user: &str, reason: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.active.get_mut(&alert_id) {
            Some(alert) if alert.status == AlertStatus::Active => {
                alert.status = AlertStatus::Suppressed;
                alert
                    .details
                    .insert("suppressed_by".to_string(), Value::String(user.to_string()));
                alert.details.insert(
                    "suppression_reason".to_string(),
                    Value::String(reason.to_string()),
                );
                info!(%alert_id, user, reason, "Alert suppressed");
                true
            }
            _ => false,
        }
    }

    pub async fn get_active_alerts(&self, severity: Option<AlertSeverity>) -> Vec<Alert> {
        let state = self.state.lock().await;
        let mut alerts: Vec<Alert> = state
            .active
            .values()
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts
    }

    pub async fn get_alert_history(
        &self,
        hours: u64,
        severity: Option<AlertSeverity>,
    ) -> Vec<Alert> {
        let cutoff = Utc::now() - Duration::hours(hours as i64);
        let state = self.state.lock().await;
        state
            .history
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .cloned()
            .collect()
    }

    pub async fn get_alert_metrics(&self) -> AlertMetricsSnapshot {
        let state = self.state.lock().await;
        let mut created_by_severity = HashMap::new();
        for (severity, count) in &state.created_by_severity {
            created_by_severity.insert(severity.as_str().to_string(), *count);
        }
        let mut active_by_status: HashMap<String, usize> = HashMap::new();
        for alert in state.active.values() {
            *active_by_status
                .entry(alert.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        AlertMetricsSnapshot {
            total_created: state.total_created,
            active: state.active.len(),
            created_by_severity,
            active_by_status,
            resolved_total: state.resolved_total,
            avg_resolution_seconds: state.avg_resolution_seconds,
            escalated_active: state.active.values().filter(|a| a.escalated).count(),
        }
    }

    /// Escalate alerts unresolved past the escalation window; one level
    /// per elapsed window.
    pub async fn escalate_overdue(&self) -> usize {
        let window = self.config.escalation_window_minutes;
        if window == 0 {
            return 0;
        }
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let mut escalated = 0;
        for alert in state.active.values_mut() {
            if alert.status.is_terminal() {
                continue;
            }
            let elapsed_minutes = (now - alert.timestamp).num_minutes().max(0) as u64;
            let due_level = (elapsed_minutes / window) as u32;
            if due_level > alert.escalation_level {
                alert.escalated = true;
                alert.escalation_level = due_level;
                escalated += 1;
                warn!(
                    alert_id = %alert.alert_id,
                    level = alert.escalation_level,
                    "Alert escalated"
                );
            }
        }
        escalated
    }

    /// Drop history entries older than the configured retention.
    pub async fn prune_history(&self) -> usize {
        let cutoff = Utc::now() - Duration::days(self.config.alert_retention_days as i64);
        let mut state = self.state.lock().await;
        let before = state.history.len();
        state.history.retain(|a| a.timestamp >= cutoff);
        before - state.history.len()
    }

    /// Drop resolved alerts older than `max_age_hours` from the active
    /// index. They remain in history until history retention expires.
    pub async fn prune_resolved(&self, max_age_hours: u64) -> usize {
        let cutoff = Utc::now() - Duration::hours(max_age_hours as i64);
        let mut state = self.state.lock().await;
        let before = state.active.len();
        state
            .active
            .retain(|_, a| !(a.status == AlertStatus::Resolved && a.resolved_at.map_or(false, |t| t < cutoff)));
        let dropped = before - state.active.len();
        if dropped > 0 {
            gauge!("stack_monitor.active_alerts", state.active.len() as f64);
        }
        dropped
    }

    /// Enforce the active-set cap, evicting the oldest resolved alerts
    /// first and never evicting unresolved ones.
    pub async fn cap_active(&self) -> usize {
        let mut state = self.state.lock().await;
        if state.active.len() <= self.config.max_active_alerts {
            return 0;
        }
        let mut resolved: Vec<(Uuid, DateTime<Utc>)> = state
            .active
            .values()
            .filter(|a| a.status == AlertStatus::Resolved)
            .map(|a| (a.alert_id, a.timestamp))
            .collect();
        resolved.sort_by_key(|(_, ts)| *ts);

        let excess = state.active.len() - self.config.max_active_alerts;
        let mut evicted = 0;
        for (alert_id, _) in resolved.into_iter().take(excess) {
            state.active.remove(&alert_id);
            evicted += 1;
        }
        if evicted > 0 {
            gauge!("stack_monitor.active_alerts", state.active.len() as f64);
            debug!(evicted, "Active alert index capped");
        }
        evicted
    }

    /// One pass of the bulk maintenance work.
    pub async fn run_maintenance(&self) {
        let escalated = self.escalate_overdue().await;
        let pruned = self.prune_history().await;
        let expired = self.prune_resolved(self.config.resolved_retention_hours).await;
        let capped = self.cap_active().await;
        if escalated + pruned + expired + capped > 0 {
            debug!(
                escalated,
                pruned, expired, capped, "Alert maintenance pass complete"
            );
        }
    }

    fn in_cooldown(&self, state: &AlertState, rule_id: &str, cooldown_minutes: u64) -> bool {
        if cooldown_minutes == 0 {
            return false;
        }
        match state.last_fired.get(rule_id) {
            Some(last) => Utc::now() - *last < Duration::minutes(cooldown_minutes as i64),
            None => false,
        }
    }

    fn build_alert(
        rule: &AlertRule,
        severity: AlertSeverity,
        value: f64,
        session_id: Option<Uuid>,
        details: Option<HashMap<String, Value>>,
    ) -> Alert {
        Alert {
            alert_id: Uuid::new_v4(),
            rule_id: rule.rule_id.clone(),
            timestamp: Utc::now(),
            severity,
            status: AlertStatus::Active,
            title: rule.name.clone(),
            message: format!(
                "{} {} threshold: {} (threshold: {})",
                rule.metric_name,
                rule.condition.word(),
                value,
                rule.threshold_value
            ),
            metric_value: value,
            threshold_value: rule.threshold_value,
            session_id,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            escalated: false,
            escalation_level: 0,
            details: details.unwrap_or_default(),
        }
    }

    fn store_alert(state: &mut AlertState, alert: &Alert) {
        state.active.insert(alert.alert_id, alert.clone());
        state.history.push(alert.clone());
        state
            .last_fired
            .insert(alert.rule_id.clone(), alert.timestamp);
        state.total_created += 1;
        *state.created_by_severity.entry(alert.severity).or_insert(0) += 1;
    }

    async fn publish_metrics(&self, alert: &Alert) {
        increment_counter!(
            "stack_monitor.alerts_created",
            "severity" => alert.severity.as_str().to_string()
        );
        let active = self.state.lock().await.active.len();
        gauge!("stack_monitor.active_alerts", active as f64);
    }

    /// Fan out to the rule's channels. Failures are independent and never
    /// roll back alert creation.
    async fn dispatch(&self, alert: &Alert, kinds: &[ChannelKind]) {
        for kind in kinds {
            match self.channels.get(kind) {
                Some(channel) => {
                    if !channel.notify(alert).await {
                        warn!(
                            alert_id = %alert.alert_id,
                            channel = kind.as_str(),
                            "Notification delivery failed"
                        );
                    }
                }
                None => {
                    debug!(
                        channel = kind.as_str(),
                        "No channel registered for kind, skipping"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
impl AlertManager {
    /// Shift an alert's creation time into the past, for maintenance tests.
    pub(crate) async fn backdate_alert(&self, alert_id: Uuid, minutes: i64) {
        let mut state = self.state.lock().await;
        if let Some(alert) = state.active.get_mut(&alert_id) {
            alert.timestamp = alert.timestamp - Duration::minutes(minutes);
        }
        for alert in state.history.iter_mut() {
            if alert.alert_id == alert_id {
                alert.timestamp = alert.timestamp - Duration::minutes(minutes);
            }
        }
    }

    /// Shift an alert's resolution time into the past.
    pub(crate) async fn backdate_resolution(&self, alert_id: Uuid, hours: i64) {
        let mut state = self.state.lock().await;
        if let Some(alert) = state.active.get_mut(&alert_id) {
            if let Some(resolved_at) = alert.resolved_at {
                alert.resolved_at = Some(resolved_at - Duration::hours(hours));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    fn manager() -> AlertManager {
        AlertManager::new(AlertConfig::default(), HashMap::new())
    }

    fn manager_with(config: AlertConfig) -> AlertManager {
        AlertManager::new(config, HashMap::new())
    }

    fn quick_rule(rule_id: &str, metric: &str) -> AlertRule {
        AlertRule {
            rule_id: rule_id.to_string(),
            name: format!("{metric} rule"),
            metric_name: metric.to_string(),
            condition: AlertCondition::Gt,
            threshold_value: 1.0,
            severity: AlertSeverity::Warning,
            enabled: true,
            cooldown_minutes: 0,
            notification_channels: vec![ChannelKind::Log],
        }
    }

    struct CountingChannel {
        kind: ChannelKind,
        delivered: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        fn kind(&self) -> ChannelKind {
            self.kind
        }

        async fn notify(&self, _alert: &Alert) -> bool {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    #[tokio::test]
    async fn rule_alert_carries_rule_severity_and_cooldown_suppresses() {
        let manager = manager();

        let first = manager
            .create_alert("performance_critical", 50.0, None, None)
            .await;
        let alert = first.expect("first alert should fire");
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.threshold_value, 45.0);
        assert!(alert.message.contains("above threshold"));

        // Second trigger for the same rule within its 10 minute cooldown.
        let second = manager
            .create_alert("performance_critical", 55.0, None, None)
            .await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn unknown_and_disabled_rules_return_none() {
        let manager = manager();
        assert!(manager.create_alert("no_such_rule", 1.0, None, None).await.is_none());

        assert!(manager.set_rule_enabled("consistency_low", false).await);
        assert!(manager.create_alert("consistency_low", 0.2, None, None).await.is_none());
    }

    #[tokio::test]
    async fn invalid_rule_rejected_at_registration() {
        let manager = manager();
        let mut rule = quick_rule("", "some_metric");
        assert!(!manager.register_rule(rule.clone()).await);

        rule.rule_id = "ok".to_string();
        rule.threshold_value = f64::NAN;
        assert!(!manager.register_rule(rule).await);
    }

    #[test]
    fn deviation_ladder_is_monotone() {
        let bands = [0.0, 0.04, 0.05, 0.10, 0.15, 0.20, 0.25, 0.60];
        let mut last = AlertSeverity::Info;
        for deviation in bands {
            let severity = severity_for_deviation(deviation);
            assert!(severity >= last, "severity regressed at {deviation}");
            last = severity;
        }
        assert_eq!(severity_for_deviation(0.04), AlertSeverity::Info);
        assert_eq!(severity_for_deviation(0.05), AlertSeverity::Warning);
        assert_eq!(severity_for_deviation(0.15), AlertSeverity::Error);
        assert_eq!(severity_for_deviation(0.25), AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn threshold_alert_uses_deviation_severity() {
        let manager = manager();
        let alert = manager
            .raise_threshold_alert(
                "extraction_accuracy",
                0.49,
                0.7,
                (0.7 - 0.49) / 0.7,
                AlertCondition::Lt,
                0,
                None,
                None,
            )
            .await
            .unwrap();
        // 30% shortfall -> critical.
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.rule_id, "threshold_extraction_accuracy");
        // The implicit rule is traceable.
        assert!(manager.get_rule("threshold_extraction_accuracy").await.is_some());
    }

    #[tokio::test]
    async fn lifecycle_terminal_states_are_closed() {
        let manager = manager();
        manager.register_rule(quick_rule("r1", "m1")).await;
        let alert = manager.create_alert("r1", 2.0, None, None).await.unwrap();

        assert!(manager.acknowledge(alert.alert_id, "oncall").await);
        // Acknowledged alerts cannot be suppressed or re-acknowledged.
        assert!(!manager.acknowledge(alert.alert_id, "oncall").await);
        assert!(!manager.suppress(alert.alert_id, "oncall", "noise").await);

        assert!(manager.resolve(alert.alert_id, Some("oncall")).await);
        // Resolved is terminal.
        assert!(!manager.acknowledge(alert.alert_id, "oncall").await);
        assert!(!manager.resolve(alert.alert_id, None).await);
        assert!(!manager.suppress(alert.alert_id, "oncall", "noise").await);
    }

    #[tokio::test]
    async fn suppressed_is_terminal() {
        let manager = manager();
        manager.register_rule(quick_rule("r2", "m2")).await;
        let alert = manager.create_alert("r2", 2.0, None, None).await.unwrap();

        assert!(manager.suppress(alert.alert_id, "oncall", "maintenance window").await);
        assert!(!manager.resolve(alert.alert_id, None).await);
        assert!(!manager.acknowledge(alert.alert_id, "oncall").await);
    }

    #[tokio::test]
    async fn resolution_latency_feeds_running_average() {
        let manager = manager();
        manager.register_rule(quick_rule("r3", "m3")).await;
        manager.register_rule(quick_rule("r4", "m4")).await;

        let a = manager.create_alert("r3", 2.0, None, None).await.unwrap();
        let b = manager.create_alert("r4", 2.0, None, None).await.unwrap();
        assert!(manager.resolve(a.alert_id, None).await);
        assert!(manager.resolve(b.alert_id, None).await);

        let metrics = manager.get_alert_metrics().await;
        assert_eq!(metrics.resolved_total, 2);
        assert!(metrics.avg_resolution_seconds >= 0.0);
    }

    #[tokio::test]
    async fn escalation_adds_one_level_per_window() {
        let config = AlertConfig {
            escalation_window_minutes: 30,
            ..AlertConfig::default()
        };
        let manager = manager_with(config);
        manager.register_rule(quick_rule("r5", "m5")).await;
        let alert = manager.create_alert("r5", 2.0, None, None).await.unwrap();

        manager.backdate_alert(alert.alert_id, 65).await;
        let escalated = manager.escalate_overdue().await;
        assert_eq!(escalated, 1);

        let active = manager.get_active_alerts(None).await;
        assert!(active[0].escalated);
        assert_eq!(active[0].escalation_level, 2);
    }

    #[tokio::test]
    async fn cap_evicts_only_resolved() {
        let config = AlertConfig {
            max_active_alerts: 2,
            ..AlertConfig::default()
        };
        let manager = manager_with(config);
        for i in 0..3 {
            manager
                .register_rule(quick_rule(&format!("cap_{i}"), &format!("metric_{i}")))
                .await;
        }
        let a = manager.create_alert("cap_0", 2.0, None, None).await.unwrap();
        let _b = manager.create_alert("cap_1", 2.0, None, None).await.unwrap();
        let _c = manager.create_alert("cap_2", 2.0, None, None).await.unwrap();

        // Nothing resolved yet: the cap must not evict unresolved alerts.
        assert_eq!(manager.cap_active().await, 0);
        assert_eq!(manager.get_active_alerts(None).await.len(), 3);

        assert!(manager.resolve(a.alert_id, None).await);
        assert_eq!(manager.cap_active().await, 1);
        let remaining = manager.get_active_alerts(None).await;
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|al| al.alert_id != a.alert_id));
    }

    #[tokio::test]
    async fn resolved_alerts_expire_from_active_index() {
        let manager = manager();
        manager.register_rule(quick_rule("r6", "m6")).await;
        let alert = manager.create_alert("r6", 2.0, None, None).await.unwrap();
        assert!(manager.resolve(alert.alert_id, None).await);
        manager.backdate_resolution(alert.alert_id, 25).await;

        assert_eq!(manager.prune_resolved(24).await, 1);
        assert!(manager.get_active_alerts(None).await.is_empty());
        // History still remembers the alert.
        assert_eq!(manager.get_alert_history(48, None).await.len(), 1);
    }

    #[tokio::test]
    async fn notification_failure_does_not_abort_creation() {
        let failing = Arc::new(CountingChannel {
            kind: ChannelKind::Webhook,
            delivered: AtomicUsize::new(0),
            succeed: false,
        });
        let mut channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>> = HashMap::new();
        channels.insert(ChannelKind::Webhook, failing.clone());

        let manager = AlertManager::new(AlertConfig::default(), channels);
        let mut rule = quick_rule("notify_rule", "notify_metric");
        rule.notification_channels = vec![ChannelKind::Webhook, ChannelKind::Email];
        manager.register_rule(rule).await;

        let alert = manager.create_alert("notify_rule", 2.0, None, None).await;
        assert!(alert.is_some());
        assert_eq!(failing.delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn history_filters_by_severity() {
        let manager = manager();
        manager.register_rule(quick_rule("sev_a", "ma")).await;
        let mut critical_rule = quick_rule("sev_b", "mb");
        critical_rule.severity = AlertSeverity::Critical;
        manager.register_rule(critical_rule).await;

        manager.create_alert("sev_a", 2.0, None, None).await.unwrap();
        manager.create_alert("sev_b", 2.0, None, None).await.unwrap();

        let critical = manager
            .get_alert_history(1, Some(AlertSeverity::Critical))
            .await;
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].rule_id, "sev_b");
        assert_eq!(manager.get_alert_history(1, None).await.len(), 2);
    }

    #[test]
    fn rule_round_trips_through_lowercase_json() {
        let rule = AlertManager::default_rules().remove(1);
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains(r#""condition":"gt""#));
        assert!(json.contains(r#""severity":"critical""#));
        let back: AlertRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
