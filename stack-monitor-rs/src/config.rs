//! # Configuration for the monitoring core
//!
//! Typed configuration structs with explicit defaults, loaded in three
//! layers: built-in defaults, an optional JSON file (partial files merge
//! with the defaults via serde field defaults), and `STACK_MONITOR_*`
//! environment variables on top. Validation happens at construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration for the monitoring service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Where the alert-rule/notification snapshot is persisted on shutdown
    /// and reloaded from on startup.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

/// Session tracking and event buffering configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Sessions older than this are evicted as timed out.
    #[serde(default = "default_max_session_duration_secs")]
    pub max_session_duration_secs: u64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Fixed tick of the event flush loop, independent of cleanup.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Per-session event cap, oldest dropped first.
    #[serde(default = "default_max_events_per_session")]
    pub max_events_per_session: usize,

    /// Soft cap on the shared streaming buffer.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,

    #[serde(default = "default_streaming_enabled")]
    pub streaming_enabled: bool,
}

/// Quality scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityConfig {
    #[serde(default = "default_max_stored_scores")]
    pub max_stored_scores: usize,

    /// Initial alert threshold applied to every quality metric type.
    #[serde(default = "default_quality_threshold")]
    pub default_threshold: f64,

    /// Margin below threshold that counts toward multi-metric degradation.
    #[serde(default = "default_degradation_margin")]
    pub degradation_margin: f64,

    #[serde(default = "default_trend_window_hours")]
    pub trend_window_hours: u64,

    #[serde(default = "default_min_recalibration_samples")]
    pub min_recalibration_samples: usize,

    #[serde(default = "default_recalibration_window_days")]
    pub recalibration_window_days: u64,

    #[serde(default = "default_score_retention_days")]
    pub score_retention_days: u64,

    /// Cooldown for scorer-raised threshold alerts.
    #[serde(default = "default_quality_alert_cooldown_minutes")]
    pub alert_cooldown_minutes: u64,

    /// Cadence of the recalibration/retention/degradation maintenance loop.
    #[serde(default = "default_quality_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

/// Performance analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceConfig {
    #[serde(default = "default_max_stored_metrics")]
    pub max_stored_metrics: usize,

    #[serde(default = "default_max_stored_interactions")]
    pub max_stored_interactions: usize,

    /// Cap for bottleneck/pattern/insight/satisfaction histories.
    #[serde(default = "default_max_stored_records")]
    pub max_stored_records: usize,

    /// Minimum samples before a baseline participates in detection.
    #[serde(default = "default_min_baseline_samples")]
    pub min_baseline_samples: usize,

    #[serde(default = "default_baseline_window_hours")]
    pub baseline_window_hours: u64,

    /// Fractional deviation of requests/hour that flags a usage anomaly.
    #[serde(default = "default_usage_deviation_threshold")]
    pub usage_deviation_threshold: f64,

    #[serde(default = "default_prediction_confidence_threshold")]
    pub prediction_confidence_threshold: f64,

    #[serde(default = "default_prediction_horizon_days")]
    pub prediction_horizon_days: u64,

    /// Interactions/day the deployment is provisioned for, used by
    /// capacity-planning insights.
    #[serde(default = "default_capacity_per_day")]
    pub capacity_per_day: f64,

    #[serde(default = "default_performance_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

/// Alert lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertConfig {
    #[serde(default = "default_max_active_alerts")]
    pub max_active_alerts: usize,

    #[serde(default = "default_alert_retention_days")]
    pub alert_retention_days: u64,

    /// Resolved alerts older than this leave the active index.
    #[serde(default = "default_resolved_retention_hours")]
    pub resolved_retention_hours: u64,

    /// Unresolved alerts escalate once per elapsed window.
    #[serde(default = "default_escalation_window_minutes")]
    pub escalation_window_minutes: u64,

    #[serde(default = "default_alert_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

/// Notification channel endpoints and timeouts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationSettings {
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Email delivery goes through an HTTP mail gateway.
    #[serde(default)]
    pub email_gateway_url: Option<String>,

    #[serde(default)]
    pub email_recipients: Vec<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Capacity of the dashboard broadcast channel.
    #[serde(default = "default_dashboard_buffer")]
    pub dashboard_buffer: usize,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("./data/stack_monitor/alert_config.json")
}

fn default_max_session_duration_secs() -> u64 {
    1800
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_flush_interval_secs() -> u64 {
    5
}

fn default_max_events_per_session() -> usize {
    100
}

fn default_max_buffer_size() -> usize {
    1000
}

fn default_streaming_enabled() -> bool {
    true
}

fn default_max_stored_scores() -> usize {
    500
}

fn default_quality_threshold() -> f64 {
    0.7
}

fn default_degradation_margin() -> f64 {
    0.1
}

fn default_trend_window_hours() -> u64 {
    24
}

fn default_min_recalibration_samples() -> usize {
    10
}

fn default_recalibration_window_days() -> u64 {
    7
}

fn default_score_retention_days() -> u64 {
    7
}

fn default_quality_alert_cooldown_minutes() -> u64 {
    30
}

fn default_quality_maintenance_interval_secs() -> u64 {
    300
}

fn default_max_stored_metrics() -> usize {
    2000
}

fn default_max_stored_interactions() -> usize {
    1000
}

fn default_max_stored_records() -> usize {
    500
}

fn default_min_baseline_samples() -> usize {
    10
}

fn default_baseline_window_hours() -> u64 {
    24
}

fn default_usage_deviation_threshold() -> f64 {
    0.5
}

fn default_prediction_confidence_threshold() -> f64 {
    0.7
}

fn default_prediction_horizon_days() -> u64 {
    7
}

fn default_capacity_per_day() -> f64 {
    1000.0
}

fn default_performance_maintenance_interval_secs() -> u64 {
    600
}

fn default_max_active_alerts() -> usize {
    200
}

fn default_alert_retention_days() -> u64 {
    30
}

fn default_resolved_retention_hours() -> u64 {
    24
}

fn default_escalation_window_minutes() -> u64 {
    30
}

fn default_alert_maintenance_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_dashboard_buffer() -> usize {
    64
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            quality: QualityConfig::default(),
            performance: PerformanceConfig::default(),
            alerts: AlertConfig::default(),
            notifications: NotificationSettings::default(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_session_duration_secs: default_max_session_duration_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            flush_interval_secs: default_flush_interval_secs(),
            max_events_per_session: default_max_events_per_session(),
            max_buffer_size: default_max_buffer_size(),
            streaming_enabled: default_streaming_enabled(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_stored_scores: default_max_stored_scores(),
            default_threshold: default_quality_threshold(),
            degradation_margin: default_degradation_margin(),
            trend_window_hours: default_trend_window_hours(),
            min_recalibration_samples: default_min_recalibration_samples(),
            recalibration_window_days: default_recalibration_window_days(),
            score_retention_days: default_score_retention_days(),
            alert_cooldown_minutes: default_quality_alert_cooldown_minutes(),
            maintenance_interval_secs: default_quality_maintenance_interval_secs(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_stored_metrics: default_max_stored_metrics(),
            max_stored_interactions: default_max_stored_interactions(),
            max_stored_records: default_max_stored_records(),
            min_baseline_samples: default_min_baseline_samples(),
            baseline_window_hours: default_baseline_window_hours(),
            usage_deviation_threshold: default_usage_deviation_threshold(),
            prediction_confidence_threshold: default_prediction_confidence_threshold(),
            prediction_horizon_days: default_prediction_horizon_days(),
            capacity_per_day: default_capacity_per_day(),
            maintenance_interval_secs: default_performance_maintenance_interval_secs(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_active_alerts: default_max_active_alerts(),
            alert_retention_days: default_alert_retention_days(),
            resolved_retention_hours: default_resolved_retention_hours(),
            escalation_window_minutes: default_escalation_window_minutes(),
            maintenance_interval_secs: default_alert_maintenance_interval_secs(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            email_gateway_url: None,
            email_recipients: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
            dashboard_buffer: default_dashboard_buffer(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration: defaults, then an optional JSON file (partial
    /// files are merged field-by-field), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| ConfigError::ParseError(format!("{}: {}", p.display(), e)))?;
                serde_json::from_str(&raw)
                    .map_err(|e| ConfigError::ParseError(format!("{}: {}", p.display(), e)))?
            }
            Some(p) => {
                info!(
                    "Configuration file not found, using defaults: {}",
                    p.display()
                );
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults plus environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_u64("STACK_MONITOR_MAX_SESSION_SECS") {
            self.session.max_session_duration_secs = v;
        }
        if let Some(v) = env_u64("STACK_MONITOR_CLEANUP_INTERVAL_SECS") {
            self.session.cleanup_interval_secs = v;
        }
        if let Some(v) = env_u64("STACK_MONITOR_FLUSH_INTERVAL_SECS") {
            self.session.flush_interval_secs = v;
        }
        if let Some(v) = env_usize("STACK_MONITOR_MAX_EVENTS_PER_SESSION") {
            self.session.max_events_per_session = v;
        }
        if let Ok(v) = std::env::var("STACK_MONITOR_STREAMING") {
            self.session.streaming_enabled =
                matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = env_f64("STACK_MONITOR_QUALITY_THRESHOLD") {
            self.quality.default_threshold = v;
        }
        if let Ok(v) = std::env::var("STACK_MONITOR_WEBHOOK_URL") {
            if !v.is_empty() {
                self.notifications.webhook_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("STACK_MONITOR_SNAPSHOT_PATH") {
            if !v.is_empty() {
                self.snapshot_path = PathBuf::from(v);
            }
        }
    }

    /// Validate invariants that the rest of the core relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_events_per_session == 0 {
            return Err(ConfigError::ValidationError(
                "max_events_per_session must be at least 1".to_string(),
            ));
        }
        if self.session.flush_interval_secs == 0 || self.session.cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "flush and cleanup intervals must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality.default_threshold) {
            return Err(ConfigError::ValidationError(format!(
                "default quality threshold out of range: {}",
                self.quality.default_threshold
            )));
        }
        if self.quality.degradation_margin < 0.0 || self.quality.degradation_margin > 0.5 {
            return Err(ConfigError::ValidationError(format!(
                "degradation margin out of range: {}",
                self.quality.degradation_margin
            )));
        }
        if !(0.0..=1.0).contains(&self.performance.prediction_confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "prediction confidence threshold out of range".to_string(),
            ));
        }
        if self.alerts.max_active_alerts == 0 {
            return Err(ConfigError::ValidationError(
                "max_active_alerts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
