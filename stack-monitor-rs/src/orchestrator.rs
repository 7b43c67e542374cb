//! # Integration orchestrator
//!
//! Top-level facade over the monitoring pipeline. Owns the session
//! tracker, both scoring engines, and the alert manager; runs the
//! background loops (cleanup, flush, and per-component maintenance);
//! exposes the ingress `track_*` family and the read-only query surface.
//!
//! Shutdown sequence: signal every loop through a watch channel, flush
//! the event buffer one final time, force-complete any sessions still
//! active, then persist the alert-rule configuration. Each step is
//! error-isolated; a persistence failure cannot prevent the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerts::{Alert, AlertManager, AlertMetricsSnapshot, AlertSeverity};
use crate::catalog::CatalogLookup;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::notify::{
    AlertPayload, ChannelKind, DashboardChannel, EmailChannel, LogChannel, NotificationChannel,
    WebhookChannel,
};
use crate::performance::{PerformanceAnalyzer, PerformanceSummary};
use crate::persistence::{self, AlertConfigSnapshot};
use crate::quality::{
    GenerationResult, QualityMetricType, QualityScore, QualityScorer, QualityStatusReport,
    QualityTrend, UserFeedback,
};
use crate::session::{EventType, MonitoringEvent, Session, SessionTracker};

/// Events drained per flush-loop tick.
const FLUSH_BATCH_SIZE: usize = 256;

/// Backoff applied after a failed background-loop iteration.
const LOOP_ERROR_BACKOFF: StdDuration = StdDuration::from_secs(1);

/// Coarse component health, rolled up from alerts and quality scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub overall: HealthLevel,
    pub alerting: HealthLevel,
    pub quality: HealthLevel,
    pub checked_at: DateTime<Utc>,
}

/// Cross-component analytics snapshot for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub session_error_rate: f64,
    pub buffered_events: usize,
    pub quality: QualityStatusReport,
    pub performance: PerformanceSummary,
    pub alerts: AlertMetricsSnapshot,
    pub generated_at: DateTime<Utc>,
}

/// Session outcome counters shared with the background loops.
#[derive(Default)]
struct SessionCounters {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl SessionCounters {
    fn error_rate(&self) -> f64 {
        let completed = self.completed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let total = completed + failed;
        if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        }
    }
}

/// Drains the shared event buffer and fans events out to the scorers.
struct EventRouter {
    tracker: Arc<SessionTracker>,
    quality: Arc<QualityScorer>,
    performance: Arc<PerformanceAnalyzer>,
}

impl EventRouter {
    /// Drain one batch from the event buffer and fan it out. On a
    /// routing error the newest half of the unprocessed batch is
    /// requeued so memory stays bounded without silent total loss.
    async fn flush_once(&self) -> usize {
        let events = self.tracker.drain_buffer(FLUSH_BATCH_SIZE).await;
        if events.is_empty() {
            return 0;
        }
        let mut processed = 0;
        let mut iter = events.into_iter();
        while let Some(event) = iter.next() {
            if let Err(e) = self.route_event(&event).await {
                warn!("Event routing failed: {e}; retaining newest half of batch");
                let mut remaining: Vec<MonitoringEvent> = iter.collect();
                let keep_from = remaining.len() / 2;
                let kept = remaining.split_off(keep_from);
                self.tracker.requeue(kept).await;
                break;
            }
            processed += 1;
        }
        processed
    }

    /// Fan one buffered event out to the scoring engines.
    async fn route_event(&self, event: &MonitoringEvent) -> Result<(), MonitorError> {
        self.performance.consume_event(event).await;

        match event.event_type {
            EventType::ExtractionComplete => {
                if let Some(raw) = event.data.get("technologies") {
                    let technologies: Vec<String> =
                        serde_json::from_value(raw.clone()).map_err(|e| {
                            MonitorError::Routing(format!("malformed technologies payload: {e}"))
                        })?;
                    let requirements = event
                        .data
                        .get("requirements")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    self.quality
                        .score_extraction(&technologies, &requirements, Some(event.session_id))
                        .await;
                }
            }
            EventType::ValidationComplete => {
                if let Some(value) = event.data.get("quality_score").and_then(|v| v.as_f64()) {
                    let score = QualityScore {
                        overall_score: value.clamp(0.0, 1.0),
                        metric_type: QualityMetricType::ResponseQuality,
                        component_scores: HashMap::new(),
                        confidence: if event.success { 0.8 } else { 0.4 },
                        timestamp: event.timestamp,
                        session_id: Some(event.session_id),
                        details: HashMap::new(),
                    };
                    self.quality.record_external_score(score).await;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Facade that wires the monitoring pipeline together and owns its
/// background tasks.
pub struct IntegrationOrchestrator {
    config: MonitorConfig,
    tracker: Arc<SessionTracker>,
    quality: Arc<QualityScorer>,
    performance: Arc<PerformanceAnalyzer>,
    alerts: Arc<AlertManager>,
    dashboard: Arc<DashboardChannel>,
    router: Arc<EventRouter>,
    counters: Arc<SessionCounters>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started_at: Instant,
    running: AtomicBool,
}

impl IntegrationOrchestrator {
    /// Build the pipeline. The catalog is an optional collaborator;
    /// without it, coverage scoring falls back to its default.
    pub fn new(
        config: MonitorConfig,
        catalog: Option<Arc<dyn CatalogLookup>>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;

        let dashboard = Arc::new(DashboardChannel::new(config.notifications.dashboard_buffer));
        let timeout = StdDuration::from_secs(config.notifications.request_timeout_secs);

        let mut channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>> = HashMap::new();
        channels.insert(ChannelKind::Log, Arc::new(LogChannel));
        channels.insert(ChannelKind::Dashboard, dashboard.clone());
        if let Some(url) = &config.notifications.webhook_url {
            channels.insert(
                ChannelKind::Webhook,
                Arc::new(WebhookChannel::new(url.clone(), timeout)?),
            );
        }
        if let Some(url) = &config.notifications.email_gateway_url {
            channels.insert(
                ChannelKind::Email,
                Arc::new(EmailChannel::new(
                    url.clone(),
                    config.notifications.email_recipients.clone(),
                    timeout,
                )?),
            );
        }

        let alerts = Arc::new(AlertManager::new(config.alerts.clone(), channels));
        let tracker = Arc::new(SessionTracker::new(config.session.clone()));
        let quality = Arc::new(QualityScorer::new(
            config.quality.clone(),
            catalog,
            alerts.clone(),
        ));
        let performance = Arc::new(PerformanceAnalyzer::new(
            config.performance.clone(),
            alerts.clone(),
        ));
        let router = Arc::new(EventRouter {
            tracker: tracker.clone(),
            quality: quality.clone(),
            performance: performance.clone(),
        });
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            tracker,
            quality,
            performance,
            alerts,
            dashboard,
            router,
            counters: Arc::new(SessionCounters::default()),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            started_at: Instant::now(),
            running: AtomicBool::new(false),
        })
    }

    /// Load persisted rule configuration and start the background loops.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        match persistence::load_snapshot(&self.config.snapshot_path).await {
            Ok(Some(snapshot)) => {
                let applied = self.alerts.load_rules(snapshot.rules).await;
                info!(applied, "Restored persisted alert rules");
            }
            Ok(None) => debug!("No persisted alert configuration, using defaults"),
            Err(e) => warn!("Failed to load persisted alert configuration: {e}"),
        }

        let mut tasks = self.tasks.lock().await;

        let tracker = self.tracker.clone();
        let alerts = self.alerts.clone();
        let counters = self.counters.clone();
        tasks.push(spawn_interval_loop(
            "session_cleanup",
            StdDuration::from_secs(self.config.session.cleanup_interval_secs),
            self.shutdown.subscribe(),
            move || {
                let tracker = tracker.clone();
                let alerts = alerts.clone();
                let counters = counters.clone();
                async move {
                    let evicted = tracker.evict_expired().await;
                    if !evicted.is_empty() {
                        counters
                            .failed
                            .fetch_add(evicted.len() as u64, Ordering::SeqCst);
                        alerts
                            .evaluate_metric("session_error_rate", counters.error_rate(), None)
                            .await;
                    }
                    Ok(())
                }
            },
        ));

        let router = self.router.clone();
        tasks.push(spawn_interval_loop(
            "event_flush",
            StdDuration::from_secs(self.config.session.flush_interval_secs),
            self.shutdown.subscribe(),
            move || {
                let router = router.clone();
                async move {
                    router.flush_once().await;
                    Ok(())
                }
            },
        ));

        let alerts = self.alerts.clone();
        tasks.push(spawn_interval_loop(
            "alert_maintenance",
            StdDuration::from_secs(self.config.alerts.maintenance_interval_secs),
            self.shutdown.subscribe(),
            move || {
                let alerts = alerts.clone();
                async move {
                    alerts.run_maintenance().await;
                    Ok(())
                }
            },
        ));

        let quality = self.quality.clone();
        tasks.push(spawn_interval_loop(
            "quality_maintenance",
            StdDuration::from_secs(self.config.quality.maintenance_interval_secs),
            self.shutdown.subscribe(),
            move || {
                let quality = quality.clone();
                async move {
                    quality.run_maintenance().await;
                    Ok(())
                }
            },
        ));

        let performance = self.performance.clone();
        tasks.push(spawn_interval_loop(
            "performance_maintenance",
            StdDuration::from_secs(self.config.performance.maintenance_interval_secs),
            self.shutdown.subscribe(),
            move || {
                let performance = performance.clone();
                async move {
                    performance.run_maintenance().await;
                    Ok(())
                }
            },
        ));

        info!("Generation monitoring started");
    }

    /// Stop the pipeline: signal loops, final flush, force-complete
    /// remaining sessions, persist configuration. Best-effort at every
    /// step.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        while self.router.flush_once().await > 0 {}

        let abandoned = self.tracker.force_complete_all("shutdown").await;
        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "Force-completed sessions at shutdown");
            self.counters
                .failed
                .fetch_add(abandoned.len() as u64, Ordering::SeqCst);
        }
        while self.router.flush_once().await > 0 {}

        if let Err(e) = self.persist_rules().await {
            error!("Failed to persist alert configuration: {e:#}");
        }
        info!("Generation monitoring stopped");
    }

    // ---- ingress -------------------------------------------------------

    /// Begin monitoring one generation run.
    pub async fn start_session(
        &self,
        requirements: HashMap<String, Value>,
        metadata: HashMap<String, Value>,
    ) -> Session {
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        self.tracker.start_session(requirements, metadata).await
    }

    /// Generic step recording; unknown sessions are ignored.
    #[allow(clippy::too_many_arguments)]
    pub async fn track_step(
        &self,
        session_id: Uuid,
        event_type: EventType,
        component: &str,
        operation: &str,
        data: HashMap<String, Value>,
        duration_ms: Option<u64>,
        success: bool,
        error: Option<String>,
    ) -> bool {
        self.tracker
            .record_step(
                session_id, event_type, component, operation, data, duration_ms, success, error,
            )
            .await
    }

    pub async fn track_parsing_step(
        &self,
        session_id: Uuid,
        data: HashMap<String, Value>,
        duration_ms: u64,
        success: bool,
        error: Option<String>,
    ) -> bool {
        self.track_step(
            session_id,
            EventType::ParsingComplete,
            "parser",
            "parse_requirements",
            data,
            Some(duration_ms),
            success,
            error,
        )
        .await
    }

    /// Record a completed extraction step; the technologies and the
    /// requirements text ride along for quality scoring at flush time.
    pub async fn track_extraction_step(
        &self,
        session_id: Uuid,
        technologies: &[String],
        requirements: &str,
        duration_ms: u64,
        success: bool,
        error: Option<String>,
    ) -> bool {
        let data = HashMap::from([
            ("technologies".to_string(), json!(technologies)),
            ("requirements".to_string(), json!(requirements)),
        ]);
        self.track_step(
            session_id,
            EventType::ExtractionComplete,
            "extractor",
            "extract_technologies",
            data,
            Some(duration_ms),
            success,
            error,
        )
        .await
    }

    pub async fn track_llm_interaction(
        &self,
        session_id: Uuid,
        operation: &str,
        data: HashMap<String, Value>,
        duration_ms: u64,
        success: bool,
        error: Option<String>,
    ) -> bool {
        self.track_step(
            session_id,
            EventType::LlmCallComplete,
            "llm",
            operation,
            data,
            Some(duration_ms),
            success,
            error,
        )
        .await
    }

    pub async fn track_validation_step(
        &self,
        session_id: Uuid,
        data: HashMap<String, Value>,
        duration_ms: u64,
        success: bool,
        error: Option<String>,
    ) -> bool {
        self.track_step(
            session_id,
            EventType::ValidationComplete,
            "validator",
            "validate_stack",
            data,
            Some(duration_ms),
            success,
            error,
        )
        .await
    }

    /// Finalize a session. Consistency and satisfaction scoring plus
    /// workflow threshold checks run synchronously before returning.
    pub async fn complete_session(
        &self,
        session_id: Uuid,
        result: GenerationResult,
        metrics: HashMap<String, f64>,
        feedback: Option<UserFeedback>,
        success: bool,
        error: Option<String>,
    ) -> Option<Session> {
        let result_map = value_to_map(json!({
            "technologies": result.technologies.clone(),
            "processing_time_ms": result.processing_time_ms,
            "validation_passed": result.validation_passed,
        }));
        let session = self
            .tracker
            .complete_session(session_id, result_map, success, error)
            .await?;

        if success {
            self.counters.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
        }

        // Synchronous scoring of the finished result.
        self.quality
            .score_consistency(&result.technologies, Some(session_id))
            .await;
        self.quality
            .predict_satisfaction(&result, feedback.as_ref(), Some(session_id))
            .await;

        // Workflow-level thresholds.
        let generation_seconds = result.processing_time_ms as f64 / 1000.0;
        self.alerts
            .evaluate_metric(
                "generation_time_seconds",
                generation_seconds,
                Some(session_id),
            )
            .await;
        self.alerts
            .evaluate_metric(
                "session_error_rate",
                self.counters.error_rate(),
                Some(session_id),
            )
            .await;

        let mut context = HashMap::new();
        context.insert(
            "session_id".to_string(),
            Value::String(session_id.to_string()),
        );
        self.performance
            .track_metric(
                "workflow",
                "complete_session",
                "generation_time_ms",
                result.processing_time_ms as f64,
                context.clone(),
                None,
            )
            .await;
        for (name, value) in metrics {
            self.performance
                .track_metric(
                    "workflow",
                    "complete_session",
                    &name,
                    value,
                    context.clone(),
                    None,
                )
                .await;
        }

        Some(session)
    }

    // ---- queries -------------------------------------------------------

    pub async fn get_active_alerts(&self, severity: Option<AlertSeverity>) -> Vec<Alert> {
        self.alerts.get_active_alerts(severity).await
    }

    pub async fn get_alert_history(
        &self,
        hours: u64,
        severity: Option<AlertSeverity>,
    ) -> Vec<Alert> {
        self.alerts.get_alert_history(hours, severity).await
    }

    pub async fn get_alert_metrics(&self) -> AlertMetricsSnapshot {
        self.alerts.get_alert_metrics().await
    }

    pub async fn get_current_quality_status(&self) -> QualityStatusReport {
        self.quality.current_status().await
    }

    pub async fn get_quality_trends(&self) -> Vec<QualityTrend> {
        self.quality.all_trends().await
    }

    pub async fn get_analytics_summary(&self) -> AnalyticsSummary {
        AnalyticsSummary {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            active_sessions: self.tracker.active_count().await,
            sessions_started: self.counters.started.load(Ordering::SeqCst),
            sessions_completed: self.counters.completed.load(Ordering::SeqCst),
            sessions_failed: self.counters.failed.load(Ordering::SeqCst),
            session_error_rate: self.counters.error_rate(),
            buffered_events: self.tracker.buffered_events().await,
            quality: self.quality.current_status().await,
            performance: self.performance.summary().await,
            alerts: self.alerts.get_alert_metrics().await,
            generated_at: Utc::now(),
        }
    }

    /// Roll alert severities and quality standing into coarse health.
    pub async fn get_health_status(&self) -> HealthStatus {
        let active = self.alerts.get_active_alerts(None).await;
        let alerting = if active
            .iter()
            .any(|a| !a.status.is_terminal() && a.severity == AlertSeverity::Critical)
        {
            HealthLevel::Critical
        } else if active.iter().any(|a| {
            !a.status.is_terminal()
                && matches!(a.severity, AlertSeverity::Error | AlertSeverity::Warning)
        }) {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        };

        let status = self.quality.current_status().await;
        let quality = match status.overall {
            None => HealthLevel::Unknown,
            Some(overall) if overall < 0.5 => HealthLevel::Critical,
            Some(overall) if overall < self.config.quality.default_threshold => {
                HealthLevel::Warning
            }
            Some(_) => HealthLevel::Healthy,
        };

        let overall = [alerting, quality]
            .into_iter()
            .filter(|level| *level != HealthLevel::Unknown)
            .max()
            .unwrap_or(HealthLevel::Unknown);

        HealthStatus {
            overall,
            alerting,
            quality,
            checked_at: Utc::now(),
        }
    }

    pub async fn get_session(&self, session_id: Uuid) -> Option<Session> {
        self.tracker.get_session(session_id).await
    }

    pub async fn active_session_count(&self) -> usize {
        self.tracker.active_count().await
    }

    /// Drain and route one buffered batch immediately, outside the
    /// flush loop's schedule.
    pub async fn flush_once(&self) -> usize {
        self.router.flush_once().await
    }

    /// Live alert pushes for dashboard consumers.
    pub fn subscribe_dashboard(&self) -> broadcast::Receiver<AlertPayload> {
        self.dashboard.subscribe()
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn quality(&self) -> &Arc<QualityScorer> {
        &self.quality
    }

    pub fn performance(&self) -> &Arc<PerformanceAnalyzer> {
        &self.performance
    }

    // ---- internals -----------------------------------------------------

    async fn persist_rules(&self) -> anyhow::Result<()> {
        let snapshot = AlertConfigSnapshot {
            saved_at: Utc::now(),
            rules: self.alerts.export_rules().await,
            notifications: self.config.notifications.clone(),
        };
        persistence::save_snapshot(&self.config.snapshot_path, &snapshot)
            .await
            .context("persisting alert configuration snapshot")?;
        Ok(())
    }
}

/// Run `body` on a fixed interval until the shutdown signal fires.
/// Iteration errors are logged and followed by a short backoff; nothing
/// may crash the loop.
fn spawn_interval_loop<F, Fut>(
    name: &'static str,
    period: StdDuration,
    mut rx: watch::Receiver<bool>,
    body: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = body().await {
                        error!(loop_name = name, "Background loop iteration failed: {e:#}");
                        sleep(LOOP_ERROR_BACKOFF).await;
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        debug!(loop_name = name, "Background loop stopping");
                        break;
                    }
                }
            }
        }
    })
}

fn value_to_map(value: Value) -> HashMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}
