//! End-to-end flow through the monitoring pipeline: session start,
//! workflow steps, completion, queries, shutdown persistence, restart.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use stack_monitor::alerts::AlertCondition;
use stack_monitor::config::MonitorConfig;
use stack_monitor::orchestrator::IntegrationOrchestrator;
use stack_monitor::quality::GenerationResult;
use stack_monitor::{AlertRule, AlertSeverity, ChannelKind, SessionStatus, StaticCatalog};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

fn config_in(dir: &std::path::Path) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.snapshot_path = dir.join("alert_config.json");
    config.session.flush_interval_secs = 1;
    config.session.cleanup_interval_secs = 1;
    config
}

fn result_with(technologies: &[&str], processing_time_ms: u64) -> GenerationResult {
    GenerationResult {
        technologies: technologies.iter().map(|t| t.to_string()).collect(),
        requirements: "rest api with postgresql database, redis caching, docker".to_string(),
        explicit_requests: vec!["PostgreSQL".to_string()],
        processing_time_ms,
        validation_passed: Some(true),
        conflicts_resolved: None,
    }
}

#[tokio::test]
async fn full_generation_run_is_monitored() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Arc::new(
        IntegrationOrchestrator::new(
            config_in(dir.path()),
            Some(Arc::new(StaticCatalog::with_defaults())),
        )
        .unwrap(),
    );
    orchestrator.start().await;

    let session = orchestrator
        .start_session(
            HashMap::from([("project".to_string(), json!("checkout-service"))]),
            HashMap::new(),
        )
        .await;
    assert!(session.correlation_id.starts_with("tsg_"));

    orchestrator
        .track_parsing_step(session.session_id, HashMap::new(), 35, true, None)
        .await;
    orchestrator
        .track_extraction_step(
            session.session_id,
            &[
                "FastAPI".to_string(),
                "PostgreSQL".to_string(),
                "Redis".to_string(),
                "Docker".to_string(),
            ],
            "Build a REST API using FastAPI framework with PostgreSQL database, Redis for \
             caching, and Docker for containerization",
            180,
            true,
            None,
        )
        .await;
    orchestrator
        .track_llm_interaction(
            session.session_id,
            "generate_stack",
            HashMap::new(),
            2_400,
            true,
            None,
        )
        .await;
    orchestrator
        .track_validation_step(
            session.session_id,
            HashMap::from([("quality_score".to_string(), json!(0.9))]),
            60,
            true,
            None,
        )
        .await;

    let finalized = orchestrator
        .complete_session(
            session.session_id,
            result_with(&["FastAPI", "PostgreSQL", "Redis", "Docker"], 3_200),
            HashMap::from([("llm_tokens".to_string(), 1850.0)]),
            None,
            true,
            None,
        )
        .await
        .expect("session was active");
    assert_eq!(finalized.status, SessionStatus::Completed);
    assert!(finalized.events.len() >= 5);

    // Let the flush loop fan buffered events out to the scorers.
    tokio::time::sleep(std::time::Duration::from_millis(2_200)).await;

    let quality = orchestrator.get_current_quality_status().await;
    let extraction = quality.latest_scores["extraction_accuracy"];
    assert!(
        (0.8..=1.0).contains(&extraction),
        "extraction score {extraction}"
    );
    assert!(quality.latest_scores.contains_key("ecosystem_consistency"));
    assert!(quality.latest_scores.contains_key("user_satisfaction"));
    assert!(quality.latest_scores.contains_key("response_quality"));

    let summary = orchestrator.get_analytics_summary().await;
    assert_eq!(summary.sessions_started, 1);
    assert_eq!(summary.sessions_completed, 1);
    assert_eq!(summary.active_sessions, 0);
    assert!(summary.performance.tracked_metrics >= 4);

    // A fast, clean run raises none of the workflow alerts.
    assert!(orchestrator
        .get_active_alerts(Some(AlertSeverity::Critical))
        .await
        .is_empty());

    orchestrator.stop().await;
}

#[tokio::test]
async fn degraded_run_raises_alerts_and_survives_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Arc::new(
        IntegrationOrchestrator::new(config_in(dir.path()), None).unwrap(),
    );
    orchestrator.start().await;

    // Operator tightens alerting at runtime; the rule must survive the
    // restart below.
    let custom_rule = AlertRule {
        rule_id: "generation_time_strict".to_string(),
        name: "Strict generation time".to_string(),
        metric_name: "generation_time_seconds".to_string(),
        condition: AlertCondition::Gt,
        threshold_value: 20.0,
        severity: AlertSeverity::Error,
        enabled: true,
        cooldown_minutes: 5,
        notification_channels: vec![ChannelKind::Log, ChannelKind::Dashboard],
    };
    assert!(orchestrator.alerts().register_rule(custom_rule).await);

    let session = orchestrator
        .start_session(HashMap::new(), HashMap::new())
        .await;
    orchestrator
        .complete_session(
            session.session_id,
            result_with(&["AWS Lambda", "Azure Functions", "Google Cloud Storage"], 50_000),
            HashMap::new(),
            None,
            true,
            None,
        )
        .await
        .unwrap();

    let active = orchestrator.get_active_alerts(None).await;
    let rule_ids: Vec<&str> = active.iter().map(|a| a.rule_id.as_str()).collect();
    assert!(rule_ids.contains(&"performance_critical"));
    assert!(rule_ids.contains(&"generation_time_strict"));
    // The mixed-cloud stack also trips the consistency threshold.
    assert!(rule_ids.contains(&"threshold_ecosystem_consistency"));

    // Cooldown: an identical slow run right after stays quiet.
    let repeat = orchestrator
        .start_session(HashMap::new(), HashMap::new())
        .await;
    orchestrator
        .complete_session(
            repeat.session_id,
            result_with(&["FastAPI", "PostgreSQL", "Redis"], 50_000),
            HashMap::new(),
            None,
            true,
            None,
        )
        .await
        .unwrap();
    let perf_alerts = orchestrator
        .get_active_alerts(None)
        .await
        .into_iter()
        .filter(|a| a.rule_id == "performance_critical")
        .count();
    assert_eq!(perf_alerts, 1, "cooldown must suppress the repeat");

    // An abandoned session is force-completed at shutdown.
    let _abandoned = orchestrator
        .start_session(HashMap::new(), HashMap::new())
        .await;
    orchestrator.stop().await;
    assert_eq!(orchestrator.active_session_count().await, 0);

    // Restart: the persisted custom rule is back without re-registering.
    let restarted = Arc::new(
        IntegrationOrchestrator::new(config_in(dir.path()), None).unwrap(),
    );
    restarted.start().await;
    let restored = restarted
        .alerts()
        .get_rule("generation_time_strict")
        .await
        .expect("custom rule restored from snapshot");
    assert_eq!(restored.threshold_value, 20.0);
    assert_eq!(restored.severity, AlertSeverity::Error);
    restarted.stop().await;
}

#[tokio::test]
async fn acknowledged_alerts_flow_through_lifecycle() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Arc::new(
        IntegrationOrchestrator::new(config_in(dir.path()), None).unwrap(),
    );

    let session = orchestrator
        .start_session(HashMap::new(), HashMap::new())
        .await;
    orchestrator
        .complete_session(
            session.session_id,
            result_with(&["FastAPI", "PostgreSQL", "Redis"], 50_000),
            HashMap::new(),
            None,
            true,
            None,
        )
        .await
        .unwrap();

    let alert = orchestrator
        .get_active_alerts(Some(AlertSeverity::Critical))
        .await
        .into_iter()
        .next()
        .expect("critical alert for slow generation");

    assert!(orchestrator.alerts().acknowledge(alert.alert_id, "oncall").await);
    assert!(orchestrator.alerts().resolve(alert.alert_id, Some("oncall")).await);
    // Terminal: no further transitions.
    assert!(!orchestrator.alerts().acknowledge(alert.alert_id, "oncall").await);

    let metrics = orchestrator.get_alert_metrics().await;
    assert_eq!(metrics.resolved_total, 1);
    assert!(metrics.total_created >= 1);

    let history = orchestrator.get_alert_history(1, None).await;
    assert!(!history.is_empty());
}
