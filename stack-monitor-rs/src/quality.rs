//! # Quality scoring engine
//!
//! Converts generation results into normalized [0,1] quality scores:
//! - Extraction scoring (completeness / accuracy / relevance / catalog
//!   coverage, weighted 0.30/0.30/0.25/0.15)
//! - Ecosystem consistency with dominance boost and inconsistency reports
//! - Satisfaction prediction as a five-component weighted blend
//! - Split-half trend analysis over the stored score history
//! - Degradation policy, periodic threshold recalibration, retention
//!
//! Every produced score is checked against the current per-metric alert
//! threshold and appended to a capped FIFO history. Unusable inputs
//! degrade to a zero-confidence score; scoring never fails the caller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::alerts::{AlertCondition, AlertManager};
use crate::catalog::{CatalogLookup, DEFAULT_CATALOG_COVERAGE};
use crate::config::QualityConfig;

const WEIGHT_COMPLETENESS: f64 = 0.30;
const WEIGHT_ACCURACY: f64 = 0.30;
const WEIGHT_RELEVANCE: f64 = 0.25;
const WEIGHT_CATALOG: f64 = 0.15;

const SAT_WEIGHT_RELEVANCE: f64 = 0.25;
const SAT_WEIGHT_COMPLETENESS: f64 = 0.20;
const SAT_WEIGHT_PERFORMANCE: f64 = 0.15;
const SAT_WEIGHT_QUALITY: f64 = 0.20;
const SAT_WEIGHT_FEEDBACK: f64 = 0.20;

/// Share of total ecosystem matches above which the dominant ecosystem
/// earns the consistency boost.
const DOMINANCE_BOOST_SHARE: f64 = 0.6;

/// Keywords in requirements text that indicate a technology is being
/// asked for. Matched against word tokens by prefix.
static TECH_INDICATORS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "api",
        "rest",
        "graphql",
        "grpc",
        "database",
        "sql",
        "nosql",
        "cache",
        "caching",
        "queue",
        "messaging",
        "framework",
        "frontend",
        "backend",
        "server",
        "serverless",
        "cloud",
        "container",
        "docker",
        "kubernetes",
        "storage",
        "auth",
        "search",
        "monitoring",
        "logging",
        "analytics",
        "streaming",
        "microservice",
        "pipeline",
        "warehouse",
    ]
});

/// Domain-context buckets used by the relevance heuristic. A technology
/// with no bucket match defaults to relevant.
static DOMAIN_BUCKETS: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "web",
            vec![
                "fastapi", "django", "flask", "express", "react", "vue", "angular", "nginx",
                "rest", "graphql", "http", "web", "frontend", "backend", "spring", "rails",
            ],
        ),
        (
            "data",
            vec![
                "postgres", "postgresql", "mysql", "mongodb", "redis", "elasticsearch", "kafka",
                "spark", "airflow", "sql", "database", "etl", "warehouse", "snowflake", "cassandra",
            ],
        ),
        (
            "cloud",
            vec![
                "aws", "azure", "gcp", "docker", "kubernetes", "terraform", "lambda",
                "serverless", "s3", "ec2", "cloud", "fargate", "helm",
            ],
        ),
        (
            "ai",
            vec![
                "tensorflow", "pytorch", "openai", "llm", "sklearn", "scikit", "huggingface",
                "langchain", "bert", "embedding", "keras",
            ],
        ),
    ]
});

/// Vendor/platform keyword sets used by ecosystem consistency scoring.
static ECOSYSTEMS: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "aws",
            vec![
                "aws", "amazon", "lambda", "dynamodb", "s3", "ec2", "cloudwatch", "sqs", "sns",
                "fargate", "redshift", "kinesis",
            ],
        ),
        (
            "azure",
            vec![
                "azure", "cosmos", "synapse", "entra", "aks",
            ],
        ),
        (
            "gcp",
            vec![
                "gcp", "google cloud", "bigquery", "firebase", "gke", "dataflow", "spanner",
                "pubsub",
            ],
        ),
        (
            "open_source",
            vec![
                "postgresql", "postgres", "mysql", "redis", "kafka", "rabbitmq", "nginx",
                "kubernetes", "docker", "elasticsearch", "grafana", "prometheus", "linux",
            ],
        ),
    ]
});

/// Metric families a quality score can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMetricType {
    ExtractionAccuracy,
    EcosystemConsistency,
    TechnologyInclusion,
    CatalogCompleteness,
    UserSatisfaction,
    ResponseQuality,
}

impl QualityMetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityMetricType::ExtractionAccuracy => "extraction_accuracy",
            QualityMetricType::EcosystemConsistency => "ecosystem_consistency",
            QualityMetricType::TechnologyInclusion => "technology_inclusion",
            QualityMetricType::CatalogCompleteness => "catalog_completeness",
            QualityMetricType::UserSatisfaction => "user_satisfaction",
            QualityMetricType::ResponseQuality => "response_quality",
        }
    }

    pub fn all() -> [QualityMetricType; 6] {
        [
            QualityMetricType::ExtractionAccuracy,
            QualityMetricType::EcosystemConsistency,
            QualityMetricType::TechnologyInclusion,
            QualityMetricType::CatalogCompleteness,
            QualityMetricType::UserSatisfaction,
            QualityMetricType::ResponseQuality,
        ]
    }
}

/// One immutable quality assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    pub overall_score: f64,
    pub metric_type: QualityMetricType,
    pub component_scores: HashMap<String, f64>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<Uuid>,
    pub details: HashMap<String, Value>,
}

impl QualityScore {
    /// Minimal valid result used when inputs are unusable. Scoring
    /// degrades to this instead of propagating an error.
    pub fn degraded(
        metric_type: QualityMetricType,
        session_id: Option<Uuid>,
        reason: &str,
    ) -> Self {
        Self {
            overall_score: 0.0,
            metric_type,
            component_scores: HashMap::new(),
            confidence: 0.0,
            timestamp: Utc::now(),
            session_id,
            details: HashMap::from([(
                "degraded_reason".to_string(),
                Value::String(reason.to_string()),
            )]),
        }
    }
}

/// How strongly one foreign-ecosystem technology breaks consistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InconsistencySeverity {
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcosystemInconsistency {
    pub technology: String,
    pub matched_ecosystems: Vec<String>,
    pub severity: InconsistencySeverity,
}

/// Result of ecosystem consistency scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyScore {
    pub consistency_score: f64,
    pub dominant_ecosystem: Option<String>,
    pub ecosystem_counts: HashMap<String, usize>,
    pub inconsistencies: Vec<EcosystemInconsistency>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

/// Split-half trend over a metric's recent score history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityTrend {
    pub metric_type: QualityMetricType,
    pub direction: TrendDirection,
    pub change_rate: f64,
    pub strength: f64,
    pub sample_count: usize,
    pub window_hours: u64,
    pub first_half_mean: f64,
    pub second_half_mean: f64,
}

/// Finalized generation output handed to satisfaction prediction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    pub technologies: Vec<String>,
    pub requirements: String,
    /// Technologies the user explicitly asked for.
    pub explicit_requests: Vec<String>,
    pub processing_time_ms: u64,
    pub validation_passed: Option<bool>,
    pub conflicts_resolved: Option<u32>,
}

/// Optional end-user feedback, rated 1-5 per dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserFeedback {
    pub ratings: HashMap<String, f64>,
    pub comments: Option<String>,
}

/// Snapshot of current quality standing for the query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityStatusReport {
    pub overall: Option<f64>,
    pub latest_scores: HashMap<String, f64>,
    pub thresholds: HashMap<String, f64>,
    pub stored_scores: usize,
    pub generated_at: DateTime<Utc>,
}

struct QualityState {
    scores: Vec<QualityScore>,
    thresholds: HashMap<QualityMetricType, f64>,
}

/// Scoring engine over extraction results, stacks, and finished sessions.
pub struct QualityScorer {
    config: QualityConfig,
    catalog: Option<Arc<dyn CatalogLookup>>,
    alerts: Arc<AlertManager>,
    state: Mutex<QualityState>,
}

impl QualityScorer {
    pub fn new(
        config: QualityConfig,
        catalog: Option<Arc<dyn CatalogLookup>>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        let thresholds = QualityMetricType::all()
            .into_iter()
            .map(|mt| (mt, config.default_threshold))
            .collect();
        Self {
            config,
            catalog,
            alerts,
            state: Mutex::new(QualityState {
                scores: Vec::new(),
                thresholds,
            }),
        }
    }

    /// Score an extracted technology list against the requirements text.
    pub async fn score_extraction(
        &self,
        extracted: &[String],
        requirements: &str,
        session_id: Option<Uuid>,
    ) -> QualityScore {
        if extracted.is_empty() || requirements.trim().is_empty() {
            let score = QualityScore::degraded(
                QualityMetricType::ExtractionAccuracy,
                session_id,
                "empty extraction or requirements",
            );
            self.record_score(score.clone()).await;
            return score;
        }

        let req_lower = requirements.to_lowercase();
        let tokens = tokenize(&req_lower);

        let indicator_count = TECH_INDICATORS
            .iter()
            .filter(|kw| keyword_present(kw, &req_lower, &tokens))
            .count();
        let completeness = if indicator_count == 0 {
            // Nothing in the text asked for technology; any extraction
            // covers it.
            1.0
        } else {
            (extracted.len() as f64 / indicator_count as f64).clamp(0.0, 1.0)
        };

        let accurate = extracted
            .iter()
            .filter(|tech| req_lower.contains(&normalize(tech)))
            .count();
        let accuracy = accurate as f64 / extracted.len() as f64;

        let active_domains: Vec<&str> = DOMAIN_BUCKETS
            .iter()
            .filter(|(_, keywords)| {
                keywords
                    .iter()
                    .any(|kw| keyword_present(kw, &req_lower, &tokens))
            })
            .map(|(domain, _)| *domain)
            .collect();
        let relevant = extracted
            .iter()
            .filter(|tech| {
                let buckets = buckets_for(tech);
                // Unbucketed technologies default to relevant.
                buckets.is_empty() || buckets.iter().any(|b| active_domains.contains(b))
            })
            .count();
        let relevance = relevant as f64 / extracted.len() as f64;

        let (catalog_coverage, catalog_misses) = self.catalog_coverage(extracted);

        let components = HashMap::from([
            ("completeness".to_string(), completeness),
            ("accuracy".to_string(), accuracy),
            ("relevance".to_string(), relevance),
            ("catalog_coverage".to_string(), catalog_coverage),
        ]);
        let overall = WEIGHT_COMPLETENESS * completeness
            + WEIGHT_ACCURACY * accuracy
            + WEIGHT_RELEVANCE * relevance
            + WEIGHT_CATALOG * catalog_coverage;

        let confidence = extraction_confidence(requirements, extracted.len(), &components);

        let score = QualityScore {
            overall_score: overall.clamp(0.0, 1.0),
            metric_type: QualityMetricType::ExtractionAccuracy,
            component_scores: components,
            confidence,
            timestamp: Utc::now(),
            session_id,
            details: HashMap::from([
                ("extracted_count".to_string(), json!(extracted.len())),
                ("indicator_count".to_string(), json!(indicator_count)),
                ("catalog_misses".to_string(), json!(catalog_misses)),
            ]),
        };
        self.record_score(score.clone()).await;

        // Catalog coverage doubles as its own tracked metric.
        let catalog_score = QualityScore {
            overall_score: catalog_coverage,
            metric_type: QualityMetricType::CatalogCompleteness,
            component_scores: HashMap::new(),
            confidence,
            timestamp: Utc::now(),
            session_id,
            details: HashMap::from([("catalog_misses".to_string(), json!(catalog_misses))]),
        };
        self.record_score(catalog_score).await;

        score
    }

    /// Score how consistently a stack sticks to one ecosystem.
    pub async fn score_consistency(
        &self,
        stack: &[String],
        session_id: Option<Uuid>,
    ) -> ConsistencyScore {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut matches: Vec<(String, Vec<String>)> = Vec::new();

        for tech in stack {
            let name = normalize(tech);
            let matched: Vec<String> = ECOSYSTEMS
                .iter()
                .filter(|(_, keywords)| keywords.iter().any(|kw| name.contains(kw)))
                .map(|(eco, _)| eco.to_string())
                .collect();
            for eco in &matched {
                *counts.entry(eco.clone()).or_insert(0) += 1;
            }
            matches.push((tech.clone(), matched));
        }

        let total_matches: usize = counts.values().sum();
        let dominant_entry = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(eco, count)| (eco.clone(), *count));

        let result = if total_matches == 0 || dominant_entry.is_none() {
            // No ecosystem evidence at all: nothing to be inconsistent with.
            ConsistencyScore {
                consistency_score: 1.0,
                dominant_ecosystem: None,
                ecosystem_counts: counts,
                inconsistencies: Vec::new(),
            }
        } else {
            let (dominant, dominant_count) = dominant_entry.unwrap_or_default();
            let share = dominant_count as f64 / total_matches as f64;
            let consistency_score = if share >= DOMINANCE_BOOST_SHARE {
                (share * 1.2).min(1.0)
            } else {
                share
            };

            let inconsistencies: Vec<EcosystemInconsistency> = matches
                .iter()
                .filter(|(_, ecos)| !ecos.is_empty() && !ecos.contains(&dominant))
                .map(|(tech, ecos)| EcosystemInconsistency {
                    technology: tech.clone(),
                    matched_ecosystems: ecos.clone(),
                    severity: if ecos.len() >= 2 {
                        InconsistencySeverity::High
                    } else {
                        InconsistencySeverity::Medium
                    },
                })
                .collect();

            ConsistencyScore {
                consistency_score,
                dominant_ecosystem: Some(dominant),
                ecosystem_counts: counts,
                inconsistencies,
            }
        };

        let matched_fraction = if stack.is_empty() {
            0.0
        } else {
            matches.iter().filter(|(_, e)| !e.is_empty()).count() as f64 / stack.len() as f64
        };
        let score = QualityScore {
            overall_score: result.consistency_score,
            metric_type: QualityMetricType::EcosystemConsistency,
            component_scores: HashMap::from([(
                "matched_fraction".to_string(),
                matched_fraction,
            )]),
            confidence: if stack.is_empty() { 0.0 } else { (0.4 + 0.6 * matched_fraction).min(1.0) },
            timestamp: Utc::now(),
            session_id,
            details: HashMap::from([
                (
                    "dominant_ecosystem".to_string(),
                    json!(result.dominant_ecosystem.clone()),
                ),
                (
                    "inconsistency_count".to_string(),
                    json!(result.inconsistencies.len()),
                ),
            ]),
        };
        self.record_score(score).await;

        result
    }

    /// Predict end-user satisfaction with a finished generation.
    pub async fn predict_satisfaction(
        &self,
        result: &GenerationResult,
        feedback: Option<&UserFeedback>,
        session_id: Option<Uuid>,
    ) -> f64 {
        let relevance = self.relevance_satisfaction(result);
        let completeness = self.completeness_satisfaction(result);
        let performance = performance_satisfaction(result.processing_time_ms);
        let quality = quality_satisfaction(result);
        let feedback_score = feedback_satisfaction(feedback);

        let overall = (SAT_WEIGHT_RELEVANCE * relevance
            + SAT_WEIGHT_COMPLETENESS * completeness
            + SAT_WEIGHT_PERFORMANCE * performance
            + SAT_WEIGHT_QUALITY * quality
            + SAT_WEIGHT_FEEDBACK * feedback_score)
            .clamp(0.0, 1.0);

        let components = HashMap::from([
            ("relevance".to_string(), relevance),
            ("completeness".to_string(), completeness),
            ("performance".to_string(), performance),
            ("quality".to_string(), quality),
            ("feedback".to_string(), feedback_score),
        ]);
        let score = QualityScore {
            overall_score: overall,
            metric_type: QualityMetricType::UserSatisfaction,
            component_scores: components,
            confidence: if feedback.is_some() { 0.9 } else { 0.6 },
            timestamp: Utc::now(),
            session_id,
            details: HashMap::from([(
                "processing_time_ms".to_string(),
                json!(result.processing_time_ms),
            )]),
        };
        self.record_score(score).await;

        // Explicit-request inclusion is tracked as its own metric when
        // the user actually named technologies.
        if !result.explicit_requests.is_empty() {
            let inclusion = inclusion_rate(&result.explicit_requests, &result.technologies);
            let inclusion_score = QualityScore {
                overall_score: inclusion,
                metric_type: QualityMetricType::TechnologyInclusion,
                component_scores: HashMap::new(),
                confidence: 0.8,
                timestamp: Utc::now(),
                session_id,
                details: HashMap::from([(
                    "requested_count".to_string(),
                    json!(result.explicit_requests.len()),
                )]),
            };
            self.record_score(inclusion_score).await;
        }

        overall
    }

    /// Record a score produced outside the built-in scorers, e.g. a
    /// validation-stage quality signal routed from the event stream.
    pub async fn record_external_score(&self, score: QualityScore) {
        self.record_score(score).await;
    }

    /// Split-half trend for one metric. `None` below 5 data points.
    pub async fn analyze_trend(
        &self,
        metric_type: QualityMetricType,
        window_hours: u64,
    ) -> Option<QualityTrend> {
        let cutoff = Utc::now() - Duration::hours(window_hours as i64);
        let values: Vec<f64> = {
            let state = self.state.lock().await;
            state
                .scores
                .iter()
                .filter(|s| s.metric_type == metric_type && s.timestamp >= cutoff)
                .map(|s| s.overall_score)
                .collect()
        };

        if values.len() < 5 {
            return None;
        }
        let mid = values.len() / 2;
        let first_half_mean = mean(&values[..mid]);
        let second_half_mean = mean(&values[mid..]);
        let change_rate = second_half_mean - first_half_mean;

        let direction = if change_rate.abs() < 0.05 {
            TrendDirection::Stable
        } else if change_rate > 0.0 {
            TrendDirection::Improving
        } else {
            TrendDirection::Declining
        };

        Some(QualityTrend {
            metric_type,
            direction,
            change_rate,
            strength: (change_rate.abs() / 0.3).min(1.0),
            sample_count: values.len(),
            window_hours,
            first_half_mean,
            second_half_mean,
        })
    }

    pub async fn all_trends(&self) -> Vec<QualityTrend> {
        let mut trends = Vec::new();
        for metric_type in QualityMetricType::all() {
            if let Some(trend) = self
                .analyze_trend(metric_type, self.config.trend_window_hours)
                .await
            {
                trends.push(trend);
            }
        }
        trends
    }

    /// Degradation policy: strong declining trends raise a dedicated
    /// alert; two or more simultaneously degraded metrics raise one
    /// combined alert at error severity.
    pub async fn check_degradation(&self) {
        for metric_type in QualityMetricType::all() {
            let Some(trend) = self
                .analyze_trend(metric_type, self.config.trend_window_hours)
                .await
            else {
                continue;
            };
            if trend.direction == TrendDirection::Declining && trend.strength > 0.7 {
                let deviation = if trend.first_half_mean > 0.0 {
                    trend.change_rate.abs() / trend.first_half_mean
                } else {
                    trend.strength
                };
                self.alerts
                    .raise_threshold_alert(
                        &format!("{}_trend", metric_type.as_str()),
                        trend.second_half_mean,
                        trend.first_half_mean,
                        deviation,
                        AlertCondition::Lt,
                        self.config.alert_cooldown_minutes,
                        None,
                        Some(HashMap::from([
                            ("change_rate".to_string(), json!(trend.change_rate)),
                            ("strength".to_string(), json!(trend.strength)),
                        ])),
                    )
                    .await;
            }
        }

        let degraded = self.degraded_metrics().await;
        if degraded.len() >= 2 {
            let details = HashMap::from([(
                "degraded_metrics".to_string(),
                json!(degraded.iter().map(|m| m.as_str()).collect::<Vec<_>>()),
            )]);
            self.alerts
                .create_alert(
                    "multi_metric_degradation",
                    degraded.len() as f64,
                    None,
                    Some(details),
                )
                .await;
        }
    }

    /// Metric types whose latest score in the last hour sits below
    /// (threshold - degradation margin).
    async fn degraded_metrics(&self) -> Vec<QualityMetricType> {
        let cutoff = Utc::now() - Duration::hours(1);
        let state = self.state.lock().await;
        QualityMetricType::all()
            .into_iter()
            .filter(|mt| {
                let latest = state
                    .scores
                    .iter()
                    .rev()
                    .find(|s| s.metric_type == *mt && s.timestamp >= cutoff);
                match latest {
                    Some(score) => {
                        let threshold = state
                            .thresholds
                            .get(mt)
                            .copied()
                            .unwrap_or(self.config.default_threshold);
                        score.overall_score < threshold - self.config.degradation_margin
                    }
                    None => false,
                }
            })
            .collect()
    }

    /// Adopt `mean - 2*stddev` as the new per-metric threshold when it
    /// moves more than 5%, never below the 0.5 floor. Returns how many
    /// thresholds changed.
    pub async fn recalibrate_thresholds(&self) -> usize {
        let cutoff = Utc::now() - Duration::days(self.config.recalibration_window_days as i64);
        let mut state = self.state.lock().await;
        let mut adjusted = 0;

        for metric_type in QualityMetricType::all() {
            let values: Vec<f64> = state
                .scores
                .iter()
                .filter(|s| s.metric_type == metric_type && s.timestamp >= cutoff)
                .map(|s| s.overall_score)
                .collect();
            if values.len() < self.config.min_recalibration_samples {
                continue;
            }
            let sample_mean = mean(&values);
            let sample_std = stddev(&values, sample_mean);
            let candidate = (sample_mean - 2.0 * sample_std).max(0.5);

            let current = state
                .thresholds
                .get(&metric_type)
                .copied()
                .unwrap_or(self.config.default_threshold);
            if current > 0.0 && ((candidate - current) / current).abs() > 0.05 {
                info!(
                    metric = metric_type.as_str(),
                    old = current,
                    new = candidate,
                    "Quality threshold recalibrated"
                );
                state.thresholds.insert(metric_type, candidate);
                adjusted += 1;
            }
        }
        adjusted
    }

    /// Drop scores older than the retention window.
    pub async fn prune_scores(&self) -> usize {
        let cutoff = Utc::now() - Duration::days(self.config.score_retention_days as i64);
        let mut state = self.state.lock().await;
        let before = state.scores.len();
        state.scores.retain(|s| s.timestamp >= cutoff);
        before - state.scores.len()
    }

    /// One pass of recalibration, degradation checks, and retention.
    pub async fn run_maintenance(&self) {
        let adjusted = self.recalibrate_thresholds().await;
        self.check_degradation().await;
        let pruned = self.prune_scores().await;
        if adjusted + pruned > 0 {
            debug!(adjusted, pruned, "Quality maintenance pass complete");
        }
    }

    pub async fn current_status(&self) -> QualityStatusReport {
        let state = self.state.lock().await;
        let mut latest_scores = HashMap::new();
        for metric_type in QualityMetricType::all() {
            if let Some(score) = state
                .scores
                .iter()
                .rev()
                .find(|s| s.metric_type == metric_type)
            {
                latest_scores.insert(metric_type.as_str().to_string(), score.overall_score);
            }
        }
        let overall = if latest_scores.is_empty() {
            None
        } else {
            Some(latest_scores.values().sum::<f64>() / latest_scores.len() as f64)
        };
        QualityStatusReport {
            overall,
            latest_scores,
            thresholds: state
                .thresholds
                .iter()
                .map(|(mt, v)| (mt.as_str().to_string(), *v))
                .collect(),
            stored_scores: state.scores.len(),
            generated_at: Utc::now(),
        }
    }

    pub async fn stored_score_count(&self) -> usize {
        self.state.lock().await.scores.len()
    }

    pub async fn threshold_for(&self, metric_type: QualityMetricType) -> f64 {
        self.state
            .lock()
            .await
            .thresholds
            .get(&metric_type)
            .copied()
            .unwrap_or(self.config.default_threshold)
    }

    /// Store a score and evaluate it against the metric's alert threshold.
    async fn record_score(&self, score: QualityScore) {
        let threshold = {
            let mut state = self.state.lock().await;
            state.scores.push(score.clone());
            let max = self.config.max_stored_scores;
            if state.scores.len() > max {
                let drop = state.scores.len() - max;
                state.scores.drain(..drop);
            }
            state
                .thresholds
                .get(&score.metric_type)
                .copied()
                .unwrap_or(self.config.default_threshold)
        };

        if score.overall_score < threshold && threshold > 0.0 {
            let deviation = (threshold - score.overall_score) / threshold;
            self.alerts
                .raise_threshold_alert(
                    score.metric_type.as_str(),
                    score.overall_score,
                    threshold,
                    deviation,
                    AlertCondition::Lt,
                    self.config.alert_cooldown_minutes,
                    score.session_id,
                    Some(HashMap::from([(
                        "confidence".to_string(),
                        json!(score.confidence),
                    )])),
                )
                .await;
        }
    }

    fn catalog_coverage(&self, technologies: &[String]) -> (f64, usize) {
        match &self.catalog {
            Some(catalog) => {
                if technologies.is_empty() {
                    return (DEFAULT_CATALOG_COVERAGE, 0);
                }
                let found = technologies
                    .iter()
                    .filter(|t| catalog.lookup(t).is_some())
                    .count();
                (
                    found as f64 / technologies.len() as f64,
                    technologies.len() - found,
                )
            }
            None => (DEFAULT_CATALOG_COVERAGE, 0),
        }
    }

    fn relevance_satisfaction(&self, result: &GenerationResult) -> f64 {
        let base = if result.explicit_requests.is_empty() {
            0.8
        } else {
            inclusion_rate(&result.explicit_requests, &result.technologies)
        };
        let size = result.technologies.len();
        let penalty = if size < 3 {
            0.2
        } else if size > 15 {
            0.15
        } else {
            0.0
        };
        (base - penalty).clamp(0.0, 1.0)
    }

    fn completeness_satisfaction(&self, result: &GenerationResult) -> f64 {
        let (coverage, misses) = self.catalog_coverage(&result.technologies);
        let penalty = (0.05 * misses as f64).min(0.3);
        (coverage - penalty).clamp(0.0, 1.0)
    }
}

/// Step function over end-to-end processing time.
fn performance_satisfaction(processing_time_ms: u64) -> f64 {
    match processing_time_ms {
        0..=5_000 => 1.0,
        5_001..=15_000 => 0.9,
        15_001..=30_000 => 0.7,
        30_001..=60_000 => 0.5,
        _ => 0.3,
    }
}

fn quality_satisfaction(result: &GenerationResult) -> f64 {
    let base = match result.validation_passed {
        Some(true) => 0.9,
        Some(false) => 0.5,
        None => 0.8,
    };
    let conflict_penalty = result
        .conflicts_resolved
        .map(|n| (0.02 * n as f64).min(0.2))
        .unwrap_or(0.0);
    (base - conflict_penalty).clamp(0.0, 1.0)
}

fn feedback_satisfaction(feedback: Option<&UserFeedback>) -> f64 {
    match feedback {
        Some(fb) if !fb.ratings.is_empty() => {
            let avg = fb.ratings.values().sum::<f64>() / fb.ratings.len() as f64;
            (avg / 5.0).clamp(0.0, 1.0)
        }
        _ => 0.75,
    }
}

fn inclusion_rate(requested: &[String], technologies: &[String]) -> f64 {
    if requested.is_empty() {
        return 1.0;
    }
    let stack: Vec<String> = technologies.iter().map(|t| normalize(t)).collect();
    let included = requested
        .iter()
        .filter(|req| {
            let needle = normalize(req);
            stack.iter().any(|t| t.contains(&needle) || needle.contains(t.as_str()))
        })
        .count();
    included as f64 / requested.len() as f64
}

fn extraction_confidence(
    requirements: &str,
    extracted_count: usize,
    components: &HashMap<String, f64>,
) -> f64 {
    let length_factor = (requirements.len() as f64 / 200.0).clamp(0.0, 1.0);
    let count_factor = if (3..=15).contains(&extracted_count) {
        1.0
    } else {
        0.6
    };
    let values: Vec<f64> = components.values().copied().collect();
    let component_mean = mean(&values);
    let variance = {
        let m = component_mean;
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
    };
    let stability = (1.0 - variance.min(1.0)).max(0.0);

    (0.25 * length_factor + 0.25 * count_factor + 0.3 * component_mean + 0.2 * stability)
        .clamp(0.0, 1.0)
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

fn tokenize(text: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Single-word keywords match requirement tokens by prefix; multi-word
/// keywords match the raw text.
fn keyword_present(keyword: &str, text: &str, tokens: &[String]) -> bool {
    if keyword.contains(' ') {
        text.contains(keyword)
    } else {
        tokens.iter().any(|t| t.starts_with(keyword))
    }
}

fn buckets_for(technology: &str) -> Vec<&'static str> {
    let name = normalize(technology);
    DOMAIN_BUCKETS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| name.contains(kw)))
        .map(|(domain, _)| *domain)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
impl QualityScorer {
    /// Inject a historical score directly, bypassing threshold checks.
    pub(crate) async fn push_score_at(
        &self,
        metric_type: QualityMetricType,
        value: f64,
        timestamp: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        state.scores.push(QualityScore {
            overall_score: value,
            metric_type,
            component_scores: HashMap::new(),
            confidence: 1.0,
            timestamp,
            session_id: None,
            details: HashMap::new(),
        });
        state.scores.sort_by_key(|s| s.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertSeverity, AlertStatus};
    use crate::catalog::{MockCatalogLookup, CatalogEntry, StaticCatalog};
    use crate::config::AlertConfig;

    fn scorer() -> QualityScorer {
        scorer_with_catalog(None)
    }

    fn scorer_with_catalog(catalog: Option<Arc<dyn CatalogLookup>>) -> QualityScorer {
        let alerts = Arc::new(AlertManager::new(AlertConfig::default(), HashMap::new()));
        QualityScorer::new(QualityConfig::default(), catalog, alerts)
    }

    fn scorer_with_alerts() -> (QualityScorer, Arc<AlertManager>) {
        let alerts = Arc::new(AlertManager::new(AlertConfig::default(), HashMap::new()));
        (
            QualityScorer::new(QualityConfig::default(), None, alerts.clone()),
            alerts,
        )
    }

    #[tokio::test]
    async fn well_matched_extraction_scores_high() {
        let scorer = scorer();
        let extracted = vec![
            "FastAPI".to_string(),
            "PostgreSQL".to_string(),
            "Redis".to_string(),
            "Docker".to_string(),
        ];
        let requirements = "Build a REST API using FastAPI framework with PostgreSQL database, \
                            Redis for caching, and Docker for containerization";

        let score = scorer.score_extraction(&extracted, requirements, None).await;
        assert!(
            (0.8..=1.0).contains(&score.overall_score),
            "expected overall in [0.8, 1.0], got {}",
            score.overall_score
        );
        assert_eq!(score.component_scores["accuracy"], 1.0);
        assert!(score.confidence > 0.5);
    }

    #[tokio::test]
    async fn empty_extraction_degrades_to_zero_confidence() {
        let scorer = scorer();
        let score = scorer.score_extraction(&[], "build an api", None).await;
        assert_eq!(score.overall_score, 0.0);
        assert_eq!(score.confidence, 0.0);
        assert!(score.details.contains_key("degraded_reason"));
    }

    #[tokio::test]
    async fn catalog_misses_lower_coverage() {
        let mut mock = MockCatalogLookup::new();
        mock.expect_lookup().returning(|name| {
            if name.eq_ignore_ascii_case("redis") {
                Some(CatalogEntry {
                    name: "redis".to_string(),
                    category: "cache".to_string(),
                    ecosystem: None,
                })
            } else {
                None
            }
        });
        let scorer = scorer_with_catalog(Some(Arc::new(mock)));

        let extracted = vec!["Redis".to_string(), "MadeUpDb".to_string()];
        let score = scorer
            .score_extraction(&extracted, "redis caching with a database", None)
            .await;
        assert_eq!(score.component_scores["catalog_coverage"], 0.5);
    }

    #[tokio::test]
    async fn missing_catalog_defaults_coverage() {
        let scorer = scorer();
        let extracted = vec!["Redis".to_string()];
        let score = scorer
            .score_extraction(&extracted, "redis caching layer", None)
            .await;
        assert_eq!(
            score.component_scores["catalog_coverage"],
            DEFAULT_CATALOG_COVERAGE
        );
    }

    #[tokio::test]
    async fn mixed_cloud_stack_is_inconsistent() {
        let scorer = scorer();
        let stack = vec![
            "AWS Lambda".to_string(),
            "Azure Functions".to_string(),
            "Google Cloud Storage".to_string(),
            "IBM Watson".to_string(),
        ];
        let result = scorer.score_consistency(&stack, None).await;
        assert!(
            result.consistency_score < 0.7,
            "got {}",
            result.consistency_score
        );
        assert!(!result.inconsistencies.is_empty());
    }

    #[tokio::test]
    async fn single_ecosystem_stack_earns_boost() {
        let scorer = scorer();
        let stack = vec![
            "AWS Lambda".to_string(),
            "Amazon S3".to_string(),
            "DynamoDB".to_string(),
            "CloudWatch".to_string(),
        ];
        let result = scorer.score_consistency(&stack, None).await;
        assert_eq!(result.dominant_ecosystem.as_deref(), Some("aws"));
        assert!(result.consistency_score > 0.9);
        assert!(result.inconsistencies.is_empty());
    }

    #[tokio::test]
    async fn unmatched_stack_has_nothing_to_be_inconsistent_with() {
        let scorer = scorer();
        let stack = vec!["HomegrownTool".to_string()];
        let result = scorer.score_consistency(&stack, None).await;
        assert_eq!(result.consistency_score, 1.0);
        assert!(result.dominant_ecosystem.is_none());
    }

    #[tokio::test]
    async fn satisfaction_rewards_fast_complete_results() {
        let scorer = scorer();
        let fast = GenerationResult {
            technologies: vec![
                "FastAPI".to_string(),
                "PostgreSQL".to_string(),
                "Redis".to_string(),
            ],
            requirements: "api with postgres and redis".to_string(),
            explicit_requests: vec!["PostgreSQL".to_string(), "Redis".to_string()],
            processing_time_ms: 3_000,
            validation_passed: Some(true),
            conflicts_resolved: None,
        };
        let slow = GenerationResult {
            processing_time_ms: 70_000,
            ..fast.clone()
        };

        let fast_score = scorer.predict_satisfaction(&fast, None, None).await;
        let slow_score = scorer.predict_satisfaction(&slow, None, None).await;
        assert!(fast_score > slow_score);
        assert!(fast_score > 0.8, "got {fast_score}");
    }

    #[tokio::test]
    async fn feedback_shifts_satisfaction() {
        let scorer = scorer();
        let result = GenerationResult {
            technologies: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            processing_time_ms: 2_000,
            ..GenerationResult::default()
        };
        let poor = UserFeedback {
            ratings: HashMap::from([("overall".to_string(), 1.0)]),
            comments: None,
        };
        let great = UserFeedback {
            ratings: HashMap::from([("overall".to_string(), 5.0)]),
            comments: None,
        };

        let low = scorer.predict_satisfaction(&result, Some(&poor), None).await;
        let high = scorer
            .predict_satisfaction(&result, Some(&great), None)
            .await;
        assert!(high > low);
    }

    #[tokio::test]
    async fn tiny_stack_is_penalized() {
        let scorer = scorer();
        let tiny = GenerationResult {
            technologies: vec!["OnlyOne".to_string()],
            processing_time_ms: 1_000,
            ..GenerationResult::default()
        };
        let sized = GenerationResult {
            technologies: vec!["A".to_string(), "B".to_string(), "C".to_string(), "D".to_string()],
            processing_time_ms: 1_000,
            ..GenerationResult::default()
        };
        let tiny_score = scorer.predict_satisfaction(&tiny, None, None).await;
        let sized_score = scorer.predict_satisfaction(&sized, None, None).await;
        assert!(sized_score > tiny_score);
    }

    #[test]
    fn performance_step_function_bands() {
        assert_eq!(performance_satisfaction(4_000), 1.0);
        assert_eq!(performance_satisfaction(10_000), 0.9);
        assert_eq!(performance_satisfaction(20_000), 0.7);
        assert_eq!(performance_satisfaction(45_000), 0.5);
        assert_eq!(performance_satisfaction(90_000), 0.3);
    }

    #[tokio::test]
    async fn trend_requires_five_points() {
        let scorer = scorer();
        for i in 0..4 {
            scorer
                .push_score_at(
                    QualityMetricType::ExtractionAccuracy,
                    0.9,
                    Utc::now() - Duration::minutes(10 - i),
                )
                .await;
        }
        assert!(scorer
            .analyze_trend(QualityMetricType::ExtractionAccuracy, 24)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn declining_series_yields_declining_trend() {
        let scorer = scorer();
        let now = Utc::now();
        for i in 0..10u32 {
            scorer
                .push_score_at(
                    QualityMetricType::ExtractionAccuracy,
                    0.95 - 0.05 * i as f64,
                    now - Duration::minutes((60 - i * 5) as i64),
                )
                .await;
        }
        let trend = scorer
            .analyze_trend(QualityMetricType::ExtractionAccuracy, 24)
            .await
            .unwrap();
        assert_eq!(trend.direction, TrendDirection::Declining);
        assert!(trend.change_rate < 0.0);
        assert!(trend.strength > 0.5);
    }

    #[tokio::test]
    async fn stable_series_yields_stable_trend() {
        let scorer = scorer();
        let now = Utc::now();
        for i in 0..8u32 {
            scorer
                .push_score_at(
                    QualityMetricType::UserSatisfaction,
                    0.85,
                    now - Duration::minutes((40 - i * 5) as i64),
                )
                .await;
        }
        let trend = scorer
            .analyze_trend(QualityMetricType::UserSatisfaction, 24)
            .await
            .unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[tokio::test]
    async fn low_scores_raise_threshold_alert() {
        let (scorer, alerts) = scorer_with_alerts();
        // Accuracy collapses for extractions unrelated to the text.
        scorer
            .score_extraction(
                &["Fortran".to_string(), "COBOL".to_string()],
                "build a modern web api with a database, caching, and monitoring",
                None,
            )
            .await;
        let active = alerts.get_active_alerts(None).await;
        assert!(
            active
                .iter()
                .any(|a| a.rule_id == "threshold_extraction_accuracy"),
            "expected a threshold alert for extraction accuracy"
        );
    }

    #[tokio::test]
    async fn multi_metric_degradation_raises_combined_alert() {
        let (scorer, alerts) = scorer_with_alerts();
        let now = Utc::now();
        // Two distinct metric types sitting below threshold - margin.
        scorer
            .push_score_at(QualityMetricType::ExtractionAccuracy, 0.3, now)
            .await;
        scorer
            .push_score_at(QualityMetricType::UserSatisfaction, 0.3, now)
            .await;

        scorer.check_degradation().await;

        let active = alerts.get_active_alerts(Some(AlertSeverity::Error)).await;
        let combined = active
            .iter()
            .find(|a| a.rule_id == "multi_metric_degradation")
            .expect("combined degradation alert");
        assert_eq!(combined.status, AlertStatus::Active);
        assert_eq!(combined.metric_value, 2.0);
    }

    #[tokio::test]
    async fn recalibration_moves_threshold_with_floor() {
        let scorer = scorer();
        let now = Utc::now();
        // Twelve consistent low-variance samples around 0.95.
        for i in 0..12u32 {
            scorer
                .push_score_at(
                    QualityMetricType::ExtractionAccuracy,
                    0.95,
                    now - Duration::hours(i as i64),
                )
                .await;
        }
        let adjusted = scorer.recalibrate_thresholds().await;
        assert_eq!(adjusted, 1);
        let new_threshold = scorer
            .threshold_for(QualityMetricType::ExtractionAccuracy)
            .await;
        assert!((new_threshold - 0.95).abs() < 1e-9);

        // A noisy low series would push the candidate below the floor.
        for i in 0..12u32 {
            scorer
                .push_score_at(
                    QualityMetricType::UserSatisfaction,
                    if i % 2 == 0 { 0.2 } else { 0.8 },
                    now - Duration::hours(i as i64),
                )
                .await;
        }
        scorer.recalibrate_thresholds().await;
        let floored = scorer
            .threshold_for(QualityMetricType::UserSatisfaction)
            .await;
        assert!(floored >= 0.5);
    }

    #[tokio::test]
    async fn score_history_is_capped_fifo() {
        let alerts = Arc::new(AlertManager::new(AlertConfig::default(), HashMap::new()));
        let config = QualityConfig {
            max_stored_scores: 5,
            ..QualityConfig::default()
        };
        let scorer = QualityScorer::new(config, None, alerts);
        for _ in 0..9 {
            scorer
                .score_extraction(
                    &["FastAPI".to_string(), "Redis".to_string(), "Docker".to_string()],
                    "fastapi with redis cache in docker",
                    None,
                )
                .await;
        }
        assert_eq!(scorer.stored_score_count().await, 5);
    }

    #[tokio::test]
    async fn status_report_covers_latest_scores() {
        let scorer = scorer();
        scorer
            .score_extraction(
                &["FastAPI".to_string(), "PostgreSQL".to_string(), "Redis".to_string()],
                "rest api with postgresql database and redis caching",
                None,
            )
            .await;
        let status = scorer.current_status().await;
        assert!(status.overall.is_some());
        assert!(status.latest_scores.contains_key("extraction_accuracy"));
        assert!(status.latest_scores.contains_key("catalog_completeness"));
        assert_eq!(status.thresholds.len(), 6);
    }

    #[test]
    fn static_catalog_backs_coverage() {
        let catalog = StaticCatalog::with_defaults();
        assert!(catalog.lookup("FastAPI").is_some());
        assert!(!catalog.is_empty());
        assert!(catalog.len() > 20);
    }
}
