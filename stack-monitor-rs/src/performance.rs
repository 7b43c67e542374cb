//! # Performance analysis engine
//!
//! Consumes raw timing/success metrics and user interactions:
//! - Bounded ring buffers for metrics, interactions, and satisfaction
//! - Rolling per-metric baselines `{mean, median, p95, std}`
//! - Bottleneck detection against the baseline (p95 breach for
//!   latency-like metrics, `mean - 2*std` shortfall for rate-like ones)
//! - Usage-frequency anomaly detection against an hourly baseline
//! - Periodic predictive insights (capacity planning, performance
//!   trends), gated on a confidence threshold

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::{AlertCondition, AlertManager};
use crate::config::PerformanceConfig;
use crate::session::MonitoringEvent;

/// Sigma multiplier for rate-like shortfall detection, matching the
/// recalibration constant used by quality thresholds.
const RATE_SIGMA_K: f64 = 2.0;

/// Cooldown for bottleneck-driven alerts.
const BOTTLENECK_ALERT_COOLDOWN_MINUTES: u64 = 15;

/// One raw performance observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub component: String,
    pub operation: String,
    pub metric_name: String,
    pub value: f64,
    pub context: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Rolling statistical summary of one metric's recent history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricBaseline {
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub std: f64,
    pub sample_count: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BottleneckSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A detected deviation beyond the statistical baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceBottleneck {
    pub bottleneck_id: Uuid,
    pub component: String,
    pub operation: String,
    pub metric_name: String,
    pub value: f64,
    pub baseline_value: f64,
    /// Fractional deviation from the baseline value.
    pub deviation: f64,
    pub severity: BottleneckSeverity,
    pub detected_at: DateTime<Utc>,
    pub description: String,
}

/// One recorded user interaction with the generation workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInteraction {
    pub session_id: Option<Uuid>,
    pub user_segment: String,
    pub interaction_type: String,
    pub data: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// A detected usage-frequency anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagePattern {
    pub pattern_id: Uuid,
    pub pattern_type: String,
    pub observed_per_hour: f64,
    pub baseline_per_hour: f64,
    pub deviation: f64,
    pub detected_at: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
}

/// Satisfaction dimensions rated 1-5, folded into one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatisfactionRecord {
    pub session_id: Option<Uuid>,
    pub overall_score: f64,
    pub dimension_scores: HashMap<String, f64>,
    pub sentiment: Sentiment,
    pub improvement_areas: Vec<String>,
    /// Recent performance metrics recorded for the same session. May be
    /// empty when no metrics exist for it.
    pub correlated_metrics: Vec<(String, f64)>,
    pub feedback: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    CapacityPlanning,
    PerformanceTrend,
}

/// A predictive, recommendation-bearing insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictiveInsight {
    pub insight_id: Uuid,
    pub kind: InsightKind,
    pub summary: String,
    pub predictions: HashMap<String, f64>,
    pub confidence: f64,
    pub horizon_days: u64,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Aggregate analyzer counters for the query surface.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerformanceSummary {
    pub tracked_metrics: usize,
    pub tracked_interactions: usize,
    pub baseline_count: usize,
    pub bottlenecks_detected: u64,
    pub patterns_detected: u64,
    pub insights_generated: u64,
    pub avg_satisfaction: Option<f64>,
}

struct PerfState {
    metrics: VecDeque<PerformanceMetric>,
    interactions: VecDeque<UserInteraction>,
    satisfaction: VecDeque<SatisfactionRecord>,
    baselines: HashMap<String, MetricBaseline>,
    bottlenecks: VecDeque<PerformanceBottleneck>,
    patterns: VecDeque<UsagePattern>,
    insights: VecDeque<PredictiveInsight>,
    usage_baseline_per_hour: Option<f64>,
    total_bottlenecks: u64,
    total_patterns: u64,
    total_insights: u64,
}

/// Analyzer over raw workflow performance signals.
pub struct PerformanceAnalyzer {
    config: PerformanceConfig,
    alerts: Arc<AlertManager>,
    state: Mutex<PerfState>,
}

impl PerformanceAnalyzer {
    pub fn new(config: PerformanceConfig, alerts: Arc<AlertManager>) -> Self {
        Self {
            config,
            alerts,
            state: Mutex::new(PerfState {
                metrics: VecDeque::new(),
                interactions: VecDeque::new(),
                satisfaction: VecDeque::new(),
                baselines: HashMap::new(),
                bottlenecks: VecDeque::new(),
                patterns: VecDeque::new(),
                insights: VecDeque::new(),
                usage_baseline_per_hour: None,
                total_bottlenecks: 0,
                total_patterns: 0,
                total_insights: 0,
            }),
        }
    }

    /// Record one metric observation and evaluate it against its
    /// baseline. Returns the bottleneck if one was detected.
    pub async fn track_metric(
        &self,
        component: &str,
        operation: &str,
        metric_name: &str,
        value: f64,
        context: HashMap<String, Value>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Option<PerformanceBottleneck> {
        if !value.is_finite() {
            warn!(metric_name, "Discarding non-finite metric value");
            return None;
        }
        let metric = PerformanceMetric {
            component: component.to_string(),
            operation: operation.to_string(),
            metric_name: metric_name.to_string(),
            value,
            context: context.clone(),
            timestamp: timestamp.unwrap_or_else(Utc::now),
        };

        let bottleneck = {
            let mut state = self.state.lock().await;
            push_capped(&mut state.metrics, metric, self.config.max_stored_metrics);

            let baseline = state.baselines.get(metric_name).copied();
            let detected = baseline.and_then(|baseline| {
                if baseline.sample_count < self.config.min_baseline_samples {
                    return None;
                }
                self.evaluate_against_baseline(
                    component,
                    operation,
                    metric_name,
                    value,
                    &baseline,
                )
            });
            if let Some(bottleneck) = &detected {
                push_capped(
                    &mut state.bottlenecks,
                    bottleneck.clone(),
                    self.config.max_stored_records,
                );
                state.total_bottlenecks += 1;
                warn!(
                    metric = metric_name,
                    value,
                    severity = ?bottleneck.severity,
                    "Performance bottleneck detected"
                );
            }
            detected
        };

        if let Some(bottleneck) = &bottleneck {
            if bottleneck.severity >= BottleneckSeverity::High {
                let session_id = context
                    .get("session_id")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok());
                let condition = if is_rate_metric(metric_name) {
                    AlertCondition::Lt
                } else {
                    AlertCondition::Gt
                };
                self.alerts
                    .raise_threshold_alert(
                        metric_name,
                        value,
                        bottleneck.baseline_value,
                        bottleneck.deviation,
                        condition,
                        BOTTLENECK_ALERT_COOLDOWN_MINUTES,
                        session_id,
                        None,
                    )
                    .await;
            }
        }
        bottleneck
    }

    /// Record a user interaction and flag request-frequency anomalies.
    pub async fn track_interaction(
        &self,
        session_id: Option<Uuid>,
        user_segment: &str,
        interaction_type: &str,
        data: HashMap<String, Value>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Option<UsagePattern> {
        let interaction = UserInteraction {
            session_id,
            user_segment: user_segment.to_string(),
            interaction_type: interaction_type.to_string(),
            data,
            timestamp: timestamp.unwrap_or_else(Utc::now),
        };

        let mut state = self.state.lock().await;
        push_capped(
            &mut state.interactions,
            interaction,
            self.config.max_stored_interactions,
        );

        let baseline = state.usage_baseline_per_hour?;
        if baseline <= 0.0 {
            return None;
        }
        let hour_ago = Utc::now() - Duration::hours(1);
        let observed = state
            .interactions
            .iter()
            .filter(|i| i.timestamp >= hour_ago)
            .count() as f64;
        let deviation = (observed - baseline).abs() / baseline;
        if deviation <= self.config.usage_deviation_threshold {
            return None;
        }

        let pattern = UsagePattern {
            pattern_id: Uuid::new_v4(),
            pattern_type: "request_frequency_anomaly".to_string(),
            observed_per_hour: observed,
            baseline_per_hour: baseline,
            deviation,
            detected_at: Utc::now(),
            description: format!(
                "Request rate {observed:.1}/h deviates {:.0}% from baseline {baseline:.1}/h",
                deviation * 100.0
            ),
        };
        push_capped(
            &mut state.patterns,
            pattern.clone(),
            self.config.max_stored_records,
        );
        state.total_patterns += 1;
        info!(
            observed_per_hour = observed,
            baseline_per_hour = baseline,
            "Usage-frequency anomaly detected"
        );
        Some(pattern)
    }

    /// Fold per-dimension satisfaction scores (1-5) into one record.
    ///
    /// Returns `None` when no dimensions were supplied.
    pub async fn track_satisfaction(
        &self,
        session_id: Option<Uuid>,
        scores: HashMap<String, f64>,
        feedback: Option<String>,
        _context: Option<HashMap<String, Value>>,
    ) -> Option<SatisfactionRecord> {
        if scores.is_empty() {
            warn!("Satisfaction record without dimensions ignored");
            return None;
        }
        let overall = scores.values().sum::<f64>() / scores.len() as f64;
        let sentiment = if overall > 3.5 {
            Sentiment::Positive
        } else {
            Sentiment::Negative
        };
        let improvement_areas: Vec<String> = scores
            .iter()
            .filter(|(_, v)| **v < 3.0)
            .map(|(k, _)| k.clone())
            .collect();

        let mut state = self.state.lock().await;
        let correlated_metrics: Vec<(String, f64)> = match session_id {
            Some(session_id) => {
                let key = session_id.to_string();
                state
                    .metrics
                    .iter()
                    .filter(|m| {
                        m.context
                            .get("session_id")
                            .and_then(|v| v.as_str())
                            .map_or(false, |s| s == key)
                    })
                    .map(|m| (m.metric_name.clone(), m.value))
                    .collect()
            }
            None => Vec::new(),
        };

        let record = SatisfactionRecord {
            session_id,
            overall_score: overall,
            dimension_scores: scores,
            sentiment,
            improvement_areas,
            correlated_metrics,
            feedback,
            timestamp: Utc::now(),
        };
        push_capped(
            &mut state.satisfaction,
            record.clone(),
            self.config.max_stored_records,
        );
        Some(record)
    }

    /// Route a buffered workflow event into metric tracking.
    pub async fn consume_event(&self, event: &MonitoringEvent) {
        if let Some(duration_ms) = event.duration_ms {
            let mut context = HashMap::new();
            context.insert(
                "session_id".to_string(),
                Value::String(event.session_id.to_string()),
            );
            context.insert(
                "correlation_id".to_string(),
                Value::String(event.correlation_id.clone()),
            );
            self.track_metric(
                &event.component,
                &event.operation,
                &format!("{}_duration_ms", event.event_type.as_str()),
                duration_ms as f64,
                context,
                Some(event.timestamp),
            )
            .await;
        }
    }

    /// Recompute baselines from buffered samples. Mirrors quality
    /// threshold recalibration, but on raw metrics.
    pub async fn adapt_baselines(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(self.config.baseline_window_hours as i64);
        let mut state = self.state.lock().await;

        let mut grouped: HashMap<String, Vec<f64>> = HashMap::new();
        for metric in state.metrics.iter().filter(|m| m.timestamp >= cutoff) {
            grouped
                .entry(metric.metric_name.clone())
                .or_default()
                .push(metric.value);
        }

        let mut updated = 0;
        for (metric_name, mut values) in grouped {
            if values.len() < self.config.min_baseline_samples {
                continue;
            }
            let sample_mean = mean(&values);
            let sample_std = stddev(&values, sample_mean);
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let baseline = MetricBaseline {
                mean: sample_mean,
                median: percentile(&values, 0.5),
                p95: percentile(&values, 0.95),
                std: sample_std,
                sample_count: values.len(),
                updated_at: Utc::now(),
            };
            state.baselines.insert(metric_name, baseline);
            updated += 1;
        }

        // Usage baseline: mean hourly interaction rate over the window.
        let window_hours = self.config.baseline_window_hours.max(1) as f64;
        let recent = state
            .interactions
            .iter()
            .filter(|i| i.timestamp >= cutoff)
            .count();
        if recent > 0 {
            state.usage_baseline_per_hour = Some(recent as f64 / window_hours);
        }

        if updated > 0 {
            debug!(updated, "Performance baselines adapted");
        }
        updated
    }

    /// Generate capacity-planning and performance-trend insights,
    /// emitting only those above the confidence threshold.
    pub async fn generate_insights(&self) -> Vec<PredictiveInsight> {
        let mut fresh = Vec::new();
        if let Some(insight) = self.capacity_insight().await {
            fresh.push(insight);
        }
        fresh.extend(self.trend_insights().await);

        if !fresh.is_empty() {
            let mut state = self.state.lock().await;
            for insight in &fresh {
                push_capped(
                    &mut state.insights,
                    insight.clone(),
                    self.config.max_stored_records,
                );
                state.total_insights += 1;
                info!(kind = ?insight.kind, confidence = insight.confidence, "Predictive insight generated");
            }
        }
        fresh
    }

    /// One maintenance pass: baselines first, then insight generation.
    pub async fn run_maintenance(&self) {
        self.adapt_baselines().await;
        self.generate_insights().await;
    }

    pub async fn recent_bottlenecks(&self, limit: usize) -> Vec<PerformanceBottleneck> {
        let state = self.state.lock().await;
        state
            .bottlenecks
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn recent_patterns(&self, limit: usize) -> Vec<UsagePattern> {
        let state = self.state.lock().await;
        state.patterns.iter().rev().take(limit).cloned().collect()
    }

    pub async fn recent_insights(&self, limit: usize) -> Vec<PredictiveInsight> {
        let state = self.state.lock().await;
        state.insights.iter().rev().take(limit).cloned().collect()
    }

    pub async fn baseline_for(&self, metric_name: &str) -> Option<MetricBaseline> {
        self.state.lock().await.baselines.get(metric_name).copied()
    }

    pub async fn summary(&self) -> PerformanceSummary {
        let state = self.state.lock().await;
        let avg_satisfaction = if state.satisfaction.is_empty() {
            None
        } else {
            Some(
                state
                    .satisfaction
                    .iter()
                    .map(|s| s.overall_score)
                    .sum::<f64>()
                    / state.satisfaction.len() as f64,
            )
        };
        PerformanceSummary {
            tracked_metrics: state.metrics.len(),
            tracked_interactions: state.interactions.len(),
            baseline_count: state.baselines.len(),
            bottlenecks_detected: state.total_bottlenecks,
            patterns_detected: state.total_patterns,
            insights_generated: state.total_insights,
            avg_satisfaction,
        }
    }

    fn evaluate_against_baseline(
        &self,
        component: &str,
        operation: &str,
        metric_name: &str,
        value: f64,
        baseline: &MetricBaseline,
    ) -> Option<PerformanceBottleneck> {
        let (baseline_value, deviation) = if is_rate_metric(metric_name) {
            let floor = baseline.mean - RATE_SIGMA_K * baseline.std;
            if value >= floor || baseline.mean <= 0.0 {
                return None;
            }
            (floor, (baseline.mean - value) / baseline.mean)
        } else {
            if baseline.p95 <= 0.0 || value <= baseline.p95 {
                return None;
            }
            (baseline.p95, (value - baseline.p95) / baseline.p95)
        };

        let severity = bottleneck_severity(deviation);
        Some(PerformanceBottleneck {
            bottleneck_id: Uuid::new_v4(),
            component: component.to_string(),
            operation: operation.to_string(),
            metric_name: metric_name.to_string(),
            value,
            baseline_value,
            deviation,
            severity,
            detected_at: Utc::now(),
            description: format!(
                "{metric_name} at {value:.2} deviates {:.0}% from baseline {baseline_value:.2}",
                deviation * 100.0
            ),
        })
    }

    async fn capacity_insight(&self) -> Option<PredictiveInsight> {
        let horizon = self.config.prediction_horizon_days;
        let (daily_counts, capacity) = {
            let state = self.state.lock().await;
            let today = Utc::now().date_naive();
            let mut per_day: HashMap<chrono::NaiveDate, usize> = HashMap::new();
            for interaction in &state.interactions {
                let day = interaction.timestamp.date_naive();
                if day != today {
                    *per_day.entry(day).or_insert(0) += 1;
                }
            }
            let mut days: Vec<(chrono::NaiveDate, usize)> = per_day.into_iter().collect();
            days.sort_by_key(|(day, _)| *day);
            (
                days.into_iter().map(|(_, n)| n as f64).collect::<Vec<f64>>(),
                self.config.capacity_per_day,
            )
        };

        if daily_counts.len() < 3 {
            return None;
        }
        let count_mean = mean(&daily_counts);
        if count_mean <= 0.0 {
            return None;
        }
        let count_std = stddev(&daily_counts, count_mean);
        let confidence = (1.0 - count_std / count_mean).clamp(0.0, 1.0);
        if confidence < self.config.prediction_confidence_threshold {
            debug!(confidence, "Capacity insight below confidence gate");
            return None;
        }

        let slope = linear_slope(&daily_counts);
        let last = *daily_counts.last().unwrap_or(&count_mean);
        let predicted_daily = (last + slope * horizon as f64).max(0.0);
        let predicted_utilization = predicted_daily / capacity;

        let recommendations = if predicted_utilization > 0.8 {
            vec![
                format!(
                    "Predicted load reaches {:.0}% of provisioned capacity within {horizon} days; scale up capacity",
                    predicted_utilization * 100.0
                ),
            ]
        } else {
            vec!["Projected load fits current capacity; no action needed".to_string()]
        };

        Some(PredictiveInsight {
            insight_id: Uuid::new_v4(),
            kind: InsightKind::CapacityPlanning,
            summary: format!(
                "Daily interactions trending to {predicted_daily:.0}/day over {horizon} days"
            ),
            predictions: HashMap::from([
                ("predicted_daily_interactions".to_string(), predicted_daily),
                ("predicted_utilization".to_string(), predicted_utilization),
                ("daily_growth_rate".to_string(), slope),
            ]),
            confidence,
            horizon_days: horizon,
            recommendations,
            generated_at: Utc::now(),
        })
    }

    async fn trend_insights(&self) -> Vec<PredictiveInsight> {
        let cutoff = Utc::now() - Duration::hours(self.config.baseline_window_hours as i64);
        let grouped: HashMap<String, Vec<f64>> = {
            let state = self.state.lock().await;
            let mut grouped: HashMap<String, Vec<f64>> = HashMap::new();
            for metric in state.metrics.iter().filter(|m| m.timestamp >= cutoff) {
                grouped
                    .entry(metric.metric_name.clone())
                    .or_default()
                    .push(metric.value);
            }
            grouped
        };

        let mut insights = Vec::new();
        for (metric_name, values) in grouped {
            if values.len() < self.config.min_baseline_samples.max(8) {
                continue;
            }
            let mid = values.len() / 2;
            let first = mean(&values[..mid]);
            let second = mean(&values[mid..]);
            if first <= 0.0 {
                continue;
            }
            let relative_change = (second - first) / first;
            if relative_change.abs() < 0.15 {
                continue;
            }
            let second_std = stddev(&values[mid..], second);
            let confidence = if second > 0.0 {
                (1.0 - second_std / second).clamp(0.0, 1.0)
            } else {
                0.0
            };
            if confidence < self.config.prediction_confidence_threshold {
                continue;
            }

            let worsening = if is_rate_metric(&metric_name) {
                relative_change < 0.0
            } else {
                relative_change > 0.0
            };
            let predicted_next = (second + (second - first)).max(0.0);
            let recommendations = if worsening {
                vec![format!(
                    "Investigate regression in {metric_name}: {:.0}% drift over the window",
                    relative_change.abs() * 100.0
                )]
            } else {
                vec![format!("{metric_name} is improving; no action needed")]
            };

            insights.push(PredictiveInsight {
                insight_id: Uuid::new_v4(),
                kind: InsightKind::PerformanceTrend,
                summary: format!(
                    "{metric_name} moving from {first:.2} to {second:.2} over the baseline window"
                ),
                predictions: HashMap::from([
                    ("projected_value".to_string(), predicted_next),
                    ("relative_change".to_string(), relative_change),
                ]),
                confidence,
                horizon_days: self.config.prediction_horizon_days,
                recommendations,
                generated_at: Utc::now(),
            });
        }
        insights
    }
}

/// Rate-like metrics alert on shortfall; everything else is treated as
/// latency-like and alerts on overshoot.
fn is_rate_metric(metric_name: &str) -> bool {
    let name = metric_name.to_lowercase();
    name.contains("rate")
        || name.contains("throughput")
        || name.contains("per_hour")
        || name.contains("success")
}

fn bottleneck_severity(deviation: f64) -> BottleneckSeverity {
    if deviation >= 0.25 {
        BottleneckSeverity::Critical
    } else if deviation >= 0.15 {
        BottleneckSeverity::High
    } else if deviation >= 0.05 {
        BottleneckSeverity::Medium
    } else {
        BottleneckSeverity::Low
    }
}

fn push_capped<T>(buffer: &mut VecDeque<T>, item: T, max: usize) {
    while buffer.len() >= max.max(1) {
        buffer.pop_front();
    }
    buffer.push_back(item);
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

/// Nearest-rank percentile over a pre-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).ceil() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Least-squares slope of evenly spaced samples.
fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
