//! # Stack Monitor
//!
//! Monitoring and alerting pipeline for the technology-stack generation
//! workflow. Correlates workflow events into sessions, scores each
//! session's quality and performance against adaptive baselines, and
//! raises rate-limited, severity-tiered alerts when scores cross
//! thresholds or trend toward degradation.
//!
//! The [`orchestrator::IntegrationOrchestrator`] is the entry point: the
//! process owner constructs one, starts it, and feeds it workflow events
//! through the `track_*` family. Collaborators (technology catalog,
//! notification endpoints) are injected at construction and all degrade
//! gracefully when absent.

pub mod alerts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod performance;
pub mod persistence;
pub mod quality;
pub mod session;

pub use alerts::{Alert, AlertManager, AlertRule, AlertSeverity, AlertStatus};
pub use catalog::{CatalogEntry, CatalogLookup, StaticCatalog};
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use notify::{ChannelKind, NotificationChannel};
pub use orchestrator::{AnalyticsSummary, HealthLevel, HealthStatus, IntegrationOrchestrator};
pub use performance::{PerformanceAnalyzer, PerformanceBottleneck, PredictiveInsight};
pub use quality::{GenerationResult, QualityScore, QualityScorer, UserFeedback};
pub use session::{EventType, MonitoringEvent, Session, SessionStatus, SessionTracker};
