//! # Session and event correlation layer
//!
//! Owns the lifecycle of generation sessions and the shared event buffer
//! that feeds the scoring engines:
//! - Session registration with derived correlation ids
//! - Append-only per-session event logs with FIFO caps
//! - A bounded streaming buffer drained by the orchestrator flush loop
//! - Timeout eviction for sessions that never complete

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use metrics::gauge;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SessionConfig;

/// Lifecycle state of a monitored generation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Error,
    Timeout,
}

/// Workflow event kinds recorded against a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    ParsingStart,
    ParsingComplete,
    ExtractionStart,
    ExtractionComplete,
    LlmCallStart,
    LlmCallComplete,
    ValidationStart,
    ValidationComplete,
    SessionComplete,
    SessionError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStart => "session_start",
            EventType::ParsingStart => "parsing_start",
            EventType::ParsingComplete => "parsing_complete",
            EventType::ExtractionStart => "extraction_start",
            EventType::ExtractionComplete => "extraction_complete",
            EventType::LlmCallStart => "llm_call_start",
            EventType::LlmCallComplete => "llm_call_complete",
            EventType::ValidationStart => "validation_start",
            EventType::ValidationComplete => "validation_complete",
            EventType::SessionComplete => "session_complete",
            EventType::SessionError => "session_error",
        }
    }
}

/// One workflow event, owned by the session it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub event_id: Uuid,
    pub session_id: Uuid,
    pub correlation_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub operation: String,
    pub data: HashMap<String, Value>,
    pub duration_ms: Option<u64>,
    pub success: bool,
    pub error_message: Option<String>,
}

/// One end-to-end run of the monitored generation workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub correlation_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub requirements: HashMap<String, Value>,
    pub metadata: HashMap<String, Value>,
    pub events: VecDeque<MonitoringEvent>,
}

impl Session {
    fn new(requirements: HashMap<String, Value>, metadata: HashMap<String, Value>) -> Self {
        let session_id = Uuid::new_v4();
        let start_time = Utc::now();
        let correlation_id = derive_correlation_id(&session_id, &start_time);
        Self {
            session_id,
            correlation_id,
            start_time,
            end_time: None,
            status: SessionStatus::Active,
            requirements,
            metadata,
            events: VecDeque::new(),
        }
    }

    /// Append an event, evicting the oldest when the cap is reached.
    fn push_event(&mut self, event: MonitoringEvent, max_events: usize) {
        while self.events.len() >= max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Loggable identifier joining events across log lines and systems.
fn derive_correlation_id(session_id: &Uuid, start_time: &DateTime<Utc>) -> String {
    let id = session_id.to_string();
    format!("tsg_{}_{}", start_time.timestamp(), &id[..8])
}

/// Tracks active sessions and buffers their events for the flush loop.
///
/// The active-session map and the event buffer are each behind their own
/// lock; the buffer push uses `try_lock` so a contended streaming buffer
/// never blocks the recording path (the event is still stored in the
/// session synchronously).
pub struct SessionTracker {
    config: SessionConfig,
    sessions: RwLock<HashMap<Uuid, Session>>,
    buffer: Mutex<VecDeque<MonitoringEvent>>,
}

impl SessionTracker {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    /// Register a new session and record its `session_start` event.
    pub async fn start_session(
        &self,
        requirements: HashMap<String, Value>,
        metadata: HashMap<String, Value>,
    ) -> Session {
        let mut session = Session::new(requirements.clone(), metadata);
        let event = self.build_event(
            &session,
            EventType::SessionStart,
            "session_tracker",
            "start_session",
            requirements.into_iter().collect(),
            None,
            true,
            None,
        );
        session.push_event(event.clone(), self.config.max_events_per_session);

        let active = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.session_id, session.clone());
            sessions.len()
        };
        gauge!("stack_monitor.active_sessions", active as f64);
        self.enqueue(event);

        debug!(
            correlation_id = %session.correlation_id,
            "Generation session registered"
        );
        session
    }

    /// Record one workflow step against a session.
    ///
    /// Unknown session ids log a warning and mutate nothing; a step
    /// arriving after eviction must never raise.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_step(
        &self,
        session_id: Uuid,
        event_type: EventType,
        component: &str,
        operation: &str,
        data: HashMap<String, Value>,
        duration_ms: Option<u64>,
        success: bool,
        error_message: Option<String>,
    ) -> bool {
        let event = {
            let mut sessions = self.sessions.write().await;
            let session = match sessions.get_mut(&session_id) {
                Some(s) => s,
                None => {
                    warn!(%session_id, step = operation, "Step for unknown session ignored");
                    return false;
                }
            };
            let event = MonitoringEvent {
                event_id: Uuid::new_v4(),
                session_id,
                correlation_id: session.correlation_id.clone(),
                event_type,
                timestamp: Utc::now(),
                component: component.to_string(),
                operation: operation.to_string(),
                data,
                duration_ms,
                success,
                error_message,
            };
            session.push_event(event.clone(), self.config.max_events_per_session);
            event
        };
        self.enqueue(event);
        true
    }

    /// Finalize a session and remove it from the active set.
    ///
    /// Returns `None` if the session was already gone.
    pub async fn complete_session(
        &self,
        session_id: Uuid,
        result: HashMap<String, Value>,
        success: bool,
        error_message: Option<String>,
    ) -> Option<Session> {
        let (session, active) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.remove(&session_id)?;
            (session, sessions.len())
        };
        gauge!("stack_monitor.active_sessions", active as f64);

        let mut session = session;
        session.end_time = Some(Utc::now());
        session.status = if success {
            SessionStatus::Completed
        } else {
            SessionStatus::Error
        };
        let event_type = if success {
            EventType::SessionComplete
        } else {
            EventType::SessionError
        };
        let event = self.build_event(
            &session,
            event_type,
            "session_tracker",
            "complete_session",
            result,
            session
                .end_time
                .map(|end| (end - session.start_time).num_milliseconds().max(0) as u64),
            success,
            error_message,
        );
        session.push_event(event.clone(), self.config.max_events_per_session);
        self.enqueue(event);

        debug!(
            correlation_id = %session.correlation_id,
            status = ?session.status,
            "Generation session finalized"
        );
        Some(session)
    }

    /// Evict sessions older than the configured maximum duration,
    /// finalizing each as a timeout with a synthetic failure event.
    pub async fn evict_expired(&self) -> Vec<Session> {
        let max_age = Duration::seconds(self.config.max_session_duration_secs as i64);
        let now = Utc::now();

        let expired: Vec<Uuid> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| now - s.start_time > max_age)
                .map(|s| s.session_id)
                .collect()
        };

        let mut evicted = Vec::with_capacity(expired.len());
        for session_id in expired {
            let removed = {
                let mut sessions = self.sessions.write().await;
                sessions.remove(&session_id)
            };
            let Some(mut session) = removed else { continue };
            session.end_time = Some(now);
            session.status = SessionStatus::Timeout;
            let event = self.build_event(
                &session,
                EventType::SessionError,
                "session_tracker",
                "timeout_eviction",
                HashMap::new(),
                None,
                false,
                Some("session exceeded max duration".to_string()),
            );
            session.push_event(event.clone(), self.config.max_events_per_session);
            self.enqueue(event);
            warn!(correlation_id = %session.correlation_id, "Session evicted as timed out");
            evicted.push(session);
        }

        if !evicted.is_empty() {
            let active = self.sessions.read().await.len();
            gauge!("stack_monitor.active_sessions", active as f64);
        }
        evicted
    }

    /// Force-complete every remaining session, used during shutdown.
    pub async fn force_complete_all(&self, reason: &str) -> Vec<Session> {
        let ids: Vec<Uuid> = self.sessions.read().await.keys().copied().collect();
        let mut finalized = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self
                .complete_session(id, HashMap::new(), false, Some(reason.to_string()))
                .await
            {
                finalized.push(session);
            }
        }
        finalized
    }

    /// Drain up to `max` buffered events, oldest first.
    pub async fn drain_buffer(&self, max: usize) -> Vec<MonitoringEvent> {
        let mut buffer = self.buffer.lock().await;
        let take = buffer.len().min(max);
        buffer.drain(..take).collect()
    }

    /// Put unprocessed events back at the front of the buffer, preserving
    /// their original order.
    pub async fn requeue(&self, events: Vec<MonitoringEvent>) {
        let mut buffer = self.buffer.lock().await;
        for event in events.into_iter().rev() {
            buffer.push_front(event);
        }
        let max = self.config.max_buffer_size;
        while buffer.len() > max {
            buffer.pop_back();
        }
    }

    pub async fn buffered_events(&self) -> usize {
        self.buffer.lock().await.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn get_session(&self, session_id: Uuid) -> Option<Session> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn active_sessions(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn build_event(
        &self,
        session: &Session,
        event_type: EventType,
        component: &str,
        operation: &str,
        data: HashMap<String, Value>,
        duration_ms: Option<u64>,
        success: bool,
        error_message: Option<String>,
    ) -> MonitoringEvent {
        MonitoringEvent {
            event_id: Uuid::new_v4(),
            session_id: session.session_id,
            correlation_id: session.correlation_id.clone(),
            event_type,
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: operation.to_string(),
            data,
            duration_ms,
            success,
            error_message,
        }
    }

    /// Non-blocking streaming-buffer push. On lock contention the event is
    /// simply not buffered; it already lives in its session log.
    fn enqueue(&self, event: MonitoringEvent) {
        if !self.config.streaming_enabled {
            return;
        }
        match self.buffer.try_lock() {
            Ok(mut buffer) => {
                while buffer.len() >= self.config.max_buffer_size {
                    buffer.pop_front();
                }
                buffer.push_back(event);
            }
            Err(_) => {
                debug!("Event buffer contended, skipping streaming enqueue");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> SessionTracker {
        SessionTracker::new(SessionConfig::default())
    }

    fn small_tracker(max_events: usize) -> SessionTracker {
        let config = SessionConfig {
            max_events_per_session: max_events,
            ..SessionConfig::default()
        };
        SessionTracker::new(config)
    }

    #[tokio::test]
    async fn correlation_id_derives_from_session() {
        let tracker = tracker();
        let session = tracker.start_session(HashMap::new(), HashMap::new()).await;
        let prefix = &session.session_id.to_string()[..8];
        assert!(session.correlation_id.starts_with("tsg_"));
        assert!(session.correlation_id.ends_with(prefix));
    }

    #[tokio::test]
    async fn unknown_session_step_mutates_nothing() {
        let tracker = tracker();
        let recorded = tracker
            .record_step(
                Uuid::new_v4(),
                EventType::ParsingComplete,
                "parser",
                "parse_requirements",
                HashMap::new(),
                Some(12),
                true,
                None,
            )
            .await;
        assert!(!recorded);
        assert_eq!(tracker.active_count().await, 0);
        assert_eq!(tracker.buffered_events().await, 0);
    }

    #[tokio::test]
    async fn per_session_events_are_fifo_capped() {
        let tracker = small_tracker(5);
        let session = tracker.start_session(HashMap::new(), HashMap::new()).await;

        for i in 0..12 {
            tracker
                .record_step(
                    session.session_id,
                    EventType::LlmCallComplete,
                    "llm",
                    &format!("call_{i}"),
                    HashMap::new(),
                    Some(i),
                    true,
                    None,
                )
                .await;
        }

        let stored = tracker.get_session(session.session_id).await.unwrap();
        assert_eq!(stored.events.len(), 5);
        // The retained events are the most recent ones.
        let operations: Vec<&str> = stored.events.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(
            operations,
            vec!["call_7", "call_8", "call_9", "call_10", "call_11"]
        );
    }

    #[tokio::test]
    async fn complete_session_is_single_shot() {
        let tracker = tracker();
        let session = tracker.start_session(HashMap::new(), HashMap::new()).await;

        let first = tracker
            .complete_session(session.session_id, HashMap::new(), true, None)
            .await;
        assert_eq!(first.unwrap().status, SessionStatus::Completed);

        let second = tracker
            .complete_session(session.session_id, HashMap::new(), true, None)
            .await;
        assert!(second.is_none());
        assert_eq!(tracker.active_count().await, 0);
    }

    #[tokio::test]
    async fn failed_completion_marks_error() {
        let tracker = tracker();
        let session = tracker.start_session(HashMap::new(), HashMap::new()).await;
        let finalized = tracker
            .complete_session(
                session.session_id,
                HashMap::new(),
                false,
                Some("llm backend unavailable".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(finalized.status, SessionStatus::Error);
        let last = finalized.events.back().unwrap();
        assert_eq!(last.event_type, EventType::SessionError);
    }

    #[tokio::test]
    async fn expired_sessions_are_evicted_as_timeouts() {
        let config = SessionConfig {
            max_session_duration_secs: 0,
            ..SessionConfig::default()
        };
        let tracker = SessionTracker::new(config);
        let session = tracker.start_session(HashMap::new(), HashMap::new()).await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let evicted = tracker.evict_expired().await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].session_id, session.session_id);
        assert_eq!(evicted[0].status, SessionStatus::Timeout);
        assert_eq!(tracker.active_count().await, 0);
    }

    #[tokio::test]
    async fn drain_preserves_order_and_requeue_restores_it() {
        let tracker = tracker();
        let session = tracker.start_session(HashMap::new(), HashMap::new()).await;
        for i in 0..4 {
            tracker
                .record_step(
                    session.session_id,
                    EventType::ParsingComplete,
                    "parser",
                    &format!("step_{i}"),
                    HashMap::new(),
                    None,
                    true,
                    None,
                )
                .await;
        }

        // session_start + 4 steps
        let drained = tracker.drain_buffer(100).await;
        assert_eq!(drained.len(), 5);
        assert_eq!(drained[0].event_type, EventType::SessionStart);

        tracker.requeue(drained.clone()).await;
        let again = tracker.drain_buffer(100).await;
        assert_eq!(again.len(), 5);
        assert_eq!(again[1].operation, "step_0");
    }
}
