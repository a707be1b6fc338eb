//! Notification boundary.
//!
//! Approval decisions and certificate generation are announced to students,
//! linked parents and approvers through a [`NotificationDispatcher`]. Dispatch
//! happens after the transition commits; a failed dispatch is logged and kept
//! in a ledger but never undoes the transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::directory::StudentDirectory;
use crate::projection::{CertificateView, HonorResultView};

/// Maximum failures kept before pruning.
const MAX_FAILURES: usize = 1_000;

/// Kind of event announced to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HonorEventKind {
    /// A honor result was approved
    HonorApproved,
    /// A honor result was rejected
    HonorRejected,
    /// A certificate was generated
    CertificateGenerated,
}

impl HonorEventKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HonorEventKind::HonorApproved => "honor_approved",
            HonorEventKind::HonorRejected => "honor_rejected",
            HonorEventKind::CertificateGenerated => "certificate_generated",
        }
    }
}

/// Entity snapshot carried by an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum EventSnapshot {
    /// Honor result at decision time
    HonorResult(HonorResultView),
    /// Certificate at generation time
    Certificate(CertificateView),
}

/// An event for the notification dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HonorEvent {
    /// Unique event ID
    pub id: String,
    /// Event kind
    pub kind: HonorEventKind,
    /// Student the event concerns
    pub student_id: String,
    /// Linked parents to inform
    pub parent_ids: Vec<String>,
    /// Entity snapshot
    pub snapshot: EventSnapshot,
    /// When the transition committed
    pub occurred_at: DateTime<Utc>,
}

impl HonorEvent {
    /// Create an event.
    pub fn new(
        kind: HonorEventKind,
        student_id: impl Into<String>,
        parent_ids: Vec<String>,
        snapshot: EventSnapshot,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            student_id: student_id.into(),
            parent_ids,
            snapshot,
            occurred_at: Utc::now(),
        }
    }
}

/// Error types for dispatch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    /// Dispatcher is not reachable
    #[error("Dispatcher unavailable: {0}")]
    Unavailable(String),

    /// Delivery was attempted and failed
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Consumer of honor events. Delivery and format are the dispatcher's concern.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Dispatcher identifier for logs.
    fn name(&self) -> &str;

    /// Deliver an event.
    async fn dispatch(&self, event: &HonorEvent) -> Result<(), NotifyError>;
}

/// Dispatcher that only logs events.
#[derive(Debug, Default)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn dispatch(&self, event: &HonorEvent) -> Result<(), NotifyError> {
        info!(
            event_id = %event.id,
            kind = event.kind.as_str(),
            student_id = %event.student_id,
            parents = event.parent_ids.len(),
            "Honor event"
        );
        let snapshot = serde_json::to_string(&event.snapshot)
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;
        debug!(event_id = %event.id, snapshot = %snapshot, "Honor event snapshot");
        Ok(())
    }
}

/// Dispatcher that records events, for tests.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: RwLock<Vec<HonorEvent>>,
    failing: AtomicBool,
    attempts: AtomicU32,
}

impl RecordingDispatcher {
    /// Create a recording dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every dispatch fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delivered events.
    pub async fn events(&self) -> Vec<HonorEvent> {
        self.events.read().await.clone()
    }

    /// Delivered events of one kind.
    pub async fn events_of(&self, kind: HonorEventKind) -> Vec<HonorEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Dispatch attempts, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn dispatch(&self, event: &HonorEvent) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Unavailable("recording dispatcher set to fail".to_string()));
        }
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// A dispatch that did not go through.
#[derive(Debug, Clone)]
pub struct NotificationFailure {
    /// Event that failed
    pub event_id: String,
    /// Event kind
    pub kind: HonorEventKind,
    /// Student concerned
    pub student_id: String,
    /// Dispatcher that failed
    pub dispatcher: String,
    /// Error text
    pub error: String,
    /// When
    pub failed_at: DateTime<Utc>,
}

/// Sends events after commits and keeps the failures.
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    directory: Arc<dyn StudentDirectory>,
    failures: RwLock<VecDeque<NotificationFailure>>,
}

impl Notifier {
    /// Create a notifier.
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        directory: Arc<dyn StudentDirectory>,
    ) -> Self {
        Self {
            dispatcher,
            directory,
            failures: RwLock::new(VecDeque::new()),
        }
    }

    /// Announce a committed transition. Never fails.
    pub async fn announce(&self, kind: HonorEventKind, student_id: &str, snapshot: EventSnapshot) {
        let parent_ids = match self.directory.profile(student_id).await {
            Ok(Some(profile)) => profile.parent_ids,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(
                    student_id = %student_id,
                    error = %e,
                    "Could not resolve parents; notifying student only"
                );
                Vec::new()
            }
        };

        let event = HonorEvent::new(kind, student_id, parent_ids, snapshot);

        if let Err(e) = self.dispatcher.dispatch(&event).await {
            warn!(
                event_id = %event.id,
                kind = kind.as_str(),
                student_id = %student_id,
                dispatcher = self.dispatcher.name(),
                error = %e,
                "Notification dispatch failed"
            );

            let mut failures = self.failures.write().await;
            failures.push_front(NotificationFailure {
                event_id: event.id.clone(),
                kind,
                student_id: student_id.to_string(),
                dispatcher: self.dispatcher.name().to_string(),
                error: e.to_string(),
                failed_at: Utc::now(),
            });
            while failures.len() > MAX_FAILURES {
                failures.pop_back();
            }
        }
    }

    /// Recent dispatch failures, newest first.
    pub async fn failures(&self, limit: usize) -> Vec<NotificationFailure> {
        self.failures.read().await.iter().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{StaticDirectory, StudentProfile};
    use crate::types::{HonorResult, ResultKey};
    use honor_rules::Gpa;

    fn snapshot() -> EventSnapshot {
        let result = HonorResult::candidate(
            ResultKey::new("s1", "elementary", "2024-2025"),
            Gpa::new(98.5).unwrap(),
            "With Highest Honors",
        );
        EventSnapshot::HonorResult(HonorResultView::from(&result))
    }

    fn directory() -> Arc<StaticDirectory> {
        Arc::new(StaticDirectory::with_profiles(vec![StudentProfile::new(
            "s1", "Ana Cruz", "2024-0001",
        )
        .with_parent("p1")
        .with_parent("p2")]))
    }

    #[tokio::test]
    async fn test_announce_includes_parents() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let notifier = Notifier::new(dispatcher.clone(), directory());

        notifier
            .announce(HonorEventKind::HonorApproved, "s1", snapshot())
            .await;

        let events = dispatcher.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].parent_ids, vec!["p1", "p2"]);
        assert_eq!(events[0].kind, HonorEventKind::HonorApproved);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_raised() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        dispatcher.set_failing(true);
        let notifier = Notifier::new(dispatcher.clone(), directory());

        notifier
            .announce(HonorEventKind::HonorRejected, "s1", snapshot())
            .await;

        assert_eq!(dispatcher.attempts(), 1);
        assert!(dispatcher.events().await.is_empty());
        let failures = notifier.failures(10).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].dispatcher, "recording");
    }

    #[tokio::test]
    async fn test_tracing_dispatcher_accepts_events() {
        let event = HonorEvent::new(HonorEventKind::HonorApproved, "s1", Vec::new(), snapshot());
        assert!(TracingDispatcher.dispatch(&event).await.is_ok());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "honor_approved");
        assert_eq!(json["snapshot"]["entity"], "honor_result");
    }
}
