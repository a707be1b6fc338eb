//! Audit trail of committed honor and certificate transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Maximum entries in the trail before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// Actor recorded for batch recomputation.
pub const SYSTEM_ACTOR: &str = "system:recompute";

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CandidateCreated,
    CandidateRefreshed,
    CandidateRetracted,
    Overridden,
    Approved,
    Rejected,
    CertificateGenerated,
    CertificateDownloaded,
    CertificatePrinted,
}

/// An entry in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub entry_id: String,
    /// Honor result or certificate ID
    pub entity_id: String,
    /// Action taken
    pub action: AuditAction,
    /// Who acted
    pub actor_id: String,
    /// Free-form detail (reason, honor type, serial)
    pub detail: Option<String>,
    /// When
    pub recorded_at: DateTime<Utc>,
}

/// Bounded in-memory audit trail, newest first.
pub struct AuditTrail {
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    max_entries: usize,
    enabled: bool,
}

impl AuditTrail {
    /// Create a new audit trail.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
            enabled: true,
        }
    }

    /// A trail that records nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::with_max_entries(0)
        }
    }

    /// Record an action.
    pub async fn record(
        &self,
        entity_id: &str,
        action: AuditAction,
        actor_id: &str,
        detail: Option<String>,
    ) {
        if !self.enabled {
            return;
        }

        let mut entries = self.entries.write().await;
        entries.push_front(AuditEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.to_string(),
            action,
            actor_id: actor_id.to_string(),
            detail,
            recorded_at: Utc::now(),
        });

        // Prune if over limit
        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    /// Recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// History of one entity, newest first.
    pub async fn for_entity(&self, entity_id: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect()
    }

    /// Entries recorded for an actor.
    pub async fn by_actor(&self, actor_id: &str, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.actor_id == actor_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Get count.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}
