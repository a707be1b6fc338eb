//! Approval state machine for honor results.
//!
//! `pending_approval` moves to `approved` or `rejected` and never leaves
//! either. Every transition is authorized through [`ApproverRouting`] and
//! committed under a compare-and-swap on the result version. Repeating a
//! terminal call with the same approver and outcome succeeds without change.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use honor_rules::HonorQualifier;

use crate::audit::{AuditAction, AuditTrail};
use crate::notify::{EventSnapshot, HonorEventKind, Notifier};
use crate::projection::HonorResultView;
use crate::routing::ApproverRouting;
use crate::store::HonorStore;
use crate::types::{Actor, ApprovalStatus, HonorError, HonorOverride, HonorResult, Result};

/// Approve, reject and override honor results.
pub struct ApprovalWorkflow {
    store: Arc<HonorStore>,
    qualifier: Arc<HonorQualifier>,
    routing: ApproverRouting,
    restrict_overrides_to_catalog: bool,
    notifier: Arc<Notifier>,
    audit: Arc<AuditTrail>,
}

impl ApprovalWorkflow {
    /// Create a workflow.
    pub fn new(
        store: Arc<HonorStore>,
        qualifier: Arc<HonorQualifier>,
        routing: ApproverRouting,
        notifier: Arc<Notifier>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            store,
            qualifier,
            routing,
            restrict_overrides_to_catalog: true,
            notifier,
            audit,
        }
    }

    /// Allow or forbid overrides naming honor types outside the catalog.
    pub fn with_catalog_restriction(mut self, restrict: bool) -> Self {
        self.restrict_overrides_to_catalog = restrict;
        self
    }

    /// Routing table in use.
    pub fn routing(&self) -> &ApproverRouting {
        &self.routing
    }

    /// Approve against the current version.
    pub async fn approve(&self, result_id: &str, actor: &Actor) -> Result<HonorResult> {
        let current = self.store.require(result_id).await?;
        self.approve_version(result_id, actor, current.version).await
    }

    /// Approve a result the approver saw at `expected_version`.
    pub async fn approve_version(
        &self,
        result_id: &str,
        actor: &Actor,
        expected_version: u64,
    ) -> Result<HonorResult> {
        let current = self.store.require(result_id).await?;
        self.routing.authorize(actor, &current.key.level)?;

        match &current.status {
            ApprovalStatus::Approved { approver_id, .. } if approver_id == &actor.id => {
                debug!(result_id = %result_id, approver = %actor.id, "Approval already recorded");
                return Ok(current);
            }
            status if status.is_terminal() => {
                return Err(HonorError::InvalidStateTransition(format!(
                    "honor result {} is already {}",
                    result_id, status
                )));
            }
            _ => {}
        }

        if current.honor_type.is_none() {
            return Err(HonorError::Validation(format!(
                "honor result {} has no honor type to approve",
                result_id
            )));
        }

        let approver_id = actor.id.clone();
        let approved = self
            .store
            .commit_if(result_id, expected_version, |r| {
                ensure_pending(r)?;
                if r.honor_type.is_none() {
                    return Err(HonorError::Validation(format!(
                        "honor result {} has no honor type to approve",
                        r.id
                    )));
                }
                r.status = ApprovalStatus::Approved {
                    approver_id,
                    approved_at: Utc::now(),
                };
                Ok(())
            })
            .await?;

        info!(
            result_id = %approved.id,
            key = %approved.key,
            approver = %actor.id,
            honor_type = approved.honor_type.as_deref().unwrap_or_default(),
            overridden = approved.is_overridden(),
            "Honor result approved"
        );
        self.audit
            .record(
                &approved.id,
                AuditAction::Approved,
                &actor.id,
                approved.honor_type.clone(),
            )
            .await;
        self.notifier
            .announce(
                HonorEventKind::HonorApproved,
                &approved.key.student_id,
                EventSnapshot::HonorResult(HonorResultView::from(&approved)),
            )
            .await;

        Ok(approved)
    }

    /// Reject against the current version.
    pub async fn reject(
        &self,
        result_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> Result<HonorResult> {
        let current = self.store.require(result_id).await?;
        self.reject_version(result_id, actor, reason, current.version).await
    }

    /// Reject a result the approver saw at `expected_version`. The reason is
    /// mandatory.
    pub async fn reject_version(
        &self,
        result_id: &str,
        actor: &Actor,
        reason: &str,
        expected_version: u64,
    ) -> Result<HonorResult> {
        let current = self.store.require(result_id).await?;
        self.routing.authorize(actor, &current.key.level)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(HonorError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        match &current.status {
            ApprovalStatus::Rejected { approver_id, .. } if approver_id == &actor.id => {
                debug!(result_id = %result_id, approver = %actor.id, "Rejection already recorded");
                return Ok(current);
            }
            status if status.is_terminal() => {
                return Err(HonorError::InvalidStateTransition(format!(
                    "honor result {} is already {}",
                    result_id, status
                )));
            }
            _ => {}
        }

        let approver_id = actor.id.clone();
        let stored_reason = reason.to_string();
        let rejected = self
            .store
            .commit_if(result_id, expected_version, |r| {
                ensure_pending(r)?;
                r.status = ApprovalStatus::Rejected {
                    approver_id,
                    rejected_at: Utc::now(),
                    reason: stored_reason,
                };
                Ok(())
            })
            .await?;

        info!(
            result_id = %rejected.id,
            key = %rejected.key,
            approver = %actor.id,
            reason = %reason,
            "Honor result rejected"
        );
        self.audit
            .record(
                &rejected.id,
                AuditAction::Rejected,
                &actor.id,
                Some(reason.to_string()),
            )
            .await;
        self.notifier
            .announce(
                HonorEventKind::HonorRejected,
                &rejected.key.student_id,
                EventSnapshot::HonorResult(HonorResultView::from(&rejected)),
            )
            .await;

        Ok(rejected)
    }

    /// Override against the current version.
    pub async fn override_honor(
        &self,
        result_id: &str,
        actor: &Actor,
        honor_type: &str,
        reason: &str,
    ) -> Result<HonorResult> {
        let current = self.store.require(result_id).await?;
        self.override_version(result_id, actor, honor_type, reason, current.version).await
    }

    /// Replace the computed honor type of a pending result. Leaves the
    /// approval status alone; an explicit decision is still required.
    pub async fn override_version(
        &self,
        result_id: &str,
        actor: &Actor,
        honor_type: &str,
        reason: &str,
        expected_version: u64,
    ) -> Result<HonorResult> {
        let current = self.store.require(result_id).await?;
        self.routing.authorize(actor, &current.key.level)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(HonorError::Validation(
                "an override reason is required".to_string(),
            ));
        }
        let honor_type = self.resolve_honor_type(&current, honor_type)?;

        if let Some(existing) = &current.honor_override {
            if existing.honor_type == honor_type
                && existing.reason == reason
                && existing.overridden_by == actor.id
            {
                debug!(result_id = %result_id, "Override already recorded");
                return Ok(current);
            }
        }
        if current.status.is_terminal() {
            return Err(HonorError::InvalidStateTransition(format!(
                "honor result {} is {}; only pending results can be overridden",
                result_id, current.status
            )));
        }

        let honor_override = HonorOverride {
            honor_type: honor_type.clone(),
            reason: reason.to_string(),
            overridden_by: actor.id.clone(),
            overridden_at: Utc::now(),
        };
        let overridden = self
            .store
            .commit_if(result_id, expected_version, |r| {
                ensure_pending(r)?;
                r.honor_type = Some(honor_override.honor_type.clone());
                r.honor_override = Some(honor_override);
                Ok(())
            })
            .await?;

        info!(
            result_id = %overridden.id,
            key = %overridden.key,
            approver = %actor.id,
            computed = overridden.computed_honor_type.as_deref().unwrap_or("-"),
            honor_type = %honor_type,
            "Honor type overridden"
        );
        self.audit
            .record(
                &overridden.id,
                AuditAction::Overridden,
                &actor.id,
                Some(format!("{}: {}", honor_type, reason)),
            )
            .await;

        Ok(overridden)
    }

    fn resolve_honor_type(&self, result: &HonorResult, requested: &str) -> Result<String> {
        let requested = requested.trim();
        if requested.is_empty() {
            return Err(HonorError::Validation(
                "an override must name a honor type".to_string(),
            ));
        }
        if !self.restrict_overrides_to_catalog {
            return Ok(requested.to_string());
        }

        self.qualifier
            .criteria()
            .find(&result.key.level, requested)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                HonorError::Validation(format!(
                    "'{}' is not a honor type for level {}",
                    requested, result.key.level
                ))
            })
    }
}

fn ensure_pending(result: &HonorResult) -> Result<()> {
    if result.status.is_terminal() {
        return Err(HonorError::InvalidStateTransition(format!(
            "honor result {} is already {}",
            result.id, result.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{StaticDirectory, StudentProfile};
    use crate::notify::RecordingDispatcher;
    use crate::types::ResultKey;
    use honor_rules::{CriteriaSet, Gpa};

    struct Fixture {
        workflow: ApprovalWorkflow,
        store: Arc<HonorStore>,
        dispatcher: Arc<RecordingDispatcher>,
        audit: Arc<AuditTrail>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(HonorStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let directory = Arc::new(StaticDirectory::with_profiles(vec![
            StudentProfile::new("s1", "Ana Cruz", "2024-0001").with_parent("p1"),
        ]));
        let audit = Arc::new(AuditTrail::new());
        let workflow = ApprovalWorkflow::new(
            store.clone(),
            Arc::new(HonorQualifier::new(CriteriaSet::standard())),
            ApproverRouting::default(),
            Arc::new(Notifier::new(dispatcher.clone(), directory)),
            audit.clone(),
        );
        Fixture {
            workflow,
            store,
            dispatcher,
            audit,
        }
    }

    async fn seed(store: &HonorStore, level: &str) -> HonorResult {
        store
            .insert_result(HonorResult::candidate(
                ResultKey::new("s1", level, "2024-2025"),
                Gpa::new(96.0).unwrap(),
                "With High Honors",
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_approve_is_idempotent_for_same_approver() {
        let f = fixture();
        let result = seed(&f.store, "senior_highschool").await;
        let principal = Actor::new("u-1", "principal");

        let first = f.workflow.approve(&result.id, &principal).await.unwrap();
        assert!(first.is_approved());
        let again = f.workflow.approve(&result.id, &principal).await.unwrap();
        assert_eq!(again.version, first.version);

        assert_eq!(
            f.dispatcher
                .events_of(HonorEventKind::HonorApproved)
                .await
                .len(),
            1
        );
        assert_eq!(f.dispatcher.events().await[0].parent_ids, vec!["p1"]);
    }

    #[tokio::test]
    async fn test_approve_then_reject_fails() {
        let f = fixture();
        let result = seed(&f.store, "senior_highschool").await;
        let principal = Actor::new("u-1", "principal");

        f.workflow.approve(&result.id, &principal).await.unwrap();
        let outcome = f
            .workflow
            .reject(&result.id, &principal, "Changed my mind")
            .await;
        assert!(matches!(outcome, Err(HonorError::InvalidStateTransition(_))));
        assert!(f.store.get_by_id(&result.id).await.unwrap().is_approved());
    }

    #[tokio::test]
    async fn test_second_approver_cannot_reapprove() {
        let f = fixture();
        let result = seed(&f.store, "elementary").await;

        f.workflow
            .approve(&result.id, &Actor::new("u-1", "principal"))
            .await
            .unwrap();
        let outcome = f
            .workflow
            .approve(&result.id, &Actor::new("u-2", "principal"))
            .await;
        assert!(matches!(outcome, Err(HonorError::InvalidStateTransition(_))));
    }

    #[tokio::test]
    async fn test_role_gating_leaves_state_unchanged() {
        let f = fixture();
        let college = seed(&f.store, "college").await;

        let outcome = f
            .workflow
            .approve(&college.id, &Actor::new("u-1", "principal"))
            .await;
        assert!(matches!(outcome, Err(HonorError::Authorization { .. })));

        let stored = f.store.get_by_id(&college.id).await.unwrap();
        assert!(stored.is_pending());
        assert_eq!(stored.version, college.version);
        assert!(f.dispatcher.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let f = fixture();
        let result = seed(&f.store, "junior_highschool").await;
        let principal = Actor::new("u-1", "principal");

        assert!(matches!(
            f.workflow.reject(&result.id, &principal, "   ").await,
            Err(HonorError::Validation(_))
        ));

        let rejected = f
            .workflow
            .reject(&result.id, &principal, "Disciplinary case pending")
            .await
            .unwrap();
        assert_eq!(rejected.rejection_reason(), Some("Disciplinary case pending"));
        assert_eq!(
            f.dispatcher
                .events_of(HonorEventKind::HonorRejected)
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_override_keeps_status_and_marks_result() {
        let f = fixture();
        let result = seed(&f.store, "senior_highschool").await;
        let principal = Actor::new("u-1", "principal");

        let overridden = f
            .workflow
            .override_honor(
                &result.id,
                &principal,
                "with highest honors",
                "Late grade correction from registrar",
            )
            .await
            .unwrap();
        assert!(overridden.is_pending());
        assert!(overridden.is_overridden());
        assert_eq!(overridden.honor_type.as_deref(), Some("With Highest Honors"));
        assert_eq!(overridden.computed_honor_type.as_deref(), Some("With High Honors"));
        assert_eq!(f.audit.for_entity(&result.id).await[0].action, AuditAction::Overridden);
    }

    #[tokio::test]
    async fn test_reject_retry_by_same_approver_is_noop() {
        let f = fixture();
        let result = seed(&f.store, "elementary").await;
        let principal = Actor::new("u-1", "principal");

        let first = f
            .workflow
            .reject(&result.id, &principal, "Incomplete clearance")
            .await
            .unwrap();
        let again = f
            .workflow
            .reject(&result.id, &principal, "Incomplete clearance")
            .await
            .unwrap();
        assert_eq!(again.version, first.version);
        assert_eq!(again.rejection_reason(), Some("Incomplete clearance"));
        assert_eq!(
            f.dispatcher
                .events_of(HonorEventKind::HonorRejected)
                .await
                .len(),
            1
        );

        let other = f
            .workflow
            .reject(&result.id, &Actor::new("u-2", "principal"), "Second opinion")
            .await;
        assert!(matches!(other, Err(HonorError::InvalidStateTransition(_))));
    }

    #[tokio::test]
    async fn test_override_requires_pending() {
        let f = fixture();
        let principal = Actor::new("u-1", "principal");

        let approved = seed(&f.store, "senior_highschool").await;
        f.workflow.approve(&approved.id, &principal).await.unwrap();
        let outcome = f
            .workflow
            .override_honor(&approved.id, &principal, "With Honors", "Registrar correction")
            .await;
        assert!(matches!(outcome, Err(HonorError::InvalidStateTransition(_))));

        let rejected = seed(&f.store, "junior_highschool").await;
        f.workflow
            .reject(&rejected.id, &principal, "Failed conduct review")
            .await
            .unwrap();
        let outcome = f
            .workflow
            .override_honor(&rejected.id, &principal, "With Honors", "Appeal granted")
            .await;
        assert!(matches!(outcome, Err(HonorError::InvalidStateTransition(_))));

        let stored = f.store.get_by_id(&approved.id).await.unwrap();
        assert!(!stored.is_overridden());
        assert_eq!(stored.honor_type.as_deref(), Some("With High Honors"));
    }

    #[tokio::test]
    async fn test_override_requires_reason() {
        let f = fixture();
        let result = seed(&f.store, "senior_highschool").await;

        let outcome = f
            .workflow
            .override_honor(&result.id, &Actor::new("u-1", "principal"), "With Honors", "  ")
            .await;
        assert!(matches!(outcome, Err(HonorError::Validation(_))));

        let stored = f.store.get_by_id(&result.id).await.unwrap();
        assert!(!stored.is_overridden());
        assert_eq!(stored.version, result.version);
    }

    #[tokio::test]
    async fn test_override_outside_catalog_rejected() {
        let f = fixture();
        let result = seed(&f.store, "senior_highschool").await;
        let outcome = f
            .workflow
            .override_honor(
                &result.id,
                &Actor::new("u-1", "principal"),
                "Summa Cum Laude",
                "Wrong level",
            )
            .await;
        assert!(matches!(outcome, Err(HonorError::Validation(_))));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let f = fixture();
        let result = seed(&f.store, "senior_highschool").await;
        let principal = Actor::new("u-1", "principal");

        f.workflow
            .override_honor(&result.id, &principal, "With Honors", "Attendance review")
            .await
            .unwrap();

        let outcome = f
            .workflow
            .approve_version(&result.id, &principal, result.version)
            .await;
        assert!(matches!(outcome, Err(HonorError::Conflict { .. })));
        assert!(f.store.get_by_id(&result.id).await.unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_roll_back() {
        let f = fixture();
        f.dispatcher.set_failing(true);
        let result = seed(&f.store, "elementary").await;

        let approved = f
            .workflow
            .approve(&result.id, &Actor::new("u-1", "principal"))
            .await
            .unwrap();
        assert!(approved.is_approved());
        assert_eq!(f.dispatcher.attempts(), 1);
    }
}
