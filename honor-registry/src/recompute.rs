//! Batch recomputation of honor candidates for one scope.
//!
//! A run aggregates every student's grades in an [`AcademicPeriod`], evaluates
//! them against the catalog and upserts pending candidates. Runs for the same
//! (level, school year) are serialized by the store's scope lock; runs for
//! different scopes proceed in parallel.
//!
//! Rows already approved or rejected, and rows frozen by a certificate, are
//! never touched. Overridden rows keep their honor type; only the GPA is
//! refreshed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use honor_rules::{AcademicPeriod, Gpa, GradeProfile, HonorQualifier, Qualification};

use crate::audit::{AuditAction, AuditTrail, SYSTEM_ACTOR};
use crate::grades::GradeSource;
use crate::store::HonorStore;
use crate::types::{HonorError, HonorResult, Result, ResultKey, ScopeKey};

/// Attempts per student when an approver commits between read and write.
const MAX_ATTEMPTS: usize = 3;

/// What a run does with one student.
#[derive(Debug, Clone, PartialEq)]
pub enum RecomputeAction {
    /// Insert a new pending candidate
    Create { gpa: Gpa, honor_type: String },
    /// Update GPA and computed honor type of a pending candidate
    Refresh { gpa: Gpa, honor_type: String },
    /// Update GPA of an overridden candidate, keeping the override
    PreserveOverride {
        gpa: Option<Gpa>,
        computed_honor_type: Option<String>,
    },
    /// Remove a pending candidate that no longer qualifies
    Retract,
    /// Approved, rejected or frozen row
    SkipTerminal,
    /// Nothing changed
    Unchanged,
    /// No candidate before or after
    NoCandidate,
}

/// Decide what to do with one student given the stored row and a fresh
/// qualification.
pub fn plan(existing: Option<&HonorResult>, qualification: &Qualification) -> RecomputeAction {
    let Some(existing) = existing else {
        return match qualification {
            Qualification::Qualified {
                gpa, honor_type, ..
            } => RecomputeAction::Create {
                gpa: *gpa,
                honor_type: honor_type.clone(),
            },
            _ => RecomputeAction::NoCandidate,
        };
    };

    if existing.status.is_terminal() || existing.is_frozen() {
        return RecomputeAction::SkipTerminal;
    }

    let computed = qualification.honor_type().map(str::to_string);

    if existing.is_overridden() {
        let gpa = qualification.gpa();
        let gpa_changed = gpa.is_some_and(|g| g != existing.gpa);
        if gpa_changed || computed != existing.computed_honor_type {
            return RecomputeAction::PreserveOverride {
                gpa,
                computed_honor_type: computed,
            };
        }
        return RecomputeAction::Unchanged;
    }

    match qualification {
        Qualification::Qualified {
            gpa, honor_type, ..
        } => {
            if *gpa == existing.gpa && existing.honor_type.as_deref() == Some(honor_type.as_str()) {
                RecomputeAction::Unchanged
            } else {
                RecomputeAction::Refresh {
                    gpa: *gpa,
                    honor_type: honor_type.clone(),
                }
            }
        }
        Qualification::NotQualified { .. } | Qualification::Undefined => RecomputeAction::Retract,
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecomputeReport {
    /// Scope recomputed
    pub scope: ScopeKey,
    /// Grading period, when the run was restricted to one
    pub grading_period: Option<String>,
    /// Students evaluated
    pub evaluated: usize,
    /// New candidates
    pub created: usize,
    /// Candidates whose GPA or honor type moved
    pub refreshed: usize,
    /// Candidates left as they were
    pub unchanged: usize,
    /// Candidates removed because they no longer qualify
    pub retracted: usize,
    /// Overridden candidates whose override was kept
    pub preserved_overrides: usize,
    /// Approved, rejected or frozen rows left alone
    pub skipped_terminal: usize,
    /// Students without a single valid grade
    pub undefined: usize,
}

impl RecomputeReport {
    fn new(period: &AcademicPeriod) -> Self {
        Self {
            scope: ScopeKey::from(period),
            grading_period: period.grading_period.clone(),
            evaluated: 0,
            created: 0,
            refreshed: 0,
            unchanged: 0,
            retracted: 0,
            preserved_overrides: 0,
            skipped_terminal: 0,
            undefined: 0,
        }
    }

    /// Whether the run wrote anything.
    pub fn has_changes(&self) -> bool {
        self.created + self.refreshed + self.retracted + self.preserved_overrides > 0
    }
}

impl fmt::Display for RecomputeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: evaluated={} created={} refreshed={} unchanged={} retracted={} preserved_overrides={} skipped_terminal={} undefined={}",
            self.scope,
            self.evaluated,
            self.created,
            self.refreshed,
            self.unchanged,
            self.retracted,
            self.preserved_overrides,
            self.skipped_terminal,
            self.undefined
        )
    }
}

/// Recomputation batch job.
pub struct RecomputeJob {
    store: Arc<HonorStore>,
    grades: Arc<dyn GradeSource>,
    qualifier: Arc<HonorQualifier>,
    audit: Arc<AuditTrail>,
}

impl RecomputeJob {
    /// Create a job.
    pub fn new(
        store: Arc<HonorStore>,
        grades: Arc<dyn GradeSource>,
        qualifier: Arc<HonorQualifier>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            store,
            grades,
            qualifier,
            audit,
        }
    }

    /// Recompute every student in `period`.
    pub async fn run(&self, period: &AcademicPeriod) -> Result<RecomputeReport> {
        let policy = self.qualifier.policy(&period.level);
        if period.grading_period.is_some() && !policy.subdivided {
            return Err(HonorError::Validation(format!(
                "level {} is not divided into grading periods",
                period.level
            )));
        }

        let scope = ScopeKey::from(period);
        let _guard = self.store.lock_scope(&scope).await;
        info!(scope = %scope, period = %period, "Recomputing honors");

        let mut students: BTreeSet<String> =
            self.grades.students(period).await?.into_iter().collect();
        students.extend(
            self.store
                .list_scope(&scope)
                .await
                .into_iter()
                .map(|r| r.key.student_id),
        );

        let mut report = RecomputeReport::new(period);
        for student_id in students {
            let records = self.grades.grades(&student_id, period).await?;
            let profile = GradeProfile::from_records(&records, period);
            let qualification = self.qualifier.evaluate(&period.level, &profile);

            report.evaluated += 1;
            if matches!(qualification, Qualification::Undefined) {
                report.undefined += 1;
            }

            let key = ResultKey::new(student_id, period.level.clone(), period.school_year.clone());
            self.apply(&key, &qualification, &mut report).await?;
        }

        info!(
            scope = %scope,
            evaluated = report.evaluated,
            created = report.created,
            refreshed = report.refreshed,
            retracted = report.retracted,
            preserved_overrides = report.preserved_overrides,
            skipped_terminal = report.skipped_terminal,
            "Recomputation complete"
        );
        Ok(report)
    }

    async fn apply(
        &self,
        key: &ResultKey,
        qualification: &Qualification,
        report: &mut RecomputeReport,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let existing = self.store.get(key).await;
            let action = plan(existing.as_ref(), qualification);
            debug!(key = %key, action = ?action, "Planned recomputation");

            match self.commit(key, existing, action, report).await {
                Err(HonorError::Conflict { .. }) if attempt < MAX_ATTEMPTS => {
                    debug!(key = %key, attempt, "Result changed during recomputation, retrying");
                }
                outcome => return outcome,
            }
        }
    }

    async fn commit(
        &self,
        key: &ResultKey,
        existing: Option<HonorResult>,
        action: RecomputeAction,
        report: &mut RecomputeReport,
    ) -> Result<()> {
        match (action, existing) {
            (RecomputeAction::Create { gpa, honor_type }, _) => {
                let result = self
                    .store
                    .insert_result(HonorResult::candidate(key.clone(), gpa, honor_type.clone()))
                    .await?;
                self.audit
                    .record(
                        &result.id,
                        AuditAction::CandidateCreated,
                        SYSTEM_ACTOR,
                        Some(honor_type),
                    )
                    .await;
                report.created += 1;
            }
            (RecomputeAction::Refresh { gpa, honor_type }, Some(existing)) => {
                let detail = format!("{} @ {}", honor_type, gpa.display());
                self.store
                    .commit_if(&existing.id, existing.version, |r| {
                        r.gpa = gpa;
                        r.computed_honor_type = Some(honor_type.clone());
                        r.honor_type = Some(honor_type);
                        Ok(())
                    })
                    .await?;
                self.audit
                    .record(
                        &existing.id,
                        AuditAction::CandidateRefreshed,
                        SYSTEM_ACTOR,
                        Some(detail),
                    )
                    .await;
                report.refreshed += 1;
            }
            (
                RecomputeAction::PreserveOverride {
                    gpa,
                    computed_honor_type,
                },
                Some(existing),
            ) => {
                self.store
                    .commit_if(&existing.id, existing.version, |r| {
                        if let Some(gpa) = gpa {
                            r.gpa = gpa;
                        }
                        r.computed_honor_type = computed_honor_type;
                        Ok(())
                    })
                    .await?;
                self.audit
                    .record(
                        &existing.id,
                        AuditAction::CandidateRefreshed,
                        SYSTEM_ACTOR,
                        Some("override preserved".to_string()),
                    )
                    .await;
                report.preserved_overrides += 1;
            }
            (RecomputeAction::Retract, Some(existing)) => {
                self.store.remove_if(&existing.id, existing.version).await?;
                warn!(
                    result_id = %existing.id,
                    key = %key,
                    "Retracted candidate that no longer qualifies"
                );
                self.audit
                    .record(&existing.id, AuditAction::CandidateRetracted, SYSTEM_ACTOR, None)
                    .await;
                report.retracted += 1;
            }
            (RecomputeAction::SkipTerminal, _) => report.skipped_terminal += 1,
            (RecomputeAction::Unchanged, Some(existing)) => {
                if existing.is_overridden() {
                    report.preserved_overrides += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            (RecomputeAction::Unchanged, None) | (RecomputeAction::NoCandidate, _) => {}
            (action, None) => {
                return Err(HonorError::NotFound(format!(
                    "honor result for {} disappeared before {:?}",
                    key, action
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grades::{GradeSourceError, InMemoryGradeBook};
    use async_trait::async_trait;
    use crate::types::{ApprovalStatus, HonorOverride};
    use chrono::Utc;
    use honor_rules::{CriteriaSet, GradeRecord, HonorTypeCriterion};

    const LEVEL: &str = "senior_highschool";
    const YEAR: &str = "2024-2025";

    fn qualifier() -> Arc<HonorQualifier> {
        let criteria = CriteriaSet::new(vec![
            HonorTypeCriterion::new("Valedictorian", 1, 98.0),
            HonorTypeCriterion::new("With Highest Honors", 2, 90.0),
        ])
        .unwrap();
        Arc::new(HonorQualifier::new(criteria))
    }

    fn record(student: &str, subject: &str, grade: Option<f64>) -> GradeRecord {
        GradeRecord::new(student, subject, LEVEL, YEAR, grade)
    }

    fn job(book: Arc<InMemoryGradeBook>) -> (RecomputeJob, Arc<HonorStore>) {
        let store = Arc::new(HonorStore::new());
        let job = RecomputeJob::new(store.clone(), book, qualifier(), Arc::new(AuditTrail::new()));
        (job, store)
    }

    fn pending(gpa: f64, honor: &str) -> HonorResult {
        HonorResult::candidate(ResultKey::new("s1", LEVEL, YEAR), Gpa::new(gpa).unwrap(), honor)
    }

    #[test]
    fn test_plan_new_candidate() {
        let q = Qualification::Qualified {
            gpa: Gpa::new(95.0).unwrap(),
            honor_type: "With Highest Honors".to_string(),
            rank: 2,
        };
        assert!(matches!(plan(None, &q), RecomputeAction::Create { .. }));
        assert_eq!(plan(None, &Qualification::Undefined), RecomputeAction::NoCandidate);
    }

    #[test]
    fn test_plan_never_touches_terminal() {
        let mut r = pending(95.0, "With Highest Honors");
        r.status = ApprovalStatus::Approved {
            approver_id: "u-1".to_string(),
            approved_at: Utc::now(),
        };
        assert_eq!(plan(Some(&r), &Qualification::Undefined), RecomputeAction::SkipTerminal);
    }

    #[test]
    fn test_plan_keeps_override() {
        let mut r = pending(95.0, "With Highest Honors");
        r.honor_type = Some("Valedictorian".to_string());
        r.honor_override = Some(HonorOverride {
            honor_type: "Valedictorian".to_string(),
            reason: "Tie resolved by committee".to_string(),
            overridden_by: "u-1".to_string(),
            overridden_at: Utc::now(),
        });

        let lowered = Qualification::NotQualified {
            gpa: Gpa::new(85.0).unwrap(),
        };
        match plan(Some(&r), &lowered) {
            RecomputeAction::PreserveOverride {
                gpa,
                computed_honor_type,
            } => {
                assert_eq!(gpa.map(|g| g.value()), Some(85.0));
                assert!(computed_honor_type.is_none());
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_plan_retracts_pending() {
        let r = pending(95.0, "With Highest Honors");
        let lowered = Qualification::NotQualified {
            gpa: Gpa::new(85.0).unwrap(),
        };
        assert_eq!(plan(Some(&r), &lowered), RecomputeAction::Retract);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let book = Arc::new(InMemoryGradeBook::with_records(vec![
            record("s1", "Math", Some(94.0)),
            record("s1", "Science", Some(96.0)),
            record("s1", "PE", None),
            record("s2", "Math", Some(80.0)),
        ]));
        let (job, store) = job(book);
        let period = AcademicPeriod::new(LEVEL, YEAR);

        let first = job.run(&period).await.unwrap();
        assert_eq!(first.evaluated, 2);
        assert_eq!(first.created, 1);
        let before = store.get(&ResultKey::new("s1", LEVEL, YEAR)).await.unwrap();
        assert_eq!(before.gpa.value(), 95.0);
        assert_eq!(before.honor_type.as_deref(), Some("With Highest Honors"));

        let second = job.run(&period).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.unchanged, 1);
        assert!(!second.has_changes());

        let after = store.get(&ResultKey::new("s1", LEVEL, YEAR)).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(store.result_count().await, 1);
    }

    #[tokio::test]
    async fn test_regrade_below_threshold_retracts() {
        let book = Arc::new(InMemoryGradeBook::with_records(vec![record(
            "s1",
            "Math",
            Some(92.0),
        )]));
        let (job, store) = job(book.clone());
        let period = AcademicPeriod::new(LEVEL, YEAR);

        job.run(&period).await.unwrap();
        assert_eq!(store.result_count().await, 1);

        book.regrade("s1", "Math", &period, Some(70.0)).await;
        let report = job.run(&period).await.unwrap();
        assert_eq!(report.retracted, 1);
        assert_eq!(store.result_count().await, 0);
    }

    #[tokio::test]
    async fn test_all_missing_grades_is_undefined() {
        let book = Arc::new(InMemoryGradeBook::with_records(vec![
            record("s1", "Math", None),
            record("s1", "Science", None),
        ]));
        let (job, store) = job(book);
        let report = job.run(&AcademicPeriod::new(LEVEL, YEAR)).await.unwrap();
        assert_eq!(report.undefined, 1);
        assert_eq!(report.created, 0);
        assert_eq!(store.result_count().await, 0);
    }

    #[tokio::test]
    async fn test_grading_period_requires_subdivided_level() {
        let book = Arc::new(InMemoryGradeBook::new());
        let (job, _) = job(book);
        let period = AcademicPeriod::new(LEVEL, YEAR).with_grading_period("Q1");
        assert!(matches!(job.run(&period).await, Err(HonorError::Validation(_))));
    }

    struct OfflineGrades;

    #[async_trait]
    impl GradeSource for OfflineGrades {
        async fn students(
            &self,
            _period: &AcademicPeriod,
        ) -> std::result::Result<Vec<String>, GradeSourceError> {
            Err(GradeSourceError::Unavailable("registrar offline".to_string()))
        }

        async fn grades(
            &self,
            _student_id: &str,
            _period: &AcademicPeriod,
        ) -> std::result::Result<Vec<GradeRecord>, GradeSourceError> {
            Err(GradeSourceError::Unavailable("registrar offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_grade_source_failure_surfaces() {
        let store = Arc::new(HonorStore::new());
        let job = RecomputeJob::new(
            store.clone(),
            Arc::new(OfflineGrades),
            qualifier(),
            Arc::new(AuditTrail::new()),
        );

        let outcome = job.run(&AcademicPeriod::new(LEVEL, YEAR)).await;
        assert!(matches!(outcome, Err(HonorError::GradeSource(_))));
        assert_eq!(store.result_count().await, 0);
    }
}
