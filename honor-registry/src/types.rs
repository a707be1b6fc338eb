//! Core types for honor results and certificates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use honor_rules::{AcademicLevel, AcademicPeriod, Gpa, RulesError};

use crate::directory::DirectoryError;
use crate::grades::GradeSourceError;

/// Uniqueness key of a honor result and of its certificate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultKey {
    /// Student ID
    pub student_id: String,
    /// Academic level
    pub level: AcademicLevel,
    /// School year
    pub school_year: String,
}

impl ResultKey {
    /// Create a key.
    pub fn new(
        student_id: impl Into<String>,
        level: impl Into<AcademicLevel>,
        school_year: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            level: level.into(),
            school_year: school_year.into(),
        }
    }

    /// The recomputation scope this key belongs to.
    pub fn scope(&self) -> ScopeKey {
        ScopeKey {
            level: self.level.clone(),
            school_year: self.school_year.clone(),
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.student_id, self.level, self.school_year)
    }
}

/// A recomputation scope: one level in one school year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey {
    /// Academic level
    pub level: AcademicLevel,
    /// School year
    pub school_year: String,
}

impl ScopeKey {
    /// Create a scope.
    pub fn new(level: impl Into<AcademicLevel>, school_year: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            school_year: school_year.into(),
        }
    }

    /// Whether a result key falls in this scope.
    pub fn contains(&self, key: &ResultKey) -> bool {
        key.level == self.level && key.school_year == self.school_year
    }
}

impl From<&AcademicPeriod> for ScopeKey {
    fn from(period: &AcademicPeriod) -> Self {
        Self::new(period.level.clone(), period.school_year.clone())
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.level, self.school_year)
    }
}

/// Approval status of a honor result. Exactly one state at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a decision (initial)
    PendingApproval,
    /// Approved (terminal)
    Approved {
        approver_id: String,
        approved_at: DateTime<Utc>,
    },
    /// Rejected with a reason (terminal)
    Rejected {
        approver_id: String,
        rejected_at: DateTime<Utc>,
        reason: String,
    },
}

impl ApprovalStatus {
    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::PendingApproval)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::PendingApproval => "pending_approval",
            ApprovalStatus::Approved { .. } => "approved",
            ApprovalStatus::Rejected { .. } => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A human correction of the computed honor type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HonorOverride {
    /// Honor type assigned by the approver
    pub honor_type: String,
    /// Mandatory justification
    pub reason: String,
    /// Who overrode
    pub overridden_by: String,
    /// When
    pub overridden_at: DateTime<Utc>,
}

/// Per-student, per-period honor determination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HonorResult {
    /// Unique result ID
    pub id: String,
    /// Student, level and school year
    pub key: ResultKey,
    /// Latest computed GPA
    pub gpa: Gpa,
    /// Honor type the rules computed on the latest run
    pub computed_honor_type: Option<String>,
    /// Awarded honor type (the override when present)
    pub honor_type: Option<String>,
    /// Manual override, orthogonal to approval status
    pub honor_override: Option<HonorOverride>,
    /// Approval status
    pub status: ApprovalStatus,
    /// Serial of the certificate issued against this result; freezes the result
    pub certificate_serial: Option<String>,
    /// Bumped on every committed change
    pub version: u64,
    /// When the candidate was created
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl HonorResult {
    /// Create a pending candidate from a computed qualification.
    pub fn candidate(key: ResultKey, gpa: Gpa, honor_type: impl Into<String>) -> Self {
        let honor_type = honor_type.into();
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key,
            gpa,
            computed_honor_type: Some(honor_type.clone()),
            honor_type: Some(honor_type),
            honor_override: None,
            status: ApprovalStatus::PendingApproval,
            certificate_serial: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether an approver replaced the computed honor type.
    pub fn is_overridden(&self) -> bool {
        self.honor_override.is_some()
    }

    /// Reason given for the override.
    pub fn override_reason(&self) -> Option<&str> {
        self.honor_override.as_ref().map(|o| o.reason.as_str())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ApprovalStatus::PendingApproval)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self.status, ApprovalStatus::Approved { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, ApprovalStatus::Rejected { .. })
    }

    /// Rejection reason, if rejected.
    pub fn rejection_reason(&self) -> Option<&str> {
        match &self.status {
            ApprovalStatus::Rejected { reason, .. } => Some(reason.as_str()),
            _ => None,
        }
    }

    /// Whether a certificate has been issued against this result.
    pub fn is_frozen(&self) -> bool {
        self.certificate_serial.is_some()
    }

    /// Record a committed change.
    pub(crate) fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// Certificate lifecycle stage, ordered by progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    /// Created by the issuer
    Generated = 1,
    /// Downloaded by the student, parent or registrar
    Downloaded = 2,
    /// Printed
    Printed = 3,
}

impl CertificateStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Generated => "generated",
            CertificateStatus::Downloaded => "downloaded",
            CertificateStatus::Printed => "printed",
        }
    }
}

/// Lifecycle timestamps of a certificate.
///
/// Status is the furthest stage reached. Timestamps are set at most once and
/// never precede the stage before them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateLifecycle {
    /// Creation time
    pub generated_at: DateTime<Utc>,
    /// First download
    pub downloaded_at: Option<DateTime<Utc>>,
    /// First print
    pub printed_at: Option<DateTime<Utc>>,
}

impl CertificateLifecycle {
    /// A freshly generated certificate.
    pub fn generated(at: DateTime<Utc>) -> Self {
        Self {
            generated_at: at,
            downloaded_at: None,
            printed_at: None,
        }
    }

    /// Furthest stage reached.
    pub fn status(&self) -> CertificateStatus {
        if self.printed_at.is_some() {
            CertificateStatus::Printed
        } else if self.downloaded_at.is_some() {
            CertificateStatus::Downloaded
        } else {
            CertificateStatus::Generated
        }
    }

    /// Record a download. Returns whether anything changed.
    pub fn mark_downloaded(&mut self, at: DateTime<Utc>) -> Result<bool> {
        match self.status() {
            CertificateStatus::Generated => {
                self.downloaded_at = Some(at.max(self.generated_at));
                Ok(true)
            }
            CertificateStatus::Downloaded => Ok(false),
            CertificateStatus::Printed => Err(HonorError::InvalidStateTransition(
                "certificate already printed; download cannot follow print".to_string(),
            )),
        }
    }

    /// Record a print. Returns whether anything changed.
    pub fn mark_printed(&mut self, at: DateTime<Utc>, require_download: bool) -> Result<bool> {
        match self.status() {
            CertificateStatus::Printed => Ok(false),
            CertificateStatus::Generated if require_download => {
                Err(HonorError::InvalidStateTransition(
                    "certificate must be downloaded before it is printed".to_string(),
                ))
            }
            CertificateStatus::Generated | CertificateStatus::Downloaded => {
                let floor = self.downloaded_at.unwrap_or(self.generated_at);
                self.printed_at = Some(at.max(floor));
                Ok(true)
            }
        }
    }
}

/// An issued certificate, bound to exactly one approved honor result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    /// Unique certificate ID
    pub id: String,
    /// Bound honor result
    pub result_id: String,
    /// Student, level and school year
    pub key: ResultKey,
    /// Template bound at issuance
    pub template_name: String,
    /// Globally unique serial number
    pub serial_number: String,
    /// Facts snapshotted at issuance
    pub payload: BTreeMap<String, String>,
    /// Lifecycle timestamps
    pub lifecycle: CertificateLifecycle,
}

impl Certificate {
    /// Current lifecycle status.
    pub fn status(&self) -> CertificateStatus {
        self.lifecycle.status()
    }
}

/// The actor attempting an operation, as reported by the identity subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User ID
    pub id: String,
    /// Role string (e.g. "principal", "chairperson")
    pub role: String,
}

impl Actor {
    /// Create an actor.
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }
}

/// Error types for the honors registry.
#[derive(Debug, thiserror::Error)]
pub enum HonorError {
    /// Missing or malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Actor lacks the role required for the level
    #[error("Authorization error: role '{role}' cannot decide {level} results (requires {required})")]
    Authorization {
        role: String,
        level: AcademicLevel,
        required: String,
    },

    /// Transition not allowed from the current state
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Compare-and-swap lost against a concurrent writer
    #[error("Conflict on {result_id}: expected version {expected}, found {actual}")]
    Conflict {
        result_id: String,
        expected: u64,
        actual: u64,
    },

    /// Duplicate certificate or serial collision
    #[error("Uniqueness violation: {0}")]
    UniquenessViolation(String),

    /// Unknown student, result or certificate
    #[error("Not found: {0}")]
    NotFound(String),

    /// Grading subsystem failure
    #[error("Grade source error: {0}")]
    GradeSource(#[from] GradeSourceError),

    /// Student directory failure
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Certificate template failure
    #[error("Template error: {0}")]
    Template(String),

    /// Criteria catalog error
    #[error("Rules error: {0}")]
    Rules(#[from] RulesError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, HonorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_is_single_valued() {
        let mut result = HonorResult::candidate(
            ResultKey::new("s1", "elementary", "2024-2025"),
            Gpa::new(95.0).unwrap(),
            "With High Honors",
        );
        assert!(result.is_pending() && !result.is_approved() && !result.is_rejected());

        result.status = ApprovalStatus::Rejected {
            approver_id: "p1".to_string(),
            rejected_at: Utc::now(),
            reason: "Incomplete requirements".to_string(),
        };
        assert!(!result.is_pending() && !result.is_approved() && result.is_rejected());
        assert_eq!(result.rejection_reason(), Some("Incomplete requirements"));
        assert!(result.status.is_terminal());
    }

    #[test]
    fn test_lifecycle_is_monotonic() {
        let t0 = Utc::now();
        let mut lifecycle = CertificateLifecycle::generated(t0);
        assert_eq!(lifecycle.status(), CertificateStatus::Generated);

        // A skewed clock cannot place the download before generation
        assert!(lifecycle.mark_downloaded(t0 - Duration::seconds(30)).unwrap());
        assert_eq!(lifecycle.downloaded_at, Some(t0));
        assert!(!lifecycle.mark_downloaded(t0 + Duration::seconds(5)).unwrap());
        assert_eq!(lifecycle.downloaded_at, Some(t0));

        assert!(lifecycle.mark_printed(t0 + Duration::seconds(10), true).unwrap());
        assert_eq!(lifecycle.status(), CertificateStatus::Printed);
        assert!(!lifecycle.mark_printed(t0 + Duration::seconds(20), true).unwrap());
        assert_eq!(lifecycle.printed_at, Some(t0 + Duration::seconds(10)));

        assert!(matches!(
            lifecycle.mark_downloaded(t0 + Duration::seconds(30)),
            Err(HonorError::InvalidStateTransition(_))
        ));
        assert!(lifecycle.downloaded_at.is_some());
    }

    #[test]
    fn test_print_requires_download_when_configured() {
        let t0 = Utc::now();
        let mut strict = CertificateLifecycle::generated(t0);
        assert!(strict.mark_printed(t0, true).is_err());
        assert!(strict.printed_at.is_none());

        let mut relaxed = CertificateLifecycle::generated(t0);
        assert!(relaxed.mark_printed(t0, false).unwrap());
        assert_eq!(relaxed.status(), CertificateStatus::Printed);
        assert!(relaxed.downloaded_at.is_none());
    }

    #[test]
    fn test_status_order() {
        assert!(CertificateStatus::Generated < CertificateStatus::Downloaded);
        assert!(CertificateStatus::Downloaded < CertificateStatus::Printed);
    }
}
