//! Read-only projections for reporting, exports and listing views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use honor_rules::AcademicLevel;

use crate::types::{Certificate, CertificateStatus, HonorResult, ScopeKey};

/// Export view of a honor result.
///
/// Overridden results always carry the override flag and reason, so a reader
/// cannot mistake them for rule-computed determinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HonorResultView {
    /// Result ID
    pub result_id: String,
    /// Student ID
    pub student_id: String,
    /// Awarded honor type
    pub honor_type: Option<String>,
    /// Academic level
    pub academic_level: AcademicLevel,
    /// School year
    pub school_year: String,
    /// GPA
    pub gpa: f64,
    /// Whether the honor type was set by an approver
    pub is_overridden: bool,
    /// Override justification
    pub override_reason: Option<String>,
    /// Approval status
    pub status: String,
    /// Rejection reason, when rejected
    pub rejection_reason: Option<String>,
}

impl From<&HonorResult> for HonorResultView {
    fn from(result: &HonorResult) -> Self {
        Self {
            result_id: result.id.clone(),
            student_id: result.key.student_id.clone(),
            honor_type: result.honor_type.clone(),
            academic_level: result.key.level.clone(),
            school_year: result.key.school_year.clone(),
            gpa: result.gpa.value(),
            is_overridden: result.is_overridden(),
            override_reason: result.override_reason().map(str::to_string),
            status: result.status.as_str().to_string(),
            rejection_reason: result.rejection_reason().map(str::to_string),
        }
    }
}

impl HonorResultView {
    /// Honor type label for listings, marking overrides.
    pub fn display_honor(&self) -> String {
        match (&self.honor_type, &self.override_reason) {
            (Some(honor), Some(reason)) if self.is_overridden => {
                format!("{} (overridden: {})", honor, reason)
            }
            (Some(honor), _) => honor.clone(),
            (None, _) => "-".to_string(),
        }
    }
}

/// Export view of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateView {
    /// Student ID
    pub student_id: String,
    /// Template name
    pub template_name: String,
    /// Serial number
    pub serial_number: String,
    /// Academic level
    pub academic_level: AcademicLevel,
    /// School year
    pub school_year: String,
    /// Lifecycle status
    pub status: CertificateStatus,
    /// Generation time
    pub generated_at: DateTime<Utc>,
    /// First download
    pub downloaded_at: Option<DateTime<Utc>>,
    /// First print
    pub printed_at: Option<DateTime<Utc>>,
}

impl From<&Certificate> for CertificateView {
    fn from(certificate: &Certificate) -> Self {
        Self {
            student_id: certificate.key.student_id.clone(),
            template_name: certificate.template_name.clone(),
            serial_number: certificate.serial_number.clone(),
            academic_level: certificate.key.level.clone(),
            school_year: certificate.key.school_year.clone(),
            status: certificate.status(),
            generated_at: certificate.lifecycle.generated_at,
            downloaded_at: certificate.lifecycle.downloaded_at,
            printed_at: certificate.lifecycle.printed_at,
        }
    }
}

/// Counts for one recomputation scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HonorStats {
    /// Scope the counts cover
    pub scope: Option<ScopeKey>,
    /// Results awaiting a decision
    pub pending: usize,
    /// Approved results
    pub approved: usize,
    /// Rejected results
    pub rejected: usize,
    /// Results carrying an override
    pub overridden: usize,
    /// Certificates still at generated
    pub certificates_generated: usize,
    /// Certificates downloaded but not printed
    pub certificates_downloaded: usize,
    /// Printed certificates
    pub certificates_printed: usize,
}

impl HonorStats {
    /// Tally results and certificates of a scope.
    pub fn tally<'a>(
        scope: &ScopeKey,
        results: impl IntoIterator<Item = &'a HonorResult>,
        certificates: impl IntoIterator<Item = &'a Certificate>,
    ) -> Self {
        let mut stats = Self {
            scope: Some(scope.clone()),
            ..Default::default()
        };

        for result in results.into_iter().filter(|r| scope.contains(&r.key)) {
            if result.is_pending() {
                stats.pending += 1;
            } else if result.is_approved() {
                stats.approved += 1;
            } else {
                stats.rejected += 1;
            }
            if result.is_overridden() {
                stats.overridden += 1;
            }
        }

        for certificate in certificates.into_iter().filter(|c| scope.contains(&c.key)) {
            match certificate.status() {
                CertificateStatus::Generated => stats.certificates_generated += 1,
                CertificateStatus::Downloaded => stats.certificates_downloaded += 1,
                CertificateStatus::Printed => stats.certificates_printed += 1,
            }
        }

        stats
    }

    /// Total results in scope.
    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected
    }
}
