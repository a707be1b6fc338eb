//! Read-only boundary to the grading subsystem.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use honor_rules::{AcademicPeriod, GradeRecord};

/// Error types for grade queries.
#[derive(Debug, thiserror::Error)]
pub enum GradeSourceError {
    /// Grading subsystem is not reachable
    #[error("Grade source unavailable: {0}")]
    Unavailable(String),
}

/// Query interface over finalized grades.
///
/// Grade values may be absent for some subjects.
#[async_trait]
pub trait GradeSource: Send + Sync {
    /// Students holding at least one record in the period.
    async fn students(&self, period: &AcademicPeriod) -> Result<Vec<String>, GradeSourceError>;

    /// One student's records in the period.
    async fn grades(
        &self,
        student_id: &str,
        period: &AcademicPeriod,
    ) -> Result<Vec<GradeRecord>, GradeSourceError>;
}

/// In-memory grade book for tests, the CLI and offline runs.
#[derive(Default)]
pub struct InMemoryGradeBook {
    records: Arc<RwLock<Vec<GradeRecord>>>,
}

impl InMemoryGradeBook {
    /// Create an empty grade book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from records.
    pub fn with_records(records: Vec<GradeRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Add a record.
    pub async fn insert(&self, record: GradeRecord) {
        self.records.write().await.push(record);
    }

    /// Replace one student's grade in a subject, as a re-finalization would.
    pub async fn regrade(
        &self,
        student_id: &str,
        subject: &str,
        period: &AcademicPeriod,
        grade: Option<f64>,
    ) -> usize {
        let mut records = self.records.write().await;
        let mut changed = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.student_id == student_id && r.subject == subject && period.contains(r))
        {
            record.grade = grade;
            changed += 1;
        }
        changed
    }
}

#[async_trait]
impl GradeSource for InMemoryGradeBook {
    async fn students(&self, period: &AcademicPeriod) -> Result<Vec<String>, GradeSourceError> {
        let records = self.records.read().await;
        let students: BTreeSet<&str> = records
            .iter()
            .filter(|r| period.contains(r))
            .map(|r| r.student_id.as_str())
            .collect();
        Ok(students.into_iter().map(str::to_string).collect())
    }

    async fn grades(
        &self,
        student_id: &str,
        period: &AcademicPeriod,
    ) -> Result<Vec<GradeRecord>, GradeSourceError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.student_id == student_id && period.contains(r))
            .cloned()
            .collect())
    }
}
