//! Student directory boundary.
//!
//! Supplies the identity facts snapshotted onto certificates and the
//! student/parent links used for notifications and parent-facing views.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Error types for directory lookups.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Directory is not reachable
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Identity facts about a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    /// Student ID
    pub student_id: String,
    /// Full name as printed on certificates
    pub name: String,
    /// School-issued student number
    pub student_number: String,
    /// College course
    #[serde(default)]
    pub course: Option<String>,
    /// College department
    #[serde(default)]
    pub department: Option<String>,
    /// Senior high school strand
    #[serde(default)]
    pub strand: Option<String>,
    /// Linked parent/guardian account IDs
    #[serde(default)]
    pub parent_ids: Vec<String>,
}

impl StudentProfile {
    /// Create a profile.
    pub fn new(
        student_id: impl Into<String>,
        name: impl Into<String>,
        student_number: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            name: name.into(),
            student_number: student_number.into(),
            course: None,
            department: None,
            strand: None,
            parent_ids: Vec::new(),
        }
    }

    /// Set course and department.
    pub fn with_course(mut self, course: impl Into<String>, department: impl Into<String>) -> Self {
        self.course = Some(course.into());
        self.department = Some(department.into());
        self
    }

    /// Set strand.
    pub fn with_strand(mut self, strand: impl Into<String>) -> Self {
        self.strand = Some(strand.into());
        self
    }

    /// Link a parent.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_ids.push(parent_id.into());
        self
    }
}

/// Lookup interface over the student/parent directory.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Profile of a student, if known.
    async fn profile(&self, student_id: &str) -> Result<Option<StudentProfile>, DirectoryError>;

    /// Students linked to a parent account.
    async fn wards(&self, parent_id: &str) -> Result<Vec<String>, DirectoryError>;
}

/// In-memory directory.
#[derive(Default)]
pub struct StaticDirectory {
    profiles: Arc<RwLock<HashMap<String, StudentProfile>>>,
}

impl StaticDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from profiles.
    pub fn with_profiles(profiles: impl IntoIterator<Item = StudentProfile>) -> Self {
        let map = profiles
            .into_iter()
            .map(|p| (p.student_id.clone(), p))
            .collect();
        Self {
            profiles: Arc::new(RwLock::new(map)),
        }
    }

    /// Add or replace a profile.
    pub async fn upsert(&self, profile: StudentProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.student_id.clone(), profile);
    }
}

#[async_trait]
impl StudentDirectory for StaticDirectory {
    async fn profile(&self, student_id: &str) -> Result<Option<StudentProfile>, DirectoryError> {
        Ok(self.profiles.read().await.get(student_id).cloned())
    }

    async fn wards(&self, parent_id: &str) -> Result<Vec<String>, DirectoryError> {
        let profiles = self.profiles.read().await;
        let mut wards: Vec<String> = profiles
            .values()
            .filter(|p| p.parent_ids.iter().any(|id| id == parent_id))
            .map(|p| p.student_id.clone())
            .collect();
        wards.sort();
        Ok(wards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wards() {
        let directory = StaticDirectory::with_profiles(vec![
            StudentProfile::new("s1", "Ana Cruz", "2024-0001").with_parent("p1"),
            StudentProfile::new("s2", "Ben Cruz", "2024-0002").with_parent("p1").with_parent("p2"),
            StudentProfile::new("s3", "Carl Reyes", "2024-0003"),
        ]);

        assert_eq!(directory.wards("p1").await.unwrap(), vec!["s1", "s2"]);
        assert_eq!(directory.wards("p2").await.unwrap(), vec!["s2"]);
        assert!(directory.wards("p9").await.unwrap().is_empty());
        assert!(directory.profile("s4").await.unwrap().is_none());

        directory
            .upsert(StudentProfile::new("s3", "Carl Reyes", "2024-0003").with_parent("p2"))
            .await;
        assert_eq!(directory.wards("p2").await.unwrap(), vec!["s2", "s3"]);
        assert_eq!(
            directory.profile("s3").await.unwrap().unwrap().parent_ids,
            vec!["p2"]
        );
    }
}
