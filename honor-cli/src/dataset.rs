//! JSON dataset standing in for the grading and directory subsystems.

use serde::{Deserialize, Serialize};
use std::path::Path;

use honor_registry::StudentProfile;
use honor_rules::GradeRecord;

/// Students and their finalized grades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Student directory entries
    #[serde(default)]
    pub students: Vec<StudentProfile>,
    /// Grade records
    #[serde(default)]
    pub grades: Vec<GradeRecord>,
}

impl Dataset {
    /// Parse a dataset from JSON.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a dataset file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read dataset {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dataset() {
        let json = r#"{
            "students": [
                {"student_id": "s-1", "name": "Ana Cruz", "student_number": "2024-0001", "parent_ids": ["p-1"]}
            ],
            "grades": [
                {"student_id": "s-1", "subject": "Math", "level": "elementary", "school_year": "2024-2025", "grade": 97.0},
                {"student_id": "s-1", "subject": "Art", "level": "elementary", "school_year": "2024-2025", "grade": null}
            ]
        }"#;
        let dataset = Dataset::from_json(json).unwrap();
        assert_eq!(dataset.students.len(), 1);
        assert_eq!(dataset.grades.len(), 2);
        assert!(dataset.grades[1].grade.is_none());
    }
}
