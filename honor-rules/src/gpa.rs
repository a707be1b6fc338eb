//! GPA aggregation.
//!
//! Missing grades are excluded from both numerator and denominator. A student
//! with no valid grade in the period has no GPA at all, which callers must treat
//! as "not eligible" and never as a GPA of zero.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AcademicPeriod, GradeRecord};

/// A period-scoped grade point average.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gpa(f64);

impl Gpa {
    /// Wrap a raw average. Returns `None` for non-finite values.
    pub fn new(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self(value))
    }

    /// Raw value.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Formatted to two decimals, as printed on certificates.
    pub fn display(&self) -> String {
        format!("{:.2}", self.0)
    }
}

impl fmt::Display for Gpa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Summary of one student's grades in a period.
///
/// Eligibility rules look at the individual grades, not only the average.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GradeProfile {
    /// Valid grades, one per graded record
    pub grades: Vec<f64>,
    /// Records in the period without a usable grade
    pub missing: usize,
}

impl GradeProfile {
    /// Build a profile from the records of one student in a period.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a GradeRecord>,
        period: &AcademicPeriod,
    ) -> Self {
        let mut profile = Self::default();
        for record in records.into_iter().filter(|r| period.contains(r)) {
            match record.valid_grade() {
                Some(grade) => profile.grades.push(grade),
                None => profile.missing += 1,
            }
        }
        profile
    }

    /// Arithmetic mean of the valid grades, `None` when there are none.
    pub fn gpa(&self) -> Option<Gpa> {
        if self.grades.is_empty() {
            return None;
        }
        let sum: f64 = self.grades.iter().sum();
        Gpa::new(sum / self.grades.len() as f64)
    }

    /// Number of graded subjects.
    pub fn graded(&self) -> usize {
        self.grades.len()
    }
}

/// Computes period-scoped averages. Pure; holds no state.
pub struct GpaAggregator;

impl GpaAggregator {
    /// Average of one student's valid grades in `period`.
    ///
    /// Records outside the period (other level, year or grading period) are
    /// ignored, so callers may pass a student's full transcript.
    pub fn compute<'a>(
        records: impl IntoIterator<Item = &'a GradeRecord>,
        period: &AcademicPeriod,
    ) -> Option<Gpa> {
        GradeProfile::from_records(records, period).gpa()
    }
}
