//! Core types for honor qualification.
//!
//! These types describe the schooling context a grade belongs to and the grade
//! records consumed from the grading subsystem.
//!
//! With the `typescript` feature enabled, these types can be exported to TypeScript
//! using ts-rs for the records dashboard.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Academic level key (e.g. `elementary`, `senior_highschool`, `college`).
///
/// Levels are open-ended keys rather than a closed enum so a school can add a
/// level through configuration alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(transparent)]
pub struct AcademicLevel(String);

impl AcademicLevel {
    /// Elementary level key.
    pub const ELEMENTARY: &'static str = "elementary";
    /// Junior high school level key.
    pub const JUNIOR_HIGHSCHOOL: &'static str = "junior_highschool";
    /// Senior high school level key.
    pub const SENIOR_HIGHSCHOOL: &'static str = "senior_highschool";
    /// College level key.
    pub const COLLEGE: &'static str = "college";

    /// Create a level from its key. Keys are normalized to lowercase.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_lowercase())
    }

    pub fn elementary() -> Self {
        Self::new(Self::ELEMENTARY)
    }

    pub fn junior_highschool() -> Self {
        Self::new(Self::JUNIOR_HIGHSCHOOL)
    }

    pub fn senior_highschool() -> Self {
        Self::new(Self::SENIOR_HIGHSCHOOL)
    }

    pub fn college() -> Self {
        Self::new(Self::COLLEGE)
    }

    /// Get the level key.
    pub fn key(&self) -> &str {
        &self.0
    }

    /// Whether this is the college level.
    pub fn is_college(&self) -> bool {
        self.0 == Self::COLLEGE
    }
}

impl fmt::Display for AcademicLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AcademicLevel {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for AcademicLevel {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

// Deserialized keys go through `new` so "College" in a dataset or config
// matches `college`.
impl<'de> Deserialize<'de> for AcademicLevel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// A schooling context: level, school year and optionally a grading period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AcademicPeriod {
    /// Academic level
    pub level: AcademicLevel,
    /// School year (e.g. "2024-2025")
    pub school_year: String,
    /// Grading period (quarter/semester) when the level is subdivided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grading_period: Option<String>,
}

impl AcademicPeriod {
    /// Create a whole-year period.
    pub fn new(level: impl Into<AcademicLevel>, school_year: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            school_year: school_year.into(),
            grading_period: None,
        }
    }

    /// Restrict to one grading period.
    pub fn with_grading_period(mut self, period: impl Into<String>) -> Self {
        self.grading_period = Some(period.into());
        self
    }

    /// Whether a grade record belongs to this period.
    ///
    /// A whole-year period matches records of every grading period.
    pub fn contains(&self, record: &GradeRecord) -> bool {
        if record.level != self.level || record.school_year != self.school_year {
            return false;
        }
        match &self.grading_period {
            Some(period) => record.grading_period.as_deref() == Some(period.as_str()),
            None => true,
        }
    }
}

impl fmt::Display for AcademicPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.grading_period {
            Some(period) => write!(f, "{}/{}/{}", self.level, self.school_year, period),
            None => write!(f, "{}/{}", self.level, self.school_year),
        }
    }
}

/// A per-subject grade, owned by the grading subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GradeRecord {
    /// Student ID
    pub student_id: String,
    /// Subject code or name
    pub subject: String,
    /// Academic level
    pub level: AcademicLevel,
    /// Grading period, if the level is subdivided
    #[serde(default)]
    pub grading_period: Option<String>,
    /// School year
    pub school_year: String,
    /// Numeric grade; absent when not yet entered
    #[serde(default)]
    pub grade: Option<f64>,
}

impl GradeRecord {
    /// Create a graded record.
    pub fn new(
        student_id: impl Into<String>,
        subject: impl Into<String>,
        level: impl Into<AcademicLevel>,
        school_year: impl Into<String>,
        grade: Option<f64>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            subject: subject.into(),
            level: level.into(),
            grading_period: None,
            school_year: school_year.into(),
            grade,
        }
    }

    /// Set grading period.
    pub fn in_period(mut self, period: impl Into<String>) -> Self {
        self.grading_period = Some(period.into());
        self
    }

    /// The grade if it is present and a usable number.
    pub fn valid_grade(&self) -> Option<f64> {
        self.grade.filter(|g| g.is_finite())
    }
}

/// Which end of the grading scale is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    /// Percentage-style scales (98 beats 90)
    #[default]
    HigherIsBetter,
    /// Point scales where 1.0 is the top mark
    LowerIsBetter,
}

impl ScaleDirection {
    /// Whether `value` meets `threshold` under this direction.
    pub fn meets(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::HigherIsBetter => value >= threshold,
            Self::LowerIsBetter => value <= threshold,
        }
    }

    /// Whether threshold `a` is stricter than threshold `b`.
    pub fn is_stricter(&self, a: f64, b: f64) -> bool {
        match self {
            Self::HigherIsBetter => a > b,
            Self::LowerIsBetter => a < b,
        }
    }
}

/// How to choose between met criteria that share a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Prefer the criterion with the stricter threshold, then declaration order
    #[default]
    StricterThreshold,
    /// Prefer the criterion declared first
    DeclarationOrder,
}

/// Grading policy for one academic level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct LevelPolicy {
    /// Level this policy applies to
    pub level: AcademicLevel,
    /// Comparison direction of the grading scale
    #[serde(default)]
    pub direction: ScaleDirection,
    /// Tie-break for equal ranks
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Whether the level is divided into grading periods
    #[serde(default)]
    pub subdivided: bool,
}

impl LevelPolicy {
    /// Default policy for a level.
    pub fn for_level(level: impl Into<AcademicLevel>) -> Self {
        Self {
            level: level.into(),
            direction: ScaleDirection::default(),
            tie_break: TieBreak::default(),
            subdivided: false,
        }
    }

    /// Set scale direction.
    pub fn with_direction(mut self, direction: ScaleDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Set tie-break.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Mark as subdivided into grading periods.
    pub fn subdivided(mut self) -> Self {
        self.subdivided = true;
        self
    }
}

/// Error types for rule evaluation and catalog loading.
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    /// Criteria catalog is malformed
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    /// Catalog could not be parsed
    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, RulesError>;
