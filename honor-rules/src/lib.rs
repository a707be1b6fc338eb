//! Honor qualification rules for the school records platform.
//!
//! This crate is the pure half of the honors core:
//!
//! - **GPA aggregation**: period-scoped averages that skip missing grades
//! - **Criteria catalog**: ranked honor types with thresholds and eligibility rules
//! - **Qualification**: the single best-fit honor for a student under a
//!   per-level grading policy
//!
//! # Key Components
//!
//! - [`GpaAggregator`]: averages a student's valid grades in an [`AcademicPeriod`]
//! - [`CriteriaSet`]: validated catalog of [`HonorTypeCriterion`]
//! - [`HonorQualifier`]: evaluates a [`GradeProfile`] against the catalog
//!
//! # Example
//!
//! ```
//! use honor_rules::{
//!     AcademicLevel, AcademicPeriod, CriteriaSet, GradeProfile, GradeRecord, HonorQualifier,
//! };
//!
//! let period = AcademicPeriod::new("senior_highschool", "2024-2025");
//! let grades = vec![
//!     GradeRecord::new("s-1", "Math", "senior_highschool", "2024-2025", Some(96.0)),
//!     GradeRecord::new("s-1", "Science", "senior_highschool", "2024-2025", None),
//! ];
//!
//! let profile = GradeProfile::from_records(&grades, &period);
//! let qualifier = HonorQualifier::new(CriteriaSet::standard());
//! let result = qualifier.evaluate(&AcademicLevel::senior_highschool(), &profile);
//! assert_eq!(result.honor_type(), Some("With High Honors"));
//! ```

pub mod criteria;
pub mod gpa;
pub mod qualifier;
pub mod types;

// Re-export main types
pub use criteria::{CriteriaSet, EligibilityRule, HonorTypeCriterion};
pub use gpa::{Gpa, GpaAggregator, GradeProfile};
pub use qualifier::{HonorQualifier, Qualification};
pub use types::*;
