//! Honor criteria catalog.
//!
//! Each criterion names a distinction, its rank (1 = most prestigious), the
//! minimum GPA it requires and the levels it applies to. An optional
//! eligibility rule adds constraints beyond the average.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::gpa::GradeProfile;
use crate::types::{AcademicLevel, Result, RulesError, ScaleDirection};

/// Additional eligibility constraint for a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "rule", content = "value", rename_all = "snake_case")]
pub enum EligibilityRule {
    /// No graded subject worse than the given mark
    NoGradeBelow(f64),
    /// Every subject in the period carries a grade
    NoMissingGrades,
    /// At least this many graded subjects
    MinimumGradedSubjects(usize),
    /// All nested rules hold
    All(Vec<EligibilityRule>),
    /// At least one nested rule holds
    Any(Vec<EligibilityRule>),
}

impl EligibilityRule {
    /// Evaluate the rule against a grade profile.
    pub fn evaluate(&self, profile: &GradeProfile, direction: ScaleDirection) -> bool {
        match self {
            EligibilityRule::NoGradeBelow(floor) => {
                profile.grades.iter().all(|g| direction.meets(*g, *floor))
            }
            EligibilityRule::NoMissingGrades => profile.missing == 0,
            EligibilityRule::MinimumGradedSubjects(count) => profile.graded() >= *count,
            EligibilityRule::All(rules) => rules.iter().all(|r| r.evaluate(profile, direction)),
            EligibilityRule::Any(rules) => rules.iter().any(|r| r.evaluate(profile, direction)),
        }
    }
}

/// A named honor distinction with its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct HonorTypeCriterion {
    /// Display name (e.g. "With Highest Honors")
    pub name: String,
    /// Rank, 1 being the most prestigious
    pub rank: u32,
    /// Threshold the GPA must meet
    pub minimum_gpa: f64,
    /// Extra constraint beyond the GPA threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<EligibilityRule>,
    /// Level keys this criterion applies to; empty means every level
    #[serde(default)]
    pub levels: Vec<AcademicLevel>,
}

impl HonorTypeCriterion {
    /// Create a criterion that applies to every level.
    pub fn new(name: impl Into<String>, rank: u32, minimum_gpa: f64) -> Self {
        Self {
            name: name.into(),
            rank,
            minimum_gpa,
            eligibility: None,
            levels: Vec::new(),
        }
    }

    /// Restrict to the given levels.
    pub fn for_levels<I, L>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<AcademicLevel>,
    {
        self.levels = levels.into_iter().map(Into::into).collect();
        self
    }

    /// Attach an eligibility rule.
    pub fn with_eligibility(mut self, rule: EligibilityRule) -> Self {
        self.eligibility = Some(rule);
        self
    }

    /// Whether the criterion applies to a level.
    pub fn applies_to(&self, level: &AcademicLevel) -> bool {
        self.levels.is_empty() || self.levels.contains(level)
    }

    /// Whether a student with this GPA and profile meets the criterion.
    pub fn is_met(&self, gpa: f64, profile: &GradeProfile, direction: ScaleDirection) -> bool {
        direction.meets(gpa, self.minimum_gpa)
            && self
                .eligibility
                .as_ref()
                .map_or(true, |rule| rule.evaluate(profile, direction))
    }
}

/// Ordered catalog of honor criteria.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CriteriaSet {
    criteria: Vec<HonorTypeCriterion>,
}

impl CriteriaSet {
    /// Build a validated catalog.
    pub fn new(criteria: Vec<HonorTypeCriterion>) -> Result<Self> {
        let set = Self { criteria };
        set.validate()?;
        Ok(set)
    }

    /// Load a catalog from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let criteria: Vec<HonorTypeCriterion> = serde_yaml::from_str(yaml)?;
        Self::new(criteria)
    }

    /// Check names, thresholds and per-level uniqueness.
    pub fn validate(&self) -> Result<()> {
        // Names are matched case-insensitively on lookup.
        let mut seen: HashSet<(Option<&AcademicLevel>, String)> = HashSet::new();

        for criterion in &self.criteria {
            if criterion.name.trim().is_empty() {
                return Err(RulesError::InvalidCriteria(
                    "criterion name must not be empty".to_string(),
                ));
            }
            if !criterion.minimum_gpa.is_finite() {
                return Err(RulesError::InvalidCriteria(format!(
                    "criterion '{}' has a non-finite threshold",
                    criterion.name
                )));
            }

            let scopes: Vec<Option<&AcademicLevel>> = if criterion.levels.is_empty() {
                vec![None]
            } else {
                criterion.levels.iter().map(Some).collect()
            };
            let folded = criterion.name.trim().to_lowercase();
            for scope in scopes {
                if !seen.insert((scope, folded.clone())) {
                    return Err(RulesError::InvalidCriteria(format!(
                        "criterion '{}' declared twice for level {}",
                        criterion.name,
                        scope.map_or("*", |l| l.key())
                    )));
                }
            }
        }

        Ok(())
    }

    /// All criteria in declaration order.
    pub fn all(&self) -> &[HonorTypeCriterion] {
        &self.criteria
    }

    /// Criteria applicable to a level, in declaration order.
    pub fn applicable<'a>(
        &'a self,
        level: &AcademicLevel,
    ) -> impl Iterator<Item = (usize, &'a HonorTypeCriterion)> + 'a {
        let level = level.clone();
        self.criteria
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.applies_to(&level))
    }

    /// Applicable criteria for a level, best first.
    pub fn ladder(&self, level: &AcademicLevel) -> Vec<&HonorTypeCriterion> {
        let mut ladder: Vec<&HonorTypeCriterion> =
            self.applicable(level).map(|(_, c)| c).collect();
        ladder.sort_by_key(|c| c.rank);
        ladder
    }

    /// Look up an applicable criterion by name.
    pub fn find(&self, level: &AcademicLevel, name: &str) -> Option<&HonorTypeCriterion> {
        self.applicable(level)
            .map(|(_, c)| c)
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Number of criteria.
    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// The catalog used when a school configures none.
    ///
    /// K-12 levels follow the percentage ladder; college honors additionally
    /// require no subject below a floor.
    pub fn standard() -> Self {
        let basic = [
            AcademicLevel::ELEMENTARY,
            AcademicLevel::JUNIOR_HIGHSCHOOL,
            AcademicLevel::SENIOR_HIGHSCHOOL,
        ];
        Self {
            criteria: vec![
                HonorTypeCriterion::new("With Highest Honors", 1, 98.0).for_levels(basic),
                HonorTypeCriterion::new("With High Honors", 2, 95.0).for_levels(basic),
                HonorTypeCriterion::new("With Honors", 3, 90.0).for_levels(basic),
                HonorTypeCriterion::new("Summa Cum Laude", 1, 96.0)
                    .for_levels([AcademicLevel::COLLEGE])
                    .with_eligibility(EligibilityRule::NoGradeBelow(90.0)),
                HonorTypeCriterion::new("Magna Cum Laude", 2, 93.0)
                    .for_levels([AcademicLevel::COLLEGE])
                    .with_eligibility(EligibilityRule::NoGradeBelow(87.0)),
                HonorTypeCriterion::new("Cum Laude", 3, 90.0).for_levels([AcademicLevel::COLLEGE]),
            ],
        }
    }
}
