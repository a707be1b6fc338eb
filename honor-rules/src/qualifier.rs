//! Honor qualifier - picks the single best-fit honor for a student.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::criteria::{CriteriaSet, HonorTypeCriterion};
use crate::gpa::{Gpa, GradeProfile};
use crate::types::{AcademicLevel, LevelPolicy, ScaleDirection, TieBreak};

/// Outcome of evaluating one student against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Qualification {
    /// No valid grades; never eligible
    Undefined,
    /// GPA known but no criterion met
    NotQualified { gpa: Gpa },
    /// Best criterion met
    Qualified { gpa: Gpa, honor_type: String, rank: u32 },
}

impl Qualification {
    /// GPA if one could be computed.
    pub fn gpa(&self) -> Option<Gpa> {
        match self {
            Qualification::Undefined => None,
            Qualification::NotQualified { gpa } | Qualification::Qualified { gpa, .. } => {
                Some(*gpa)
            }
        }
    }

    /// Awarded honor type, if any.
    pub fn honor_type(&self) -> Option<&str> {
        match self {
            Qualification::Qualified { honor_type, .. } => Some(honor_type.as_str()),
            _ => None,
        }
    }

    /// Whether a candidate should exist for this student.
    pub fn is_candidate(&self) -> bool {
        matches!(self, Qualification::Qualified { .. })
    }
}

/// Evaluates aggregates against the criteria catalog under per-level policies.
#[derive(Debug, Clone, Default)]
pub struct HonorQualifier {
    criteria: CriteriaSet,
    policies: HashMap<AcademicLevel, LevelPolicy>,
}

impl HonorQualifier {
    /// Create a qualifier over a catalog with default policies.
    pub fn new(criteria: CriteriaSet) -> Self {
        Self {
            criteria,
            policies: HashMap::new(),
        }
    }

    /// Register a level policy, replacing any previous one for that level.
    pub fn with_policy(mut self, policy: LevelPolicy) -> Self {
        self.policies.insert(policy.level.clone(), policy);
        self
    }

    /// Register several level policies.
    pub fn with_policies(mut self, policies: impl IntoIterator<Item = LevelPolicy>) -> Self {
        for policy in policies {
            self.policies.insert(policy.level.clone(), policy);
        }
        self
    }

    /// The catalog.
    pub fn criteria(&self) -> &CriteriaSet {
        &self.criteria
    }

    /// Effective policy for a level.
    pub fn policy(&self, level: &AcademicLevel) -> LevelPolicy {
        self.policies
            .get(level)
            .cloned()
            .unwrap_or_else(|| LevelPolicy::for_level(level.clone()))
    }

    /// Evaluate a grade profile for a level.
    pub fn evaluate(&self, level: &AcademicLevel, profile: &GradeProfile) -> Qualification {
        let Some(gpa) = profile.gpa() else {
            return Qualification::Undefined;
        };
        self.evaluate_gpa(level, gpa, profile)
    }

    /// Evaluate a known GPA for a level.
    pub fn evaluate_gpa(
        &self,
        level: &AcademicLevel,
        gpa: Gpa,
        profile: &GradeProfile,
    ) -> Qualification {
        let policy = self.policy(level);

        let best = self
            .criteria
            .applicable(level)
            .filter(|(_, c)| c.is_met(gpa.value(), profile, policy.direction))
            .min_by(|a, b| compare(a, b, &policy));

        match best {
            Some((_, criterion)) => {
                debug!(
                    level = %level,
                    gpa = %gpa,
                    honor_type = %criterion.name,
                    rank = criterion.rank,
                    "Criterion met"
                );
                Qualification::Qualified {
                    gpa,
                    honor_type: criterion.name.clone(),
                    rank: criterion.rank,
                }
            }
            None => Qualification::NotQualified { gpa },
        }
    }
}

/// Orders met criteria best first: lower rank, then the level's tie-break.
fn compare(
    a: &(usize, &HonorTypeCriterion),
    b: &(usize, &HonorTypeCriterion),
    policy: &LevelPolicy,
) -> Ordering {
    a.1.rank.cmp(&b.1.rank).then_with(|| match policy.tie_break {
        TieBreak::StricterThreshold => {
            threshold_order(a.1.minimum_gpa, b.1.minimum_gpa, policy.direction)
                .then(a.0.cmp(&b.0))
        }
        TieBreak::DeclarationOrder => a.0.cmp(&b.0),
    })
}

fn threshold_order(a: f64, b: f64, direction: ScaleDirection) -> Ordering {
    if direction.is_stricter(a, b) {
        Ordering::Less
    } else if direction.is_stricter(b, a) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}
