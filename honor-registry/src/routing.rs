//! Approver routing.
//!
//! A closed table from academic-level key to the role allowed to decide that
//! level's honor results. Adding a level is one table entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use honor_rules::AcademicLevel;

use crate::types::{Actor, HonorError, Result};

/// Roles that may decide honor results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    /// Basic education principal
    Principal,
    /// College department chairperson
    Chairperson,
}

impl ApproverRole {
    /// Get string representation, as reported by the identity subsystem.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApproverRole::Principal => "principal",
            ApproverRole::Chairperson => "chairperson",
        }
    }

    /// Parse an identity role string. Unknown roles yield `None`.
    pub fn from_role(role: &str) -> Option<Self> {
        match role.trim().to_ascii_lowercase().as_str() {
            "principal" => Some(ApproverRole::Principal),
            "chairperson" => Some(ApproverRole::Chairperson),
            _ => None,
        }
    }
}

impl fmt::Display for ApproverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level-key to required-role table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproverRouting {
    /// Explicit routes by level key
    #[serde(default)]
    pub routes: BTreeMap<AcademicLevel, ApproverRole>,
    /// Role for levels without an explicit route
    pub default_role: ApproverRole,
}

impl Default for ApproverRouting {
    fn default() -> Self {
        let mut routes = BTreeMap::new();
        routes.insert(AcademicLevel::college(), ApproverRole::Chairperson);
        Self {
            routes,
            default_role: ApproverRole::Principal,
        }
    }
}

impl ApproverRouting {
    /// Add or replace a route.
    pub fn with_route(mut self, level: impl Into<AcademicLevel>, role: ApproverRole) -> Self {
        self.routes.insert(level.into(), role);
        self
    }

    /// Role required to decide results at a level.
    pub fn required_role(&self, level: &AcademicLevel) -> ApproverRole {
        self.routes.get(level).copied().unwrap_or(self.default_role)
    }

    /// Check that an actor may decide results at a level.
    pub fn authorize(&self, actor: &Actor, level: &AcademicLevel) -> Result<ApproverRole> {
        let required = self.required_role(level);
        if ApproverRole::from_role(&actor.role) == Some(required) {
            return Ok(required);
        }

        warn!(
            actor_id = %actor.id,
            role = %actor.role,
            level = %level,
            required = %required,
            "Approver not authorized for level"
        );
        Err(HonorError::Authorization {
            role: actor.role.clone(),
            level: level.clone(),
            required: required.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routes() {
        let routing = ApproverRouting::default();
        assert_eq!(routing.required_role(&AcademicLevel::college()), ApproverRole::Chairperson);
        for level in ["elementary", "junior_highschool", "senior_highschool"] {
            assert_eq!(
                routing.required_role(&AcademicLevel::new(level)),
                ApproverRole::Principal
            );
        }
    }

    #[test]
    fn test_principal_cannot_decide_college() {
        let routing = ApproverRouting::default();
        let principal = Actor::new("u-1", "principal");
        let chair = Actor::new("u-2", "Chairperson");

        assert!(matches!(
            routing.authorize(&principal, &AcademicLevel::college()),
            Err(HonorError::Authorization { .. })
        ));
        assert!(routing.authorize(&chair, &AcademicLevel::college()).is_ok());

        assert!(routing
            .authorize(&principal, &AcademicLevel::senior_highschool())
            .is_ok());
        assert!(routing
            .authorize(&chair, &AcademicLevel::senior_highschool())
            .is_err());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let routing = ApproverRouting::default();
        let teacher = Actor::new("u-3", "teacher");
        assert!(routing.authorize(&teacher, &AcademicLevel::elementary()).is_err());
    }

    #[test]
    fn test_new_level_is_one_entry() {
        let routing =
            ApproverRouting::default().with_route("graduate_school", ApproverRole::Chairperson);
        let chair = Actor::new("u-2", "chairperson");
        assert!(routing
            .authorize(&chair, &AcademicLevel::new("graduate_school"))
            .is_ok());
    }

    #[test]
    fn test_route_keys_from_yaml_are_normalized() {
        let yaml = r#"
routes:
  College: chairperson
  Graduate_School: chairperson
default_role: principal
"#;
        let routing: ApproverRouting = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(routing.required_role(&AcademicLevel::college()), ApproverRole::Chairperson);
        assert_eq!(
            routing.required_role(&AcademicLevel::new("graduate_school")),
            ApproverRole::Chairperson
        );
        assert!(routing
            .authorize(&Actor::new("u-1", "principal"), &AcademicLevel::college())
            .is_err());
    }
}
