//! Configuration for the honors registry.

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use honor_rules::{AcademicLevel, CriteriaSet, HonorQualifier, HonorTypeCriterion, LevelPolicy};

use crate::certificate::CertificateTemplate;
use crate::routing::ApproverRouting;
use crate::types::{HonorError, Result};

/// Configuration for a [`crate::HonorRegistry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HonorConfig {
    /// Honor criteria catalog
    #[serde(default = "default_criteria")]
    pub criteria: Vec<HonorTypeCriterion>,
    /// Per-level grading policies
    #[serde(default = "default_levels")]
    pub levels: Vec<LevelPolicy>,
    /// Approval configuration
    #[serde(default)]
    pub approval: ApprovalConfig,
    /// Certificate configuration
    #[serde(default)]
    pub certificates: CertificateConfig,
    /// Audit configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for HonorConfig {
    fn default() -> Self {
        Self {
            criteria: default_criteria(),
            levels: default_levels(),
            approval: ApprovalConfig::default(),
            certificates: CertificateConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

fn default_criteria() -> Vec<HonorTypeCriterion> {
    CriteriaSet::standard().all().to_vec()
}

fn default_levels() -> Vec<LevelPolicy> {
    vec![
        LevelPolicy::for_level(AcademicLevel::elementary()).subdivided(),
        LevelPolicy::for_level(AcademicLevel::junior_highschool()).subdivided(),
        LevelPolicy::for_level(AcademicLevel::senior_highschool()).subdivided(),
        LevelPolicy::for_level(AcademicLevel::college()).subdivided(),
    ]
}

impl HonorConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validated criteria catalog.
    pub fn criteria_set(&self) -> Result<CriteriaSet> {
        Ok(CriteriaSet::new(self.criteria.clone())?)
    }

    /// Qualifier over the configured catalog and level policies.
    pub fn qualifier(&self) -> Result<HonorQualifier> {
        Ok(HonorQualifier::new(self.criteria_set()?).with_policies(self.levels.iter().cloned()))
    }

    /// Policy configured for a level, if any.
    pub fn level_policy(&self, level: &AcademicLevel) -> Option<&LevelPolicy> {
        self.levels.iter().find(|p| &p.level == level)
    }

    /// Check the whole configuration.
    pub fn validate(&self) -> Result<()> {
        self.criteria_set()?;

        if self.certificates.serial_prefix.trim().is_empty() {
            return Err(HonorError::Validation(
                "certificates.serial_prefix must not be empty".to_string(),
            ));
        }
        if self.certificates.serial_prefix.contains(char::is_whitespace) {
            return Err(HonorError::Validation(
                "certificates.serial_prefix must not contain whitespace".to_string(),
            ));
        }

        let bad_format = StrftimeItems::new(&self.certificates.date_format)
            .any(|item| matches!(item, Item::Error));
        if bad_format {
            return Err(HonorError::Validation(format!(
                "certificates.date_format '{}' is not a valid date format",
                self.certificates.date_format
            )));
        }

        let mut names = std::collections::HashSet::new();
        for template in &self.certificates.templates {
            if !names.insert(template.name.as_str()) {
                return Err(HonorError::Validation(format!(
                    "certificate template '{}' declared twice",
                    template.name
                )));
            }
        }

        Ok(())
    }
}

/// Approval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Level to approver-role routing
    pub routing: ApproverRouting,
    /// Overrides must name a honor type from the catalog for the level
    pub restrict_overrides_to_catalog: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            routing: ApproverRouting::default(),
            restrict_overrides_to_catalog: true,
        }
    }
}

/// Certificate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Prefix of every serial number
    pub serial_prefix: String,
    /// Printing requires a prior download
    pub require_download_before_print: bool,
    /// chrono format of dates substituted into templates
    pub date_format: String,
    /// Templates; a template without a level is the fallback
    pub templates: Vec<CertificateTemplate>,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            serial_prefix: "HON".to_string(),
            require_download_before_print: false,
            date_format: "%B %-d, %Y".to_string(),
            templates: default_templates(),
        }
    }
}

fn default_templates() -> Vec<CertificateTemplate> {
    vec![CertificateTemplate::standard()]
}

/// Audit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Enable the audit trail
    pub enabled: bool,
    /// Entries retained
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}
