//! Certificate templates with `{{placeholder}}` tokens.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use honor_rules::AcademicLevel;

use crate::types::{HonorError, Result};

/// Token filled with the issue date when the payload does not carry one.
pub const DATE_NOW: &str = "date_now";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A named certificate template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateTemplate {
    /// Template name, bound to the certificate at issuance
    pub name: String,
    /// Level this template is for; `None` marks the fallback
    #[serde(default)]
    pub level: Option<AcademicLevel>,
    /// Body with `{{placeholder}}` tokens
    pub body: String,
}

impl CertificateTemplate {
    /// Create a fallback template.
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: None,
            body: body.into(),
        }
    }

    /// Restrict to one level.
    pub fn for_level(mut self, level: impl Into<AcademicLevel>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// The template shipped with the registry.
    pub fn standard() -> Self {
        Self::new(
            "standard",
            "CERTIFICATE OF RECOGNITION\n\
             \n\
             This certifies that {{student_name}} ({{student_number}})\n\
             is awarded {{honor_type}}\n\
             with a general average of {{gpa}}\n\
             for {{academic_level}}, school year {{school_year}}.\n\
             \n\
             Given this {{date_now}}.\n\
             Serial No. {{serial_number}}\n",
        )
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.body.as_str();
        while let Some(start) = rest.find(OPEN) {
            let after = &rest[start + OPEN.len()..];
            let Some(end) = after.find(CLOSE) else {
                break;
            };
            names.push(after[..end].trim());
            rest = &after[end + CLOSE.len()..];
        }
        names
    }

    /// Substitute every payload key present in the body. Values are inserted
    /// verbatim; tokens without a payload entry are left as written.
    pub fn render(&self, payload: &BTreeMap<String, String>) -> String {
        let mut out = String::with_capacity(self.body.len());
        let mut rest = self.body.as_str();

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len()..];
            let Some(end) = after.find(CLOSE) else {
                out.push_str(&rest[start..]);
                return out;
            };

            let token = &rest[start..start + OPEN.len() + end + CLOSE.len()];
            match payload.get(after[..end].trim()) {
                Some(value) => out.push_str(value),
                None => out.push_str(token),
            }
            rest = &after[end + CLOSE.len()..];
        }

        out.push_str(rest);
        out
    }
}

/// Templates by level with a fallback.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: Vec<CertificateTemplate>,
}

impl TemplateSet {
    /// Create from configured templates.
    pub fn new(templates: Vec<CertificateTemplate>) -> Self {
        Self { templates }
    }

    /// Template by name.
    pub fn by_name(&self, name: &str) -> Result<&CertificateTemplate> {
        self.templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| HonorError::Template(format!("unknown template '{}'", name)))
    }

    /// Template for a level: the level's own, else the fallback.
    pub fn for_level(&self, level: &AcademicLevel) -> Result<&CertificateTemplate> {
        self.templates
            .iter()
            .find(|t| t.level.as_ref() == Some(level))
            .or_else(|| self.templates.iter().find(|t| t.level.is_none()))
            .ok_or_else(|| {
                HonorError::Template(format!("no template configured for level {}", level))
            })
    }
}
