//! Certificate issuance and lifecycle.

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

use crate::audit::{AuditAction, AuditTrail};
use crate::certificate::serial::SerialGenerator;
use crate::certificate::template::{TemplateSet, DATE_NOW};
use crate::config::CertificateConfig;
use crate::directory::{StudentDirectory, StudentProfile};
use crate::notify::{EventSnapshot, HonorEventKind, Notifier};
use crate::projection::CertificateView;
use crate::store::{HonorStore, Issuance};
use crate::types::{
    Actor, Certificate, CertificateLifecycle, HonorError, HonorResult, Result, ResultKey,
};

/// Options for one issuance.
#[derive(Debug, Clone, Default)]
pub struct IssueRequest {
    /// Date printed on the certificate; today when absent
    pub issue_date: Option<NaiveDate>,
    /// Template by name; the level's template when absent
    pub template: Option<String>,
}

impl IssueRequest {
    /// Set the issue date.
    pub fn on(mut self, date: NaiveDate) -> Self {
        self.issue_date = Some(date);
        self
    }

    /// Choose a template.
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }
}

/// Issues certificates from approved honor results.
pub struct CertificateIssuer {
    store: Arc<HonorStore>,
    directory: Arc<dyn StudentDirectory>,
    notifier: Arc<Notifier>,
    audit: Arc<AuditTrail>,
    serials: SerialGenerator,
    templates: TemplateSet,
    date_format: String,
    require_download_before_print: bool,
}

impl CertificateIssuer {
    /// Create an issuer.
    pub fn new(
        config: &CertificateConfig,
        store: Arc<HonorStore>,
        directory: Arc<dyn StudentDirectory>,
        notifier: Arc<Notifier>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            audit,
            serials: SerialGenerator::new(config.serial_prefix.clone()),
            templates: TemplateSet::new(config.templates.clone()),
            date_format: config.date_format.clone(),
            require_download_before_print: config.require_download_before_print,
        }
    }

    /// Replace the serial generator, e.g. to resume a sequence.
    pub fn with_serials(mut self, serials: SerialGenerator) -> Self {
        self.serials = serials;
        self
    }

    /// Issue the certificate for an approved result.
    ///
    /// At most one certificate exists per (student, level, school year); a
    /// repeated call returns the stored one unchanged.
    pub async fn issue(&self, result_id: &str, request: IssueRequest) -> Result<Certificate> {
        let result = self.store.require(result_id).await?;

        if let Some(existing) = self.store.certificate_for_key(&result.key).await {
            debug!(
                result_id = %result_id,
                serial = %existing.serial_number,
                "Certificate already issued"
            );
            return Ok(existing);
        }

        if !result.is_approved() {
            return Err(HonorError::InvalidStateTransition(format!(
                "honor result {} is {}, certificates require approval",
                result_id, result.status
            )));
        }

        let profile = self
            .directory
            .profile(&result.key.student_id)
            .await?
            .ok_or_else(|| HonorError::NotFound(format!("student {}", result.key.student_id)))?;

        let template = match &request.template {
            Some(name) => self.templates.by_name(name)?,
            None => self.templates.for_level(&result.key.level)?,
        };

        let issue_date = request
            .issue_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let serial = self.serials.next(&result.key, issue_date);
        let payload = self.snapshot(&result, &profile, issue_date, &serial)?;

        let certificate = Certificate {
            id: uuid::Uuid::new_v4().to_string(),
            result_id: result.id.clone(),
            key: result.key.clone(),
            template_name: template.name.clone(),
            serial_number: serial,
            payload,
            lifecycle: CertificateLifecycle::generated(Utc::now()),
        };

        match self.store.insert_certificate(certificate, result.version).await? {
            Issuance::Existing(existing) => {
                debug!(
                    result_id = %result_id,
                    serial = %existing.serial_number,
                    "Certificate issued concurrently"
                );
                Ok(existing)
            }
            Issuance::Created {
                certificate,
                result: frozen,
            } => {
                info!(
                    result_id = %result_id,
                    frozen_version = frozen.version,
                    key = %certificate.key,
                    serial = %certificate.serial_number,
                    template = %certificate.template_name,
                    "Certificate generated"
                );
                self.audit
                    .record(
                        &certificate.id,
                        AuditAction::CertificateGenerated,
                        "system:issuer",
                        Some(certificate.serial_number.clone()),
                    )
                    .await;
                self.notifier
                    .announce(
                        HonorEventKind::CertificateGenerated,
                        &certificate.key.student_id,
                        EventSnapshot::Certificate(CertificateView::from(&certificate)),
                    )
                    .await;
                Ok(certificate)
            }
        }
    }

    fn snapshot(
        &self,
        result: &HonorResult,
        profile: &StudentProfile,
        issue_date: NaiveDate,
        serial: &str,
    ) -> Result<BTreeMap<String, String>> {
        let honor_type = result.honor_type.clone().ok_or_else(|| {
            HonorError::Validation(format!("honor result {} has no honor type", result.id))
        })?;

        let mut payload = BTreeMap::new();
        payload.insert("student_name".to_string(), profile.name.clone());
        payload.insert("student_number".to_string(), profile.student_number.clone());
        payload.insert("honor_type".to_string(), honor_type);
        payload.insert("gpa".to_string(), result.gpa.display());
        payload.insert("school_year".to_string(), result.key.school_year.clone());
        payload.insert("academic_level".to_string(), result.key.level.to_string());
        payload.insert("issue_date".to_string(), format_date(issue_date, &self.date_format)?);
        payload.insert("serial_number".to_string(), serial.to_string());

        for (key, value) in [
            ("course", &profile.course),
            ("department", &profile.department),
            ("strand", &profile.strand),
        ] {
            if let Some(value) = value {
                payload.insert(key.to_string(), value.clone());
            }
        }

        Ok(payload)
    }

    /// Record a download. Repeating it is a no-op.
    pub async fn mark_downloaded(&self, serial: &str, actor: &Actor) -> Result<Certificate> {
        let (certificate, changed) = self
            .store
            .update_lifecycle(serial, |lifecycle| lifecycle.mark_downloaded(Utc::now()))
            .await?;

        if changed {
            info!(serial = %serial, actor = %actor.id, "Certificate downloaded");
            self.audit
                .record(&certificate.id, AuditAction::CertificateDownloaded, &actor.id, None)
                .await;
        }
        Ok(certificate)
    }

    /// Record a print. Repeating it is a no-op.
    pub async fn mark_printed(&self, serial: &str, actor: &Actor) -> Result<Certificate> {
        let require_download = self.require_download_before_print;
        let (certificate, changed) = self
            .store
            .update_lifecycle(serial, |lifecycle| {
                lifecycle.mark_printed(Utc::now(), require_download)
            })
            .await?;

        if changed {
            info!(serial = %serial, actor = %actor.id, "Certificate printed");
            self.audit
                .record(&certificate.id, AuditAction::CertificatePrinted, &actor.id, None)
                .await;
        }
        Ok(certificate)
    }

    /// Render a certificate through the template bound at issuance.
    pub async fn render(&self, serial: &str) -> Result<String> {
        self.render_with(serial, &BTreeMap::new()).await
    }

    /// Render with caller-supplied values taking precedence over the payload.
    pub async fn render_with(
        &self,
        serial: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String> {
        let certificate = self.certificate(serial).await?;
        let template = self.templates.by_name(&certificate.template_name)?;

        let mut payload = certificate.payload.clone();
        if !payload.contains_key(DATE_NOW) {
            if let Some(issued) = payload.get("issue_date").cloned() {
                payload.insert(DATE_NOW.to_string(), issued);
            }
        }
        payload.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(template.render(&payload))
    }

    /// Certificate by serial, regardless of the bound result's status.
    pub async fn certificate(&self, serial: &str) -> Result<Certificate> {
        self.store
            .certificate_by_serial(serial)
            .await
            .ok_or_else(|| HonorError::NotFound(format!("certificate {}", serial)))
    }

    /// Certificate for a key, regardless of the bound result's status.
    pub async fn certificate_for(&self, key: &ResultKey) -> Option<Certificate> {
        self.store.certificate_for_key(key).await
    }

    /// Every certificate of a student, for registrar and audit views.
    pub async fn certificates_for_student(&self, student_id: &str) -> Vec<Certificate> {
        self.store.certificates_for_student(student_id).await
    }

    /// Certificates a student may see: those whose result is approved now.
    pub async fn visible_certificates_for_student(&self, student_id: &str) -> Vec<Certificate> {
        let mut visible = Vec::new();
        for certificate in self.store.certificates_for_student(student_id).await {
            let approved = self
                .store
                .get_by_id(&certificate.result_id)
                .await
                .is_some_and(|r| r.is_approved());
            if approved {
                visible.push(certificate);
            } else {
                debug!(
                    serial = %certificate.serial_number,
                    "Hiding certificate of unapproved result"
                );
            }
        }
        visible
    }

    /// Certificates a parent may see across their linked students.
    pub async fn visible_certificates_for_parent(
        &self,
        parent_id: &str,
    ) -> Result<Vec<Certificate>> {
        let wards = self.directory.wards(parent_id).await?;
        let per_student = join_all(
            wards
                .iter()
                .map(|student_id| self.visible_certificates_for_student(student_id)),
        )
        .await;
        Ok(per_student.into_iter().flatten().collect())
    }
}

/// Format a date, reporting a bad format string instead of panicking.
pub(crate) fn format_date(date: NaiveDate, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", date.format(format))
        .map_err(|_| HonorError::Template(format!("invalid date format '{}'", format)))?;
    Ok(out)
}
