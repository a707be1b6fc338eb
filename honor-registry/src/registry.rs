//! HonorRegistry - the honors core behind one handle.
//!
//! Wires the store, recomputation job, approval workflow, certificate issuer,
//! notifier and audit trail over the external grade source, student directory
//! and notification dispatcher.

use std::sync::Arc;
use tracing::info;

use honor_rules::{AcademicLevel, AcademicPeriod, HonorQualifier, HonorTypeCriterion};

use crate::approval::ApprovalWorkflow;
use crate::audit::{AuditEntry, AuditTrail};
use crate::certificate::{CertificateIssuer, IssueRequest, SerialGenerator};
use crate::config::HonorConfig;
use crate::directory::{StaticDirectory, StudentDirectory};
use crate::grades::{GradeSource, InMemoryGradeBook};
use crate::notify::{NotificationDispatcher, NotificationFailure, Notifier, TracingDispatcher};
use crate::projection::{CertificateView, HonorResultView, HonorStats};
use crate::recompute::{RecomputeJob, RecomputeReport};
use crate::store::HonorStore;
use crate::types::{Actor, Certificate, HonorResult, Result, ResultKey, ScopeKey};

/// The honors registry.
pub struct HonorRegistry {
    /// Configuration
    config: HonorConfig,
    /// Result and certificate storage
    store: Arc<HonorStore>,
    /// Rule evaluation
    qualifier: Arc<HonorQualifier>,
    /// Batch recomputation
    recompute: RecomputeJob,
    /// Approval state machine
    approvals: ApprovalWorkflow,
    /// Certificate issuance
    issuer: CertificateIssuer,
    /// Post-commit notifications
    notifier: Arc<Notifier>,
    /// Transition history
    audit: Arc<AuditTrail>,
}

impl HonorRegistry {
    /// Create a registry over the given collaborators.
    pub fn new(
        config: HonorConfig,
        grades: Arc<dyn GradeSource>,
        directory: Arc<dyn StudentDirectory>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(HonorStore::new());
        let qualifier = Arc::new(config.qualifier()?);
        let audit = Arc::new(if config.audit.enabled {
            AuditTrail::with_max_entries(config.audit.max_entries)
        } else {
            AuditTrail::disabled()
        });
        let notifier = Arc::new(Notifier::new(dispatcher, directory.clone()));

        let recompute = RecomputeJob::new(store.clone(), grades, qualifier.clone(), audit.clone());
        let approvals = ApprovalWorkflow::new(
            store.clone(),
            qualifier.clone(),
            config.approval.routing.clone(),
            notifier.clone(),
            audit.clone(),
        )
        .with_catalog_restriction(config.approval.restrict_overrides_to_catalog);
        let issuer = CertificateIssuer::new(
            &config.certificates,
            store.clone(),
            directory,
            notifier.clone(),
            audit.clone(),
        );

        info!(
            criteria = config.criteria.len(),
            levels = config.levels.len(),
            serial_prefix = %config.certificates.serial_prefix,
            "Honor registry ready"
        );

        Ok(Self {
            config,
            store,
            qualifier,
            recompute,
            approvals,
            issuer,
            notifier,
            audit,
        })
    }

    /// Start a builder.
    pub fn builder() -> HonorRegistryBuilder {
        HonorRegistryBuilder::new()
    }

    /// Get configuration.
    pub fn config(&self) -> &HonorConfig {
        &self.config
    }

    /// Applicable criteria for a level, best first.
    pub fn ladder(&self, level: &AcademicLevel) -> Vec<HonorTypeCriterion> {
        self.qualifier
            .criteria()
            .ladder(level)
            .into_iter()
            .cloned()
            .collect()
    }

    // ========================================================================
    // Recomputation
    // ========================================================================

    /// Recompute candidates for one period.
    pub async fn recompute(&self, period: &AcademicPeriod) -> Result<RecomputeReport> {
        self.recompute.run(period).await
    }

    // ========================================================================
    // Approval
    // ========================================================================

    /// Approve a result at its current version.
    pub async fn approve(&self, result_id: &str, actor: &Actor) -> Result<HonorResult> {
        self.approvals.approve(result_id, actor).await
    }

    /// Approve a result last seen at `expected_version`.
    pub async fn approve_version(
        &self,
        result_id: &str,
        actor: &Actor,
        expected_version: u64,
    ) -> Result<HonorResult> {
        self.approvals
            .approve_version(result_id, actor, expected_version)
            .await
    }

    /// Reject a result with a reason.
    pub async fn reject(
        &self,
        result_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> Result<HonorResult> {
        self.approvals.reject(result_id, actor, reason).await
    }

    /// Reject a result last seen at `expected_version`.
    pub async fn reject_version(
        &self,
        result_id: &str,
        actor: &Actor,
        reason: &str,
        expected_version: u64,
    ) -> Result<HonorResult> {
        self.approvals
            .reject_version(result_id, actor, reason, expected_version)
            .await
    }

    /// Override the honor type of a pending result.
    pub async fn override_honor(
        &self,
        result_id: &str,
        actor: &Actor,
        honor_type: &str,
        reason: &str,
    ) -> Result<HonorResult> {
        self.approvals
            .override_honor(result_id, actor, honor_type, reason)
            .await
    }

    // ========================================================================
    // Certificates
    // ========================================================================

    /// Issue the certificate of an approved result.
    pub async fn issue_certificate(
        &self,
        result_id: &str,
        request: IssueRequest,
    ) -> Result<Certificate> {
        self.issuer.issue(result_id, request).await
    }

    /// Record a certificate download.
    pub async fn mark_downloaded(&self, serial: &str, actor: &Actor) -> Result<Certificate> {
        self.issuer.mark_downloaded(serial, actor).await
    }

    /// Record a certificate print.
    pub async fn mark_printed(&self, serial: &str, actor: &Actor) -> Result<Certificate> {
        self.issuer.mark_printed(serial, actor).await
    }

    /// Render a certificate.
    pub async fn render(&self, serial: &str) -> Result<String> {
        self.issuer.render(serial).await
    }

    /// Certificate by serial.
    pub async fn certificate(&self, serial: &str) -> Result<Certificate> {
        self.issuer.certificate(serial).await
    }

    /// Certificate for a key.
    pub async fn certificate_for(&self, key: &ResultKey) -> Option<Certificate> {
        self.issuer.certificate_for(key).await
    }

    /// Every certificate of a student.
    pub async fn certificates_for_student(&self, student_id: &str) -> Vec<Certificate> {
        self.issuer.certificates_for_student(student_id).await
    }

    /// Certificates a student may see now.
    pub async fn visible_certificates_for_student(&self, student_id: &str) -> Vec<Certificate> {
        self.issuer.visible_certificates_for_student(student_id).await
    }

    /// Certificates a parent may see now.
    pub async fn visible_certificates_for_parent(
        &self,
        parent_id: &str,
    ) -> Result<Vec<Certificate>> {
        self.issuer.visible_certificates_for_parent(parent_id).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Result by ID.
    pub async fn result(&self, result_id: &str) -> Result<HonorResult> {
        self.store.require(result_id).await
    }

    /// Result by key.
    pub async fn result_for(&self, key: &ResultKey) -> Option<HonorResult> {
        self.store.get(key).await
    }

    /// Results of a scope.
    pub async fn results_in_scope(&self, scope: &ScopeKey) -> Vec<HonorResult> {
        self.store.list_scope(scope).await
    }

    /// Results of a student.
    pub async fn results_for_student(&self, student_id: &str) -> Vec<HonorResult> {
        self.store.results_for_student(student_id).await
    }

    /// Export view of a scope's results.
    pub async fn result_views(&self, scope: &ScopeKey) -> Vec<HonorResultView> {
        self.store
            .list_scope(scope)
            .await
            .iter()
            .map(HonorResultView::from)
            .collect()
    }

    /// Export view of a scope's certificates.
    pub async fn certificate_views(&self, scope: &ScopeKey) -> Vec<CertificateView> {
        let mut views: Vec<CertificateView> = self
            .store
            .certificates_in_scope(scope)
            .await
            .iter()
            .map(CertificateView::from)
            .collect();
        views.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        views
    }

    /// Counts for a scope.
    pub async fn stats(&self, scope: &ScopeKey) -> HonorStats {
        let results = self.store.list_scope(scope).await;
        let certificates = self.store.certificates_in_scope(scope).await;
        HonorStats::tally(scope, &results, &certificates)
    }

    /// History of a result or certificate.
    pub async fn audit_history(&self, entity_id: &str) -> Vec<AuditEntry> {
        self.audit.for_entity(entity_id).await
    }

    /// Recent audit entries.
    pub async fn recent_audit(&self, limit: usize) -> Vec<AuditEntry> {
        self.audit.recent(limit).await
    }

    /// Recent notification failures.
    pub async fn notification_failures(&self, limit: usize) -> Vec<NotificationFailure> {
        self.notifier.failures(limit).await
    }
}

/// Builder for HonorRegistry.
pub struct HonorRegistryBuilder {
    config: HonorConfig,
    grades: Option<Arc<dyn GradeSource>>,
    directory: Option<Arc<dyn StudentDirectory>>,
    dispatcher: Option<Arc<dyn NotificationDispatcher>>,
    last_serial: Option<u64>,
}

impl HonorRegistryBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: HonorConfig::default(),
            grades: None,
            directory: None,
            dispatcher: None,
            last_serial: None,
        }
    }

    /// Set configuration.
    pub fn config(mut self, config: HonorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set grade source.
    pub fn grade_source(mut self, grades: Arc<dyn GradeSource>) -> Self {
        self.grades = Some(grades);
        self
    }

    /// Set student directory.
    pub fn directory(mut self, directory: Arc<dyn StudentDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set notification dispatcher.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Resume the serial sequence after `last_issued`.
    pub fn resume_serials_after(mut self, last_issued: u64) -> Self {
        self.last_serial = Some(last_issued);
        self
    }

    /// Set the serial prefix.
    pub fn serial_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.certificates.serial_prefix = prefix.into();
        self
    }

    /// Require download before print.
    pub fn require_download_before_print(mut self, required: bool) -> Self {
        self.config.certificates.require_download_before_print = required;
        self
    }

    /// Enable/disable audit.
    pub fn audit_enabled(mut self, enabled: bool) -> Self {
        self.config.audit.enabled = enabled;
        self
    }

    /// Build the registry.
    pub fn build(self) -> Result<HonorRegistry> {
        let grades = self
            .grades
            .unwrap_or_else(|| Arc::new(InMemoryGradeBook::new()));
        let directory = self
            .directory
            .unwrap_or_else(|| Arc::new(StaticDirectory::new()));
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(TracingDispatcher));

        let prefix = self.config.certificates.serial_prefix.clone();
        let mut registry = HonorRegistry::new(self.config, grades, directory, dispatcher)?;
        if let Some(last_issued) = self.last_serial {
            registry.issuer = registry
                .issuer
                .with_serials(SerialGenerator::starting_after(prefix, last_issued));
        }
        Ok(registry)
    }
}

impl Default for HonorRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
