//! Honors registry - qualification, approval and certificate issuance.
//!
//! The stateful half of the honors core:
//!
//! - **Recomputation**: batch upsert of honor candidates per (level, school year)
//! - **Approval**: role-routed `pending → approved | rejected` with overrides
//! - **Certificates**: one certificate per approved result, with a monotonic
//!   generated → downloaded → printed lifecycle
//! - **Notifications**: post-commit events for students, parents and approvers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       HonorRegistry                          │
//! │                                                              │
//! │  GradeSource ──▶ RecomputeJob ──▶ HonorStore ◀── Approval    │
//! │                  (qualifier)         │          Workflow     │
//! │                                      ▼              │        │
//! │                            CertificateIssuer        │        │
//! │                                      │              │        │
//! │                                      └──▶ Notifier ◀┘        │
//! │                                         (dispatcher)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use honor_registry::{Actor, HonorRegistry, InMemoryGradeBook, IssueRequest};
//! use honor_registry::{StaticDirectory, StudentProfile};
//! use honor_rules::{AcademicPeriod, GradeRecord};
//!
//! # tokio_test::block_on(async {
//! let grades = Arc::new(InMemoryGradeBook::with_records(vec![
//!     GradeRecord::new("s-1", "Math", "elementary", "2024-2025", Some(99.0)),
//! ]));
//! let directory = Arc::new(StaticDirectory::with_profiles(vec![
//!     StudentProfile::new("s-1", "Ana Cruz", "2024-0001"),
//! ]));
//! let registry = HonorRegistry::builder()
//!     .grade_source(grades)
//!     .directory(directory)
//!     .build()
//!     .unwrap();
//!
//! let period = AcademicPeriod::new("elementary", "2024-2025");
//! registry.recompute(&period).await.unwrap();
//!
//! let results = registry.results_for_student("s-1").await;
//! let approved = registry
//!     .approve(&results[0].id, &Actor::new("u-1", "principal"))
//!     .await
//!     .unwrap();
//! let certificate = registry
//!     .issue_certificate(&approved.id, IssueRequest::default())
//!     .await
//!     .unwrap();
//! assert!(certificate.serial_number.starts_with("HON-"));
//! # });
//! ```

pub mod approval;
pub mod audit;
pub mod certificate;
pub mod config;
pub mod directory;
pub mod grades;
pub mod notify;
pub mod projection;
pub mod recompute;
pub mod registry;
pub mod routing;
pub mod store;
pub mod types;

// Re-export main types
pub use approval::ApprovalWorkflow;
pub use audit::{AuditAction, AuditEntry, AuditTrail};
pub use certificate::{CertificateIssuer, CertificateTemplate, IssueRequest, SerialGenerator};
pub use config::{ApprovalConfig, AuditConfig, CertificateConfig, HonorConfig};
pub use directory::{DirectoryError, StaticDirectory, StudentDirectory, StudentProfile};
pub use grades::{GradeSource, GradeSourceError, InMemoryGradeBook};
pub use notify::{
    EventSnapshot, HonorEvent, HonorEventKind, NotificationDispatcher, NotificationFailure,
    NotifyError, RecordingDispatcher, TracingDispatcher,
};
pub use projection::{CertificateView, HonorResultView, HonorStats};
pub use recompute::{RecomputeJob, RecomputeReport};
pub use registry::{HonorRegistry, HonorRegistryBuilder};
pub use routing::{ApproverRole, ApproverRouting};
pub use store::HonorStore;
pub use types::*;
