//! Certificate issuance.
//!
//! - [`CertificateIssuer`]: issues one certificate per approved result and
//!   tracks its download/print lifecycle
//! - [`SerialGenerator`]: unique, monotonic serial numbers
//! - [`CertificateTemplate`]: `{{placeholder}}` rendering

pub mod issuer;
pub mod serial;
pub mod template;

pub use issuer::{CertificateIssuer, IssueRequest};
pub use serial::SerialGenerator;
pub use template::{CertificateTemplate, TemplateSet, DATE_NOW};
