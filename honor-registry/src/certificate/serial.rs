//! Certificate serial numbers.
//!
//! `{PREFIX}-{YEAR}-{SEQUENCE}-{CHECK}`: the sequence is monotonic for the
//! lifetime of the generator and the check segment is a SHA-256 digest over
//! the certificate key, so a serial also identifies what it was issued for.

use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::ResultKey;

/// Hex digits of the digest kept in a serial.
const CHECK_LEN: usize = 8;

/// Issues serial numbers.
#[derive(Debug)]
pub struct SerialGenerator {
    prefix: String,
    sequence: AtomicU64,
}

impl SerialGenerator {
    /// Create a generator starting at sequence 1.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_after(prefix, 0)
    }

    /// Resume after the last sequence issued by a previous process.
    pub fn starting_after(prefix: impl Into<String>, last_issued: u64) -> Self {
        Self {
            prefix: prefix.into().trim().to_ascii_uppercase(),
            sequence: AtomicU64::new(last_issued),
        }
    }

    /// Serial prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Last sequence handed out.
    pub fn last_issued(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Next serial for a certificate key.
    pub fn next(&self, key: &ResultKey, issued_on: NaiveDate) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!(
            "{}-{}-{:06}-{}",
            self.prefix,
            issued_on.year(),
            sequence,
            check_digits(&self.prefix, key, sequence)
        )
    }
}

fn check_digits(prefix: &str, key: &ResultKey, sequence: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(key.student_id.as_bytes());
    hasher.update(key.level.key().as_bytes());
    hasher.update(key.school_year.as_bytes());
    hasher.update(sequence.to_be_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(CHECK_LEN);
    digest.to_ascii_uppercase()
}
