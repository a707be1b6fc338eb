//! In-memory storage for honor results and certificates.
//!
//! The store is the uniqueness boundary: one result per [`ResultKey`], one
//! certificate per key and one key per serial. Result writes go through a
//! compare-and-swap on the result version.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error};

use crate::types::{
    Certificate, CertificateLifecycle, HonorError, HonorResult, Result, ResultKey, ScopeKey,
};

/// Outcome of a certificate insert.
#[derive(Debug, Clone)]
pub enum Issuance {
    /// A new certificate was stored and the result frozen
    Created {
        certificate: Certificate,
        result: HonorResult,
    },
    /// A certificate already existed for the key
    Existing(Certificate),
}

#[derive(Default)]
struct StoreState {
    results: HashMap<ResultKey, HonorResult>,
    result_keys: HashMap<String, ResultKey>,
    certificates: HashMap<ResultKey, Certificate>,
    serials: HashMap<String, ResultKey>,
}

/// Result and certificate storage.
#[derive(Default)]
pub struct HonorStore {
    state: RwLock<StoreState>,
    scope_locks: DashMap<ScopeKey, Arc<Mutex<()>>>,
}

impl HonorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize writers of one recomputation scope.
    pub async fn lock_scope(&self, scope: &ScopeKey) -> OwnedMutexGuard<()> {
        let lock = self
            .scope_locks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Result by key.
    pub async fn get(&self, key: &ResultKey) -> Option<HonorResult> {
        self.state.read().await.results.get(key).cloned()
    }

    /// Result by ID.
    pub async fn get_by_id(&self, result_id: &str) -> Option<HonorResult> {
        let state = self.state.read().await;
        let key = state.result_keys.get(result_id)?;
        state.results.get(key).cloned()
    }

    /// Result by ID, or `NotFound`.
    pub async fn require(&self, result_id: &str) -> Result<HonorResult> {
        self.get_by_id(result_id)
            .await
            .ok_or_else(|| HonorError::NotFound(format!("honor result {}", result_id)))
    }

    /// Results of a scope, ordered by student.
    pub async fn list_scope(&self, scope: &ScopeKey) -> Vec<HonorResult> {
        let state = self.state.read().await;
        let mut results: Vec<HonorResult> = state
            .results
            .values()
            .filter(|r| scope.contains(&r.key))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    /// Results of one student across scopes.
    pub async fn results_for_student(&self, student_id: &str) -> Vec<HonorResult> {
        let state = self.state.read().await;
        let mut results: Vec<HonorResult> = state
            .results
            .values()
            .filter(|r| r.key.student_id == student_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    /// Insert a new result. The key must be free.
    pub async fn insert_result(&self, result: HonorResult) -> Result<HonorResult> {
        let mut state = self.state.write().await;
        if state.results.contains_key(&result.key) {
            return Err(HonorError::UniquenessViolation(format!(
                "honor result already exists for {}",
                result.key
            )));
        }

        state.result_keys.insert(result.id.clone(), result.key.clone());
        state.results.insert(result.key.clone(), result.clone());
        debug!(result_id = %result.id, key = %result.key, "Stored honor result");
        Ok(result)
    }

    /// Apply `mutate` to a result if its version is still `expected_version`.
    ///
    /// The mutation runs on a copy; an error from it leaves the stored result
    /// untouched. A successful commit bumps the version.
    pub async fn commit_if<F>(
        &self,
        result_id: &str,
        expected_version: u64,
        mutate: F,
    ) -> Result<HonorResult>
    where
        F: FnOnce(&mut HonorResult) -> Result<()>,
    {
        let mut state = self.state.write().await;
        let key = state
            .result_keys
            .get(result_id)
            .cloned()
            .ok_or_else(|| HonorError::NotFound(format!("honor result {}", result_id)))?;
        let current = state
            .results
            .get(&key)
            .ok_or_else(|| HonorError::NotFound(format!("honor result {}", result_id)))?;

        if current.version != expected_version {
            return Err(HonorError::Conflict {
                result_id: result_id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut updated = current.clone();
        mutate(&mut updated)?;
        updated.touch();
        state.results.insert(key, updated.clone());
        Ok(updated)
    }

    /// Delete a result if its version is still `expected_version`.
    pub async fn remove_if(&self, result_id: &str, expected_version: u64) -> Result<HonorResult> {
        let mut state = self.state.write().await;
        let key = state
            .result_keys
            .get(result_id)
            .cloned()
            .ok_or_else(|| HonorError::NotFound(format!("honor result {}", result_id)))?;
        let actual = state.results.get(&key).map(|r| r.version).unwrap_or_default();
        if actual != expected_version {
            return Err(HonorError::Conflict {
                result_id: result_id.to_string(),
                expected: expected_version,
                actual,
            });
        }
        if state.certificates.contains_key(&key) {
            return Err(HonorError::InvalidStateTransition(format!(
                "honor result {} has a certificate and cannot be removed",
                result_id
            )));
        }

        state.result_keys.remove(result_id);
        state
            .results
            .remove(&key)
            .ok_or_else(|| HonorError::NotFound(format!("honor result {}", result_id)))
    }

    /// Store a certificate and freeze its result in one step.
    ///
    /// Returns the existing certificate when one is already stored for the
    /// key. A serial already bound to another key is a fatal
    /// `UniquenessViolation`.
    pub async fn insert_certificate(
        &self,
        certificate: Certificate,
        expected_version: u64,
    ) -> Result<Issuance> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.certificates.get(&certificate.key) {
            return Ok(Issuance::Existing(existing.clone()));
        }

        if let Some(owner) = state.serials.get(&certificate.serial_number) {
            error!(
                serial = %certificate.serial_number,
                owner = %owner,
                key = %certificate.key,
                "Certificate serial collision"
            );
            return Err(HonorError::UniquenessViolation(format!(
                "serial {} already issued for {}",
                certificate.serial_number, owner
            )));
        }

        let result = state.results.get_mut(&certificate.key).ok_or_else(|| {
            HonorError::NotFound(format!("honor result for {}", certificate.key))
        })?;
        if result.id != certificate.result_id {
            return Err(HonorError::NotFound(format!(
                "honor result {}",
                certificate.result_id
            )));
        }
        if result.version != expected_version {
            return Err(HonorError::Conflict {
                result_id: result.id.clone(),
                expected: expected_version,
                actual: result.version,
            });
        }
        if !result.is_approved() {
            return Err(HonorError::InvalidStateTransition(format!(
                "honor result {} is {}, certificates require approval",
                result.id, result.status
            )));
        }

        result.certificate_serial = Some(certificate.serial_number.clone());
        result.touch();
        let result = result.clone();

        state
            .serials
            .insert(certificate.serial_number.clone(), certificate.key.clone());
        state
            .certificates
            .insert(certificate.key.clone(), certificate.clone());

        Ok(Issuance::Created {
            certificate,
            result,
        })
    }

    /// Advance a certificate's lifecycle. Returns the certificate and whether
    /// anything changed.
    pub async fn update_lifecycle<F>(&self, serial: &str, advance: F) -> Result<(Certificate, bool)>
    where
        F: FnOnce(&mut CertificateLifecycle) -> Result<bool>,
    {
        let mut state = self.state.write().await;
        let key = state
            .serials
            .get(serial)
            .cloned()
            .ok_or_else(|| HonorError::NotFound(format!("certificate {}", serial)))?;
        let certificate = state
            .certificates
            .get_mut(&key)
            .ok_or_else(|| HonorError::NotFound(format!("certificate {}", serial)))?;

        let mut lifecycle = certificate.lifecycle.clone();
        let changed = advance(&mut lifecycle)?;
        certificate.lifecycle = lifecycle;
        Ok((certificate.clone(), changed))
    }

    /// Certificate by serial.
    pub async fn certificate_by_serial(&self, serial: &str) -> Option<Certificate> {
        let state = self.state.read().await;
        let key = state.serials.get(serial)?;
        state.certificates.get(key).cloned()
    }

    /// Certificate by key.
    pub async fn certificate_for_key(&self, key: &ResultKey) -> Option<Certificate> {
        self.state.read().await.certificates.get(key).cloned()
    }

    /// Certificates of one student, ordered by key.
    pub async fn certificates_for_student(&self, student_id: &str) -> Vec<Certificate> {
        let state = self.state.read().await;
        let mut certificates: Vec<Certificate> = state
            .certificates
            .values()
            .filter(|c| c.key.student_id == student_id)
            .cloned()
            .collect();
        certificates.sort_by(|a, b| a.key.cmp(&b.key));
        certificates
    }

    /// Certificates of a scope.
    pub async fn certificates_in_scope(&self, scope: &ScopeKey) -> Vec<Certificate> {
        let state = self.state.read().await;
        state
            .certificates
            .values()
            .filter(|c| scope.contains(&c.key))
            .cloned()
            .collect()
    }

    /// Number of stored results.
    pub async fn result_count(&self) -> usize {
        self.state.read().await.results.len()
    }

    /// Number of stored certificates.
    pub async fn certificate_count(&self) -> usize {
        self.state.read().await.certificates.len()
    }

    /// Overwrite a result's status, bypassing the workflow.
    #[cfg(test)]
    pub(crate) async fn force_status(
        &self,
        result_id: &str,
        status: crate::types::ApprovalStatus,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let key = state
            .result_keys
            .get(result_id)
            .cloned()
            .ok_or_else(|| HonorError::NotFound(format!("honor result {}", result_id)))?;
        if let Some(result) = state.results.get_mut(&key) {
            result.status = status;
            result.touch();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApprovalStatus;
    use chrono::Utc;
    use honor_rules::Gpa;
    use std::collections::BTreeMap;

    fn candidate(student: &str) -> HonorResult {
        HonorResult::candidate(
            ResultKey::new(student, "senior_highschool", "2024-2025"),
            Gpa::new(95.0).unwrap(),
            "With Highest Honors",
        )
    }

    fn certificate_for(result: &HonorResult, serial: &str) -> Certificate {
        Certificate {
            id: uuid::Uuid::new_v4().to_string(),
            result_id: result.id.clone(),
            key: result.key.clone(),
            template_name: "standard".to_string(),
            serial_number: serial.to_string(),
            payload: BTreeMap::new(),
            lifecycle: CertificateLifecycle::generated(Utc::now()),
        }
    }

    async fn approved(store: &HonorStore, student: &str) -> HonorResult {
        let result = store.insert_result(candidate(student)).await.unwrap();
        store
            .commit_if(&result.id, result.version, |r| {
                r.status = ApprovalStatus::Approved {
                    approver_id: "u-1".to_string(),
                    approved_at: Utc::now(),
                };
                Ok(())
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_key_is_unique() {
        let store = HonorStore::new();
        store.insert_result(candidate("s1")).await.unwrap();
        assert!(matches!(
            store.insert_result(candidate("s1")).await,
            Err(HonorError::UniquenessViolation(_))
        ));
        assert_eq!(store.result_count().await, 1);
    }

    #[tokio::test]
    async fn test_commit_if_detects_stale_version() {
        let store = HonorStore::new();
        let result = store.insert_result(candidate("s1")).await.unwrap();

        let updated = store
            .commit_if(&result.id, 1, |r| {
                r.honor_type = Some("With High Honors".to_string());
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let stale = store.commit_if(&result.id, 1, |_| Ok(())).await;
        assert!(matches!(
            stale,
            Err(HonorError::Conflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_result_untouched() {
        let store = HonorStore::new();
        let result = store.insert_result(candidate("s1")).await.unwrap();

        let outcome = store
            .commit_if(&result.id, 1, |r| {
                r.honor_type = None;
                Err(HonorError::Validation("nope".to_string()))
            })
            .await;
        assert!(outcome.is_err());

        let stored = store.get_by_id(&result.id).await.unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.honor_type.is_some());
    }

    #[tokio::test]
    async fn test_certificate_insert_is_once_per_key() {
        let store = HonorStore::new();
        let result = approved(&store, "s1").await;

        let first = store
            .insert_certificate(certificate_for(&result, "HON-1"), result.version)
            .await
            .unwrap();
        let frozen = match first {
            Issuance::Created { result, .. } => result,
            Issuance::Existing(_) => panic!("expected a new certificate"),
        };
        assert!(frozen.is_frozen());

        let second = store
            .insert_certificate(certificate_for(&result, "HON-2"), result.version)
            .await
            .unwrap();
        match second {
            Issuance::Existing(c) => assert_eq!(c.serial_number, "HON-1"),
            Issuance::Created { .. } => panic!("expected the existing certificate"),
        }
        assert_eq!(store.certificate_count().await, 1);
    }

    #[tokio::test]
    async fn test_serial_collision_is_fatal() {
        let store = HonorStore::new();
        let a = approved(&store, "s1").await;
        let b = approved(&store, "s2").await;

        store
            .insert_certificate(certificate_for(&a, "HON-1"), a.version)
            .await
            .unwrap();
        let collision = store
            .insert_certificate(certificate_for(&b, "HON-1"), b.version)
            .await;
        assert!(matches!(collision, Err(HonorError::UniquenessViolation(_))));
        assert!(!store.get_by_id(&b.id).await.unwrap().is_frozen());
    }

    #[tokio::test]
    async fn test_pending_result_cannot_hold_certificate() {
        let store = HonorStore::new();
        let result = store.insert_result(candidate("s1")).await.unwrap();
        let outcome = store
            .insert_certificate(certificate_for(&result, "HON-1"), result.version)
            .await;
        assert!(matches!(outcome, Err(HonorError::InvalidStateTransition(_))));
    }

    #[tokio::test]
    async fn test_remove_if() {
        let store = HonorStore::new();
        let result = store.insert_result(candidate("s1")).await.unwrap();
        assert!(store.remove_if(&result.id, 7).await.is_err());
        store.remove_if(&result.id, 1).await.unwrap();
        assert!(store.get_by_id(&result.id).await.is_none());
        assert!(store.get(&result.key).await.is_none());
    }

    #[tokio::test]
    async fn test_scope_lock_serializes() {
        let store = Arc::new(HonorStore::new());
        let scope = ScopeKey::new("elementary", "2024-2025");

        let guard = store.lock_scope(&scope).await;
        let contender = {
            let store = store.clone();
            let scope = scope.clone();
            tokio::spawn(async move {
                let _guard = store.lock_scope(&scope).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }
}
