//! In-memory store and collector doubles.
//!
//! They follow the same contracts as the Postgres stores (sorted listings,
//! `NotFound` on empty credential sets, `record_success` ignoring missing
//! rows) and can be switched into an unavailable state to simulate outages.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secops_collect::{CollectRequest, Collector, CollectorError};
use secops_core::{
    CredentialRef, CredentialStore, Credentials, CustomerIntegrationBinding, IntegrationRegistry,
    JobMetadata, JobStore, NewBinding, NormalizedRecord, StoreError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn outage(flag: &AtomicBool) -> Result<(), StoreError> {
    if flag.load(Ordering::SeqCst) {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    } else {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<BTreeMap<String, JobMetadata>>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Reads a row without going through the async trait.
    #[must_use]
    pub fn snapshot(&self, job_id: &str) -> Option<JobMetadata> {
        lock(&self.jobs).get(job_id).cloned()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, job_id: &str) -> Result<JobMetadata, StoreError> {
        outage(&self.unavailable)?;
        lock(&self.jobs).get(job_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn upsert(
        &self,
        job_id: &str,
        time_interval: u32,
        enabled: bool,
    ) -> Result<JobMetadata, StoreError> {
        outage(&self.unavailable)?;
        if time_interval == 0 {
            return Err(StoreError::Invalid("time_interval must be > 0".to_string()));
        }
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .entry(job_id.to_string())
            .and_modify(|job| {
                job.time_interval = time_interval;
                job.enabled = enabled;
            })
            .or_insert_with(|| JobMetadata {
                job_id: job_id.to_string(),
                time_interval,
                enabled,
                last_success: None,
            });
        Ok(job.clone())
    }

    async fn insert_if_absent(
        &self,
        job_id: &str,
        time_interval: u32,
        enabled: bool,
    ) -> Result<bool, StoreError> {
        outage(&self.unavailable)?;
        if time_interval == 0 {
            return Err(StoreError::Invalid("time_interval must be > 0".to_string()));
        }
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(job_id) {
            return Ok(false);
        }
        jobs.insert(
            job_id.to_string(),
            JobMetadata {
                job_id: job_id.to_string(),
                time_interval,
                enabled,
                last_success: None,
            },
        );
        Ok(true)
    }

    async fn set_enabled(&self, job_id: &str, enabled: bool) -> Result<(), StoreError> {
        outage(&self.unavailable)?;
        let mut jobs = lock(&self.jobs);
        let job = jobs.get_mut(job_id).ok_or(StoreError::NotFound)?;
        job.enabled = enabled;
        Ok(())
    }

    async fn record_success(&self, job_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        outage(&self.unavailable)?;
        if let Some(job) = lock(&self.jobs).get_mut(job_id) {
            job.last_success = Some(job.last_success.map_or(at, |prev| prev.max(at)));
        }
        Ok(())
    }

    async fn list_enabled(&self) -> Result<Vec<JobMetadata>, StoreError> {
        outage(&self.unavailable)?;
        Ok(lock(&self.jobs)
            .values()
            .filter(|job| job.enabled)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<JobMetadata>, StoreError> {
        outage(&self.unavailable)?;
        Ok(lock(&self.jobs).values().cloned().collect())
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        outage(&self.unavailable)?;
        Ok(lock(&self.jobs).remove(job_id).is_some())
    }
}

/// Bindings and their credential sets, keyed by `(customer_code, integration)`.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    bindings: Mutex<BTreeMap<(String, String), (CustomerIntegrationBinding, Credentials)>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Convenience for tests: bind with a typical `API_URL`/`API_KEY` pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the pair is already bound.
    pub async fn bind(
        &self,
        customer_code: &str,
        integration: &str,
    ) -> Result<CustomerIntegrationBinding, StoreError> {
        self.create_binding(&NewBinding {
            customer_code: customer_code.to_string(),
            integration_name: integration.to_string(),
            credentials: [
                ("API_URL", "https://vendor.invalid/events"),
                ("API_KEY", "test-key"),
            ]
            .into_iter()
            .collect(),
        })
        .await
    }
}

#[async_trait]
impl IntegrationRegistry for MemoryRegistry {
    async fn list_customers_for(&self, integration_name: &str) -> Result<Vec<String>, StoreError> {
        outage(&self.unavailable)?;
        // BTreeMap keys are (customer, integration), so customers come out sorted.
        Ok(lock(&self.bindings)
            .values()
            .filter(|(b, _)| b.integration_name == integration_name && b.enabled)
            .map(|(b, _)| b.customer_code.clone())
            .collect())
    }

    async fn get_binding(
        &self,
        customer_code: &str,
        integration_name: &str,
    ) -> Result<CustomerIntegrationBinding, StoreError> {
        outage(&self.unavailable)?;
        lock(&self.bindings)
            .get(&(customer_code.to_string(), integration_name.to_string()))
            .map(|(b, _)| b.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn create_binding(
        &self,
        binding: &NewBinding,
    ) -> Result<CustomerIntegrationBinding, StoreError> {
        outage(&self.unavailable)?;
        let key = (
            binding.customer_code.clone(),
            binding.integration_name.clone(),
        );
        let mut bindings = lock(&self.bindings);
        if bindings.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "customer {} already has integration {}",
                binding.customer_code, binding.integration_name
            )));
        }
        let created = CustomerIntegrationBinding {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            customer_code: binding.customer_code.clone(),
            integration_name: binding.integration_name.clone(),
            enabled: true,
            created_at: Utc::now(),
        };
        bindings.insert(key, (created.clone(), binding.credentials.clone()));
        Ok(created)
    }

    async fn delete_binding(
        &self,
        customer_code: &str,
        integration_name: &str,
    ) -> Result<bool, StoreError> {
        outage(&self.unavailable)?;
        Ok(lock(&self.bindings)
            .remove(&(customer_code.to_string(), integration_name.to_string()))
            .is_some())
    }
}

#[async_trait]
impl CredentialStore for MemoryRegistry {
    async fn resolve(&self, credential_ref: CredentialRef) -> Result<Credentials, StoreError> {
        outage(&self.unavailable)?;
        lock(&self.bindings)
            .values()
            .find(|(b, _)| b.credential_ref() == credential_ref)
            .map(|(_, creds)| creds.clone())
            .filter(|creds| !creds.is_empty())
            .ok_or(StoreError::NotFound)
    }
}

/// Collector whose per-customer result is scripted by the test.
///
/// Unscripted customers yield one record. Tracks invocations and the peak
/// number of concurrent fetches.
#[derive(Debug)]
pub struct ScriptedCollector {
    integration: String,
    script: Mutex<HashMap<String, Result<usize, CollectorError>>>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedCollector {
    #[must_use]
    pub fn new(integration: &str) -> Self {
        Self {
            integration: integration.to_string(),
            script: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Every fetch sleeps for `delay` on the tokio clock.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `Ok(n)` returns `n` records for the customer; `Err` fails the fetch.
    pub fn script(&self, customer_code: &str, result: Result<usize, CollectorError>) {
        lock(&self.script).insert(customer_code.to_string(), result);
    }

    /// Customer codes in invocation order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    #[must_use]
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    fn integration(&self) -> &str {
        &self.integration
    }

    async fn fetch(
        &self,
        request: &CollectRequest,
    ) -> Result<Vec<NormalizedRecord>, CollectorError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        lock(&self.calls).push(request.customer_code.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = lock(&self.script)
            .get(&request.customer_code)
            .cloned()
            .unwrap_or(Ok(1));
        self.active.fetch_sub(1, Ordering::SeqCst);

        let count = scripted?;
        Ok((0..count)
            .map(|seq| NormalizedRecord {
                integration: self.integration.clone(),
                customer_code: request.customer_code.clone(),
                observed_at: request.time_range.end,
                payload: serde_json::json!({ "seq": seq }),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_round_trip_keeps_last_success() {
        let store = MemoryJobStore::new();
        let job_id = "invoke_duo_integration_collect";
        store.upsert(job_id, 15, true).await.unwrap();
        let stamp = Utc::now();
        store.record_success(job_id, stamp).await.unwrap();

        let updated = store.upsert(job_id, 30, true).await.unwrap();
        assert_eq!(updated.time_interval, 30);
        assert!(updated.enabled);
        assert_eq!(updated.last_success, Some(stamp));
        assert_eq!(store.get(job_id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn record_success_on_missing_row_is_ok() {
        let store = MemoryJobStore::new();
        store
            .record_success("invoke_ghost_integration_collect", Utc::now())
            .await
            .unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn registry_lists_sorted_customers_and_resolves_credentials() {
        let registry = MemoryRegistry::new();
        registry.bind("00002", "duo").await.unwrap();
        let first = registry.bind("00001", "duo").await.unwrap();
        registry.bind("00003", "cato").await.unwrap();

        assert_eq!(
            registry.list_customers_for("duo").await.unwrap(),
            vec!["00001".to_string(), "00002".to_string()]
        );
        let creds = registry.resolve(first.credential_ref()).await.unwrap();
        assert_eq!(creds.get("API_KEY"), Some("test-key"));
        assert!(matches!(
            registry.bind("00001", "duo").await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn outage_flag_fails_every_call() {
        let registry = MemoryRegistry::new();
        registry.set_unavailable(true);
        assert!(matches!(
            registry.list_customers_for("duo").await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
