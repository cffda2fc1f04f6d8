//! Enabling and disabling integrations for customers.
//!
//! Provisioning creates the binding first, then makes sure the integration's
//! collection job exists and is armed. Decommissioning removes the binding
//! and only retires the job once no customer depends on it.
//!
//! Both operations hold a per-integration lock, so a decommission that
//! retires the job never interleaves with a provision that needs it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use secops_core::{
    Credentials, CustomerIntegrationBinding, IntegrationRegistry, JobMetadata, JobStore,
    NewBinding, StoreError,
};
use secops_scheduler::{job_id_for, Scheduler, SchedulerError};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("no collector registered for integration \"{0}\"")]
    UnknownIntegration(String),

    #[error("{0}")]
    Invalid(String),

    #[error("customer {customer_code} already has integration {integration}")]
    AlreadyBound {
        customer_code: String,
        integration: String,
    },

    #[error("customer {customer_code} does not have integration {integration}")]
    NotBound {
        customer_code: String,
        integration: String,
    },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct Provisioned {
    pub binding: CustomerIntegrationBinding,
    pub job: JobMetadata,
    /// The job row did not exist before this call.
    pub job_created: bool,
    pub armed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decommissioned {
    /// The integration's job was retired because no customers remain.
    pub job_removed: bool,
}

pub struct Provisioner {
    scheduler: Scheduler,
    jobs: Arc<dyn JobStore>,
    registry: Arc<dyn IntegrationRegistry>,
    default_interval: u32,
    integration_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Provisioner {
    #[must_use]
    pub fn new(
        scheduler: Scheduler,
        jobs: Arc<dyn JobStore>,
        registry: Arc<dyn IntegrationRegistry>,
        default_interval: u32,
    ) -> Self {
        Self {
            scheduler,
            jobs,
            registry,
            default_interval,
            integration_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Bind `customer_code` to `integration` and ensure its job is running.
    ///
    /// A new job is created with `time_interval` (or the default) and armed.
    /// An existing enabled job is re-armed only when its interval changes or
    /// it has no live timer. A disabled job stays disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] for unknown integrations, invalid input,
    /// duplicate bindings, and store or scheduler failures.
    pub async fn provision(
        &self,
        customer_code: &str,
        integration: &str,
        credentials: Credentials,
        time_interval: Option<u32>,
    ) -> Result<Provisioned, ProvisionError> {
        let customer_code = customer_code.trim();
        let integration = integration.trim().to_ascii_lowercase();
        if !self.scheduler.supports(&integration) {
            return Err(ProvisionError::UnknownIntegration(integration));
        }
        if customer_code.is_empty() {
            return Err(ProvisionError::Invalid(
                "customer_code must not be empty".to_string(),
            ));
        }
        if credentials.is_empty() {
            return Err(ProvisionError::Invalid(
                "auth_keys must contain at least one key".to_string(),
            ));
        }
        if time_interval == Some(0) {
            return Err(ProvisionError::Invalid(
                "time_interval must be greater than zero".to_string(),
            ));
        }

        let integration_lock = self.integration_lock(&integration);
        let result = {
            let _guard = integration_lock.lock().await;
            self.bind_and_ensure_job(customer_code, &integration, credentials, time_interval)
                .await
        };
        self.release_lock(&integration, &integration_lock);
        result
    }

    async fn bind_and_ensure_job(
        &self,
        customer_code: &str,
        integration: &str,
        credentials: Credentials,
        time_interval: Option<u32>,
    ) -> Result<Provisioned, ProvisionError> {
        let binding = match self
            .registry
            .create_binding(&NewBinding {
                customer_code: customer_code.to_owned(),
                integration_name: integration.to_owned(),
                credentials,
            })
            .await
        {
            Ok(binding) => binding,
            Err(StoreError::Conflict(_)) => {
                return Err(ProvisionError::AlreadyBound {
                    customer_code: customer_code.to_owned(),
                    integration: integration.to_owned(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        match self.ensure_job(integration, time_interval).await {
            Ok((job, job_created, armed)) => {
                tracing::info!(
                    customer_code,
                    integration,
                    job_id = %job.job_id,
                    job_created,
                    armed,
                    "provisioning: integration enabled for customer"
                );
                Ok(Provisioned {
                    binding,
                    job,
                    job_created,
                    armed,
                })
            }
            Err(err) => {
                self.rollback_binding(customer_code, integration).await;
                Err(err)
            }
        }
    }

    /// Remove the binding. When it was the last one for the integration,
    /// cancel the job's timer and delete its metadata row.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::NotBound`] if the binding does not exist.
    pub async fn decommission(
        &self,
        customer_code: &str,
        integration: &str,
    ) -> Result<Decommissioned, ProvisionError> {
        let integration = integration.trim().to_ascii_lowercase();
        let integration_lock = self.integration_lock(&integration);
        let result = {
            let _guard = integration_lock.lock().await;
            self.unbind_and_retire_job(customer_code, &integration).await
        };
        self.release_lock(&integration, &integration_lock);
        result
    }

    async fn unbind_and_retire_job(
        &self,
        customer_code: &str,
        integration: &str,
    ) -> Result<Decommissioned, ProvisionError> {
        if !self
            .registry
            .delete_binding(customer_code, integration)
            .await?
        {
            return Err(ProvisionError::NotBound {
                customer_code: customer_code.to_owned(),
                integration: integration.to_owned(),
            });
        }

        let remaining = self.registry.list_customers_for(integration).await?;
        if !remaining.is_empty() {
            tracing::info!(
                customer_code,
                integration,
                remaining = remaining.len(),
                "provisioning: binding removed; job still has customers"
            );
            return Ok(Decommissioned { job_removed: false });
        }

        let job_id = job_id_for(integration);
        match self.scheduler.remove_job(&job_id).await {
            Ok(_) | Err(SchedulerError::UnknownJob(_)) => {}
            Err(e) => return Err(e.into()),
        }
        let job_removed = self.jobs.delete(&job_id).await?;

        tracing::info!(
            customer_code,
            integration,
            job_id = %job_id,
            job_removed,
            "provisioning: last binding removed; job retired"
        );
        Ok(Decommissioned { job_removed })
    }

    fn integration_lock(&self, integration: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .integration_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(integration.to_owned()).or_default())
    }

    /// Forget the lock once only the map and the caller's clone remain.
    fn release_lock(&self, integration: &str, integration_lock: &Arc<AsyncMutex<()>>) {
        let mut locks = self
            .integration_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(integration_lock) == 2 {
            locks.remove(integration);
        }
    }

    async fn ensure_job(
        &self,
        integration: &str,
        time_interval: Option<u32>,
    ) -> Result<(JobMetadata, bool, bool), ProvisionError> {
        let job_id = job_id_for(integration);
        match self.jobs.get(&job_id).await {
            Ok(job) if !job.enabled => {
                tracing::info!(job_id = %job_id, "provisioning: job is disabled; leaving it unarmed");
                Ok((job, false, false))
            }
            Ok(job) => {
                let wanted = time_interval.unwrap_or(job.time_interval);
                if wanted == job.time_interval && self.scheduler.is_armed(&job_id) {
                    return Ok((job, false, true));
                }
                let job = self
                    .scheduler
                    .add_or_update_job(&job_id, wanted, integration)
                    .await?;
                Ok((job, false, true))
            }
            Err(StoreError::NotFound) => {
                let interval = time_interval.unwrap_or(self.default_interval);
                let job = self
                    .scheduler
                    .add_or_update_job(&job_id, interval, integration)
                    .await?;
                Ok((job, true, true))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn rollback_binding(&self, customer_code: &str, integration: &str) {
        if let Err(e) = self.registry.delete_binding(customer_code, integration).await {
            tracing::error!(
                customer_code,
                integration,
                error = %e,
                "provisioning: failed to roll back binding after job setup failed"
            );
        }
    }
}

#[cfg(test)]
#[path = "provisioning_test.rs"]
mod tests;
