//! Storage contracts shared by the scheduler, the provisioning layer, and the
//! Postgres implementations in `secops-db`.
//!
//! Every method is a suspension point. Implementations own their own
//! transactional guarantees; callers hold no locks across these calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    CredentialRef, Credentials, CustomerIntegrationBinding, JobMetadata, NewBinding,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid value: {0}")]
    Invalid(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Durable schedule metadata keyed by `job_id`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no row exists for `job_id`.
    async fn get(&self, job_id: &str) -> Result<JobMetadata, StoreError>;

    /// Creates the row if absent, otherwise updates `time_interval` and
    /// `enabled` in place. Never touches `last_success`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `time_interval` is zero.
    async fn upsert(
        &self,
        job_id: &str,
        time_interval: u32,
        enabled: bool,
    ) -> Result<JobMetadata, StoreError>;

    /// Creates the row only when it does not exist yet. Returns `true` if a
    /// row was created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `time_interval` is zero.
    async fn insert_if_absent(
        &self,
        job_id: &str,
        time_interval: u32,
        enabled: bool,
    ) -> Result<bool, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no row exists for `job_id`.
    async fn set_enabled(&self, job_id: &str, enabled: bool) -> Result<(), StoreError>;

    /// Advances `last_success`. A missing row is logged and reported as `Ok`
    /// so a scheduler cycle never fails on bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store itself cannot be reached.
    async fn record_success(&self, job_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Enabled jobs ordered by `job_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be reached.
    async fn list_enabled(&self) -> Result<Vec<JobMetadata>, StoreError>;

    /// All jobs ordered by `job_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be reached.
    async fn list_all(&self) -> Result<Vec<JobMetadata>, StoreError>;

    /// Removes the row. Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be reached.
    async fn delete(&self, job_id: &str) -> Result<bool, StoreError>;
}

/// Customer to integration bindings.
#[async_trait]
pub trait IntegrationRegistry: Send + Sync {
    /// Customer codes with an enabled binding for `integration_name`, sorted
    /// ascending.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry cannot be reached.
    async fn list_customers_for(&self, integration_name: &str) -> Result<Vec<String>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the pair is not bound.
    async fn get_binding(
        &self,
        customer_code: &str,
        integration_name: &str,
    ) -> Result<CustomerIntegrationBinding, StoreError>;

    /// Creates a binding and its credential set atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the pair is already bound.
    async fn create_binding(
        &self,
        binding: &NewBinding,
    ) -> Result<CustomerIntegrationBinding, StoreError>;

    /// Removes a binding and its credentials. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry cannot be reached.
    async fn delete_binding(
        &self,
        customer_code: &str,
        integration_name: &str,
    ) -> Result<bool, StoreError>;
}

/// Resolves opaque credential references into vendor auth keys.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no keys exist for the reference.
    async fn resolve(&self, credential_ref: CredentialRef) -> Result<Credentials, StoreError>;
}
