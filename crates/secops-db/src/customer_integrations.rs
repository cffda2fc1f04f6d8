//! Database operations for `customer_integrations` and `integration_auth_keys`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secops_core::{
    CredentialRef, CredentialStore, Credentials, CustomerIntegrationBinding, IntegrationRegistry,
    NewBinding, StoreError,
};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `customer_integrations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerIntegrationRow {
    pub id: i64,
    pub customer_code: String,
    pub integration_name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CustomerIntegrationRow> for CustomerIntegrationBinding {
    fn from(row: CustomerIntegrationRow) -> Self {
        Self {
            id: row.id,
            customer_code: row.customer_code,
            integration_name: row.integration_name,
            enabled: row.enabled,
            created_at: row.created_at,
        }
    }
}

/// Customer codes with an enabled binding for `integration_name`, sorted by
/// `customer_code` so cycles visit tenants in a stable order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_customers_for_integration(
    pool: &PgPool,
    integration_name: &str,
) -> Result<Vec<String>, DbError> {
    let codes = sqlx::query_scalar::<_, String>(
        "SELECT customer_code FROM customer_integrations \
         WHERE integration_name = $1 AND enabled \
         ORDER BY customer_code",
    )
    .bind(integration_name)
    .fetch_all(pool)
    .await?;

    Ok(codes)
}

/// Fetches the binding for one `(customer_code, integration_name)` pair.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the pair is not bound, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_customer_integration(
    pool: &PgPool,
    customer_code: &str,
    integration_name: &str,
) -> Result<CustomerIntegrationRow, DbError> {
    let row = sqlx::query_as::<_, CustomerIntegrationRow>(
        "SELECT id, customer_code, integration_name, enabled, created_at \
         FROM customer_integrations \
         WHERE customer_code = $1 AND integration_name = $2",
    )
    .bind(customer_code)
    .bind(integration_name)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Creates a binding and writes its auth keys in one transaction.
///
/// # Errors
///
/// Returns [`DbError::DuplicateBinding`] if the pair is already bound, or
/// [`DbError::Sqlx`] if any statement fails.
pub async fn create_customer_integration(
    pool: &PgPool,
    binding: &NewBinding,
) -> Result<CustomerIntegrationRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, CustomerIntegrationRow>(
        "INSERT INTO customer_integrations (customer_code, integration_name) \
         VALUES ($1, $2) \
         ON CONFLICT (customer_code, integration_name) DO NOTHING \
         RETURNING id, customer_code, integration_name, enabled, created_at",
    )
    .bind(&binding.customer_code)
    .bind(&binding.integration_name)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Err(DbError::DuplicateBinding {
            customer_code: binding.customer_code.clone(),
            integration_name: binding.integration_name.clone(),
        });
    };

    let (names, values): (Vec<String>, Vec<String>) = binding
        .credentials
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .unzip();

    if !names.is_empty() {
        sqlx::query(
            "INSERT INTO integration_auth_keys (customer_integration_id, auth_key_name, auth_value) \
             SELECT $1, * FROM UNNEST($2::text[], $3::text[])",
        )
        .bind(row.id)
        .bind(&names)
        .bind(&values)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Deletes a binding; its auth keys cascade. Returns `true` if it existed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_customer_integration(
    pool: &PgPool,
    customer_code: &str,
    integration_name: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "DELETE FROM customer_integrations \
         WHERE customer_code = $1 AND integration_name = $2",
    )
    .bind(customer_code)
    .bind(integration_name)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns `(auth_key_name, auth_value)` pairs for a binding.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_auth_keys(
    pool: &PgPool,
    customer_integration_id: i64,
) -> Result<Vec<(String, String)>, DbError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT auth_key_name, auth_value FROM integration_auth_keys \
         WHERE customer_integration_id = $1 \
         ORDER BY auth_key_name",
    )
    .bind(customer_integration_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// [`IntegrationRegistry`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgIntegrationRegistry {
    pool: PgPool,
}

impl PgIntegrationRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntegrationRegistry for PgIntegrationRegistry {
    async fn list_customers_for(&self, integration_name: &str) -> Result<Vec<String>, StoreError> {
        Ok(list_customers_for_integration(&self.pool, integration_name).await?)
    }

    async fn get_binding(
        &self,
        customer_code: &str,
        integration_name: &str,
    ) -> Result<CustomerIntegrationBinding, StoreError> {
        let row = get_customer_integration(&self.pool, customer_code, integration_name).await?;
        Ok(row.into())
    }

    async fn create_binding(
        &self,
        binding: &NewBinding,
    ) -> Result<CustomerIntegrationBinding, StoreError> {
        let row = create_customer_integration(&self.pool, binding).await?;
        Ok(row.into())
    }

    async fn delete_binding(
        &self,
        customer_code: &str,
        integration_name: &str,
    ) -> Result<bool, StoreError> {
        Ok(delete_customer_integration(&self.pool, customer_code, integration_name).await?)
    }
}

/// [`CredentialStore`] reading `integration_auth_keys`.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn resolve(&self, credential_ref: CredentialRef) -> Result<Credentials, StoreError> {
        let keys = list_auth_keys(&self.pool, credential_ref.0).await?;
        if keys.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(keys.into_iter().collect())
    }
}
