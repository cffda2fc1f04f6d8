//! Database operations for `scheduled_job_metadata`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secops_core::{JobMetadata, JobStore, StoreError};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `scheduled_job_metadata` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobMetadataRow {
    pub job_id: String,
    /// The schema defines this as `INTEGER NOT NULL CHECK (time_interval > 0)`.
    pub time_interval: i32,
    pub enabled: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobMetadataRow> for JobMetadata {
    type Error = DbError;

    fn try_from(row: JobMetadataRow) -> Result<Self, Self::Error> {
        let time_interval = u32::try_from(row.time_interval)
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or(DbError::InvalidInterval(i64::from(row.time_interval)))?;

        Ok(JobMetadata {
            job_id: row.job_id,
            time_interval,
            enabled: row.enabled,
            last_success: row.last_success,
        })
    }
}

const SELECT_COLUMNS: &str =
    "job_id, time_interval, enabled, last_success, created_at, updated_at";

fn interval_column(time_interval: u32) -> Result<i32, DbError> {
    i32::try_from(time_interval)
        .ok()
        .filter(|minutes| *minutes > 0)
        .ok_or(DbError::InvalidInterval(i64::from(time_interval)))
}

/// Fetches one job's metadata.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_job_metadata(pool: &PgPool, job_id: &str) -> Result<JobMetadataRow, DbError> {
    let row = sqlx::query_as::<_, JobMetadataRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM scheduled_job_metadata WHERE job_id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Inserts a job or updates `time_interval` and `enabled` in place.
///
/// `last_success` is left untouched on conflict.
///
/// # Errors
///
/// Returns [`DbError::InvalidInterval`] for a zero interval, or
/// [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_job_metadata(
    pool: &PgPool,
    job_id: &str,
    time_interval: u32,
    enabled: bool,
) -> Result<JobMetadataRow, DbError> {
    let minutes = interval_column(time_interval)?;

    let row = sqlx::query_as::<_, JobMetadataRow>(&format!(
        "INSERT INTO scheduled_job_metadata (job_id, time_interval, enabled) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (job_id) DO UPDATE SET \
             time_interval = EXCLUDED.time_interval, \
             enabled       = EXCLUDED.enabled, \
             updated_at    = NOW() \
         RETURNING {SELECT_COLUMNS}"
    ))
    .bind(job_id)
    .bind(minutes)
    .bind(enabled)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Inserts a job only when no row exists yet. Returns `true` if inserted.
///
/// # Errors
///
/// Returns [`DbError::InvalidInterval`] for a zero interval, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn insert_job_metadata_if_absent(
    pool: &PgPool,
    job_id: &str,
    time_interval: u32,
    enabled: bool,
) -> Result<bool, DbError> {
    let minutes = interval_column(time_interval)?;

    let result = sqlx::query(
        "INSERT INTO scheduled_job_metadata (job_id, time_interval, enabled) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (job_id) DO NOTHING",
    )
    .bind(job_id)
    .bind(minutes)
    .bind(enabled)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Flips the `enabled` flag.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the update fails.
pub async fn set_job_enabled(pool: &PgPool, job_id: &str, enabled: bool) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE scheduled_job_metadata \
         SET enabled = $1, updated_at = NOW() \
         WHERE job_id = $2",
    )
    .bind(enabled)
    .bind(job_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Advances `last_success` for a job inside a transaction.
///
/// The row is locked with `FOR UPDATE` before the write so a concurrent
/// [`upsert_job_metadata`] cannot interleave with the read-modify-write.
/// `last_success` never moves backwards. Returns `false` when the job does
/// not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the transaction fails.
pub async fn record_job_success(
    pool: &PgPool,
    job_id: &str,
    at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;

    let current: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
        "SELECT last_success FROM scheduled_job_metadata WHERE job_id = $1 FOR UPDATE",
    )
    .bind(job_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(previous) = current else {
        tx.rollback().await?;
        return Ok(false);
    };

    let next = previous.map_or(at, |prev| prev.max(at));

    sqlx::query(
        "UPDATE scheduled_job_metadata \
         SET last_success = $1, updated_at = NOW() \
         WHERE job_id = $2",
    )
    .bind(next)
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Returns enabled jobs ordered by `job_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_enabled_job_metadata(pool: &PgPool) -> Result<Vec<JobMetadataRow>, DbError> {
    let rows = sqlx::query_as::<_, JobMetadataRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM scheduled_job_metadata \
         WHERE enabled \
         ORDER BY job_id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns every job ordered by `job_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_job_metadata(pool: &PgPool) -> Result<Vec<JobMetadataRow>, DbError> {
    let rows = sqlx::query_as::<_, JobMetadataRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM scheduled_job_metadata ORDER BY job_id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Deletes a job row. Returns `true` if a row was removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_job_metadata(pool: &PgPool, job_id: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM scheduled_job_metadata WHERE job_id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// [`JobStore`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_metadata(rows: Vec<JobMetadataRow>) -> Result<Vec<JobMetadata>, StoreError> {
    rows.into_iter()
        .map(|row| JobMetadata::try_from(row).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get(&self, job_id: &str) -> Result<JobMetadata, StoreError> {
        let row = get_job_metadata(&self.pool, job_id).await?;
        Ok(JobMetadata::try_from(row)?)
    }

    async fn upsert(
        &self,
        job_id: &str,
        time_interval: u32,
        enabled: bool,
    ) -> Result<JobMetadata, StoreError> {
        let row = upsert_job_metadata(&self.pool, job_id, time_interval, enabled).await?;
        Ok(JobMetadata::try_from(row)?)
    }

    async fn insert_if_absent(
        &self,
        job_id: &str,
        time_interval: u32,
        enabled: bool,
    ) -> Result<bool, StoreError> {
        Ok(insert_job_metadata_if_absent(&self.pool, job_id, time_interval, enabled).await?)
    }

    async fn set_enabled(&self, job_id: &str, enabled: bool) -> Result<(), StoreError> {
        Ok(set_job_enabled(&self.pool, job_id, enabled).await?)
    }

    async fn record_success(&self, job_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if !record_job_success(&self.pool, job_id, at).await? {
            tracing::warn!(job_id, "job metadata missing; last_success not recorded");
        }
        Ok(())
    }

    async fn list_enabled(&self) -> Result<Vec<JobMetadata>, StoreError> {
        into_metadata(list_enabled_job_metadata(&self.pool).await?)
    }

    async fn list_all(&self) -> Result<Vec<JobMetadata>, StoreError> {
        into_metadata(list_job_metadata(&self.pool).await?)
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(delete_job_metadata(&self.pool, job_id).await?)
    }
}
