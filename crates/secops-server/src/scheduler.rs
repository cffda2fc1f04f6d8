//! Background collection scheduler wiring.
//!
//! Builds the Postgres-backed stores, the collector registry and the event
//! shipper, seeds the built-in jobs, and arms timers for every enabled job.

use std::sync::Arc;

use secops_collect::{shipper_from_config, CollectorRegistry};
use secops_core::{AppConfig, BuiltinJob, IntegrationRegistry, JobStore, StoreError};
use secops_db::{PgCredentialStore, PgIntegrationRegistry, PgJobStore};
use secops_scheduler::{job_id_for, Scheduler, SchedulerConfig, SchedulerDeps};
use sqlx::PgPool;

/// Handles the API layer shares with the running scheduler.
pub struct Services {
    pub scheduler: Scheduler,
    pub jobs: Arc<dyn JobStore>,
    pub registry: Arc<dyn IntegrationRegistry>,
}

/// Builds the scheduler, seeds built-in jobs, and starts it.
///
/// The returned [`Scheduler`] keeps running until [`Scheduler::shutdown`] is
/// called; dropping the handle does not stop armed timers.
///
/// # Errors
///
/// Returns an error if a collector or the shipper cannot be built, the jobs
/// file is invalid, or the enabled jobs cannot be loaded.
pub async fn build_scheduler(pool: PgPool, config: &AppConfig) -> anyhow::Result<Services> {
    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let registry: Arc<dyn IntegrationRegistry> = Arc::new(PgIntegrationRegistry::new(pool.clone()));
    let credentials = Arc::new(PgCredentialStore::new(pool));

    let collectors = CollectorRegistry::from_config(config)?;
    if collectors.is_empty() {
        tracing::warn!(
            "scheduler: no collectors registered; set SECOPS_HTTP_PULL_INTEGRATIONS to enable integrations"
        );
    } else {
        tracing::info!(integrations = ?collectors.integrations(), "scheduler: collectors registered");
    }
    let shipper = shipper_from_config(config)?;

    let scheduler = Scheduler::new(
        SchedulerDeps {
            job_store: Arc::clone(&jobs),
            registry: Arc::clone(&registry),
            credentials,
            collectors: Arc::new(collectors),
            shipper,
        },
        SchedulerConfig {
            max_concurrent_customers: config.scheduler_max_concurrent_customers,
        },
    );

    let builtin = secops_core::load_jobs_file(&config.jobs_path)?;
    let seeded = seed_builtin_jobs(jobs.as_ref(), &scheduler, &builtin.jobs).await?;
    let armed = scheduler.start().await?;
    tracing::info!(seeded, armed, "scheduler: started");

    Ok(Services {
        scheduler,
        jobs,
        registry,
    })
}

/// Create each built-in job's metadata row unless one already exists.
///
/// Existing rows are left untouched so administrative edits survive restarts.
/// Jobs naming an integration with no registered collector are skipped.
/// Returns the number of rows created.
///
/// # Errors
///
/// Returns [`StoreError`] if the job store rejects an insert.
pub async fn seed_builtin_jobs(
    jobs: &dyn JobStore,
    scheduler: &Scheduler,
    builtin: &[BuiltinJob],
) -> Result<usize, StoreError> {
    let mut created = 0;
    for job in builtin {
        if !scheduler.supports(&job.integration) {
            tracing::warn!(
                integration = %job.integration,
                "scheduler: built-in job names an integration with no collector; skipping"
            );
            continue;
        }
        let job_id = job_id_for(&job.integration);
        if jobs
            .insert_if_absent(&job_id, job.time_interval, job.enabled)
            .await?
        {
            tracing::info!(
                job_id = %job_id,
                time_interval = job.time_interval,
                enabled = job.enabled,
                "scheduler: built-in job created"
            );
            created += 1;
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use secops_collect::TracingShipper;
    use secops_scheduler::memory::{MemoryJobStore, MemoryRegistry, ScriptedCollector};

    use super::*;

    fn scheduler_with(jobs: Arc<MemoryJobStore>) -> Scheduler {
        let registry = Arc::new(MemoryRegistry::new());
        let mut collectors = CollectorRegistry::new();
        collectors
            .register(Arc::new(ScriptedCollector::new("duo")))
            .expect("register duo");
        collectors
            .register(Arc::new(ScriptedCollector::new("cato")))
            .expect("register cato");
        Scheduler::new(
            SchedulerDeps {
                job_store: jobs,
                registry: registry.clone(),
                credentials: registry,
                collectors: Arc::new(collectors),
                shipper: Arc::new(TracingShipper),
            },
            SchedulerConfig::default(),
        )
    }

    fn builtin(integration: &str, time_interval: u32, enabled: bool) -> BuiltinJob {
        BuiltinJob {
            integration: integration.to_string(),
            time_interval,
            enabled,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn seeds_missing_jobs_and_arms_only_enabled_ones() {
        let jobs = Arc::new(MemoryJobStore::new());
        let scheduler = scheduler_with(jobs.clone());

        let created = seed_builtin_jobs(
            jobs.as_ref(),
            &scheduler,
            &[builtin("duo", 15, true), builtin("cato", 30, false)],
        )
        .await
        .unwrap();
        assert_eq!(created, 2);

        assert_eq!(scheduler.start().await.unwrap(), 1);
        assert_eq!(
            scheduler.armed_jobs(),
            vec!["invoke_duo_integration_collect"]
        );
        let cato = jobs.snapshot("invoke_cato_integration_collect").unwrap();
        assert!(!cato.enabled);
        assert_eq!(cato.time_interval, 30);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn existing_rows_are_not_overwritten() {
        let jobs = Arc::new(MemoryJobStore::new());
        jobs.upsert("invoke_duo_integration_collect", 5, false)
            .await
            .unwrap();
        let scheduler = scheduler_with(jobs.clone());

        let created = seed_builtin_jobs(jobs.as_ref(), &scheduler, &[builtin("duo", 15, true)])
            .await
            .unwrap();
        assert_eq!(created, 0);
        let duo = jobs.snapshot("invoke_duo_integration_collect").unwrap();
        assert_eq!(duo.time_interval, 5);
        assert!(!duo.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_integrations_are_skipped() {
        let jobs = Arc::new(MemoryJobStore::new());
        let scheduler = scheduler_with(jobs.clone());

        let created = seed_builtin_jobs(jobs.as_ref(), &scheduler, &[builtin("okta", 15, true)])
            .await
            .unwrap();
        assert_eq!(created, 0);
        assert!(jobs.snapshot("invoke_okta_integration_collect").is_none());
    }
}
