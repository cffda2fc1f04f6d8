//! Job command handlers for the CLI.
//!
//! These talk to the database directly. Interval edits are picked up by a
//! running server on its next restart; use the admin API to re-arm a live
//! timer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use secops_collect::{shipper_from_config, CollectorRegistry};
use secops_db::{DbError, PgCredentialStore, PgIntegrationRegistry, PgJobStore};
use secops_scheduler::{CycleReport, Scheduler, SchedulerConfig, SchedulerDeps, TriggerResult};

/// Sub-commands available under `jobs`.
#[derive(Debug, Subcommand)]
pub enum JobsCommands {
    /// List every job with its interval, state and last success
    List,
    /// Change a job's interval in minutes
    SetInterval {
        /// Job id, e.g. `invoke_duo_integration_collect`
        job_id: String,
        /// New interval in minutes (must be greater than zero)
        minutes: u32,
    },
    /// Run one collection cycle in this process and print the report
    Run {
        job_id: String,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn fmt_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "never".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_jobs_list(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let jobs = secops_db::list_job_metadata(pool).await?;
    if jobs.is_empty() {
        println!("no jobs found; provision a customer or add built-in jobs to the jobs file");
        return Ok(());
    }

    println!(
        "{:<44}{:<10}{:<9}LAST SUCCESS",
        "JOB", "INTERVAL", "ENABLED"
    );
    for job in &jobs {
        println!(
            "{:<44}{:<10}{:<9}{}",
            job.job_id,
            format!("{}m", job.time_interval),
            job.enabled,
            fmt_time(job.last_success)
        );
    }
    Ok(())
}

/// Persist a new interval, keeping the job's enabled flag.
///
/// # Errors
///
/// Returns an error if the job does not exist, the interval is zero, or the
/// update fails.
pub(crate) async fn run_jobs_set_interval(
    pool: &sqlx::PgPool,
    job_id: &str,
    minutes: u32,
) -> anyhow::Result<()> {
    let current = match secops_db::get_job_metadata(pool, job_id).await {
        Ok(row) => row,
        Err(DbError::NotFound) => anyhow::bail!("job '{job_id}' not found; run `jobs list`"),
        Err(e) => return Err(e.into()),
    };

    let updated = secops_db::upsert_job_metadata(pool, job_id, minutes, current.enabled).await?;
    tracing::info!(job_id, from = current.time_interval, to = updated.time_interval, "job interval updated");
    println!(
        "{job_id}: interval {}m -> {}m (a running server applies it on restart or via the API)",
        current.time_interval, updated.time_interval
    );
    Ok(())
}

/// Run one cycle for `job_id` with the configured collectors and shipper.
///
/// Timers are never armed here; the cycle runs once and the process exits.
///
/// # Errors
///
/// Returns an error if the collectors cannot be built, the job is unknown,
/// or the cycle is abandoned.
pub(crate) async fn run_jobs_run(
    pool: &sqlx::PgPool,
    config: &secops_core::AppConfig,
    job_id: &str,
    json: bool,
) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(
        SchedulerDeps {
            job_store: Arc::new(PgJobStore::new(pool.clone())),
            registry: Arc::new(PgIntegrationRegistry::new(pool.clone())),
            credentials: Arc::new(PgCredentialStore::new(pool.clone())),
            collectors: Arc::new(CollectorRegistry::from_config(config)?),
            shipper: shipper_from_config(config)?,
        },
        SchedulerConfig {
            max_concurrent_customers: config.scheduler_max_concurrent_customers,
        },
    );

    match scheduler.trigger_now(job_id).await? {
        TriggerResult::Completed(report) if json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        TriggerResult::Completed(report) => print_report(&report),
        TriggerResult::Skipped => println!("{job_id}: a cycle is already in flight; skipped"),
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!(
        "{}: window {} .. {}",
        report.job_id,
        report.time_range.start.format("%Y-%m-%d %H:%M:%S"),
        report.time_range.end.format("%Y-%m-%d %H:%M:%S"),
    );
    println!(
        "attempted {} customer(s), {} failure(s), {} skipped",
        report.attempted(),
        report.failures(),
        report.skipped.len()
    );
    if report.runs.is_empty() {
        return;
    }

    println!();
    println!("{:<16}{:<18}DETAIL", "CUSTOMER", "OUTCOME");
    for run in &report.runs {
        let detail = match &run.outcome {
            secops_collect::CollectionOutcome::Success {
                fetched,
                shipped,
                ship_error,
            } => match ship_error {
                Some(err) => format!("fetched {fetched}, shipped {shipped} ({err})"),
                None => format!("fetched {fetched}, shipped {shipped}"),
            },
            other => other.error_detail().unwrap_or_default().to_string(),
        };
        println!("{:<16}{:<18}{}", run.customer_code, run.kind(), detail);
    }
}
