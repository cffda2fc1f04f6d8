//! Scheduled, multi-tenant collection engine.
//!
//! A [`Scheduler`] keeps one recurring timer per enabled job. Each firing
//! runs a cycle: enumerate the customers bound to the job's integration,
//! collect for each with bounded concurrency, and record `last_success` once
//! the customer loop completes. Per-customer failures are isolated and only
//! visible in the [`CycleReport`] and the logs.

mod cycle;
mod error;
mod naming;
mod report;
mod scheduler;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use error::SchedulerError;
pub use naming::{integration_for, job_id_for};
pub use report::{CollectionRun, CycleReport, JobStatus, TriggerResult};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerDeps};
