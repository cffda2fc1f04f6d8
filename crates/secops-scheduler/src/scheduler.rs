//! The scheduler object: one recurring timer per enabled job, dynamic
//! add/update/remove at runtime, and out-of-band triggering.
//!
//! Each job owns an async mutex. A cycle only runs while holding it via
//! `try_lock`, so a firing that arrives while the previous cycle is still in
//! flight is skipped rather than queued. Timers are cancelled through
//! [`CancellationToken`]s derived from one shutdown token; cancelling a timer
//! never interrupts a cycle that is already running.
//!
//! A second per-job mutex orders administrative changes: an add/update and a
//! remove for the same job never interleave, so the armed timer always
//! agrees with the job's `enabled` flag once both return.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secops_collect::{CollectorRegistry, EventShipper};
use secops_core::{CredentialStore, IntegrationRegistry, JobMetadata, JobStore, StoreError};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::SchedulerError;
use crate::naming::integration_for;
use crate::report::{JobStatus, TriggerResult};

/// Shared collaborators handed to the scheduler once at construction.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub job_store: Arc<dyn JobStore>,
    pub registry: Arc<dyn IntegrationRegistry>,
    pub credentials: Arc<dyn CredentialStore>,
    pub collectors: Arc<CollectorRegistry>,
    pub shipper: Arc<dyn EventShipper>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on concurrent customer collections within one cycle.
    pub max_concurrent_customers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_customers: 5,
        }
    }
}

struct ArmedTimer {
    integration: String,
    time_interval: u32,
    token: CancellationToken,
}

pub(crate) struct Inner {
    pub(crate) deps: SchedulerDeps,
    pub(crate) config: SchedulerConfig,
    timers: Mutex<HashMap<String, ArmedTimer>>,
    cycle_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    admin_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    started: AtomicBool,
    shutdown: CancellationToken,
}

/// Handle to the scheduler. Cloning is cheap and every clone drives the
/// same timer set.
#[derive(Clone)]
pub struct Scheduler {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("armed_jobs", &self.armed_jobs())
            .field("collectors", &self.inner.deps.collectors)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn period_of(time_interval: u32) -> Duration {
    Duration::from_secs(u64::from(time_interval) * 60)
}

impl Scheduler {
    #[must_use]
    pub fn new(deps: SchedulerDeps, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                config,
                timers: Mutex::new(HashMap::new()),
                cycle_locks: Mutex::new(HashMap::new()),
                admin_locks: Mutex::new(HashMap::new()),
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Whether a collector is registered for `integration`.
    #[must_use]
    pub fn supports(&self, integration: &str) -> bool {
        self.inner.deps.collectors.contains(integration)
    }

    /// Arm one timer per enabled job in the store. Returns the number armed.
    ///
    /// Only the first call does anything; later calls log and return `0`.
    /// Jobs whose integration has no registered collector are logged and left
    /// unarmed.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if the enabled jobs cannot be loaded.
    /// The scheduler is then left unstarted so the call can be retried.
    pub async fn start(&self) -> Result<usize, SchedulerError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("scheduler: start called more than once; ignoring");
            return Ok(0);
        }

        let jobs = match self.inner.deps.job_store.list_enabled().await {
            Ok(jobs) => jobs,
            Err(e) => {
                self.inner.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let mut armed = 0usize;
        for job in &jobs {
            let Some(integration) = integration_for(&job.job_id).filter(|i| self.supports(i))
            else {
                tracing::error!(
                    job_id = %job.job_id,
                    "scheduler: no collector registered for job; leaving it unarmed"
                );
                continue;
            };
            if self.arm(&job.job_id, integration, job.time_interval) {
                armed += 1;
            }
        }

        tracing::info!(armed, enabled = jobs.len(), "scheduler: started");
        Ok(armed)
    }

    /// Upsert the job as enabled and (re)arm its timer.
    ///
    /// An existing timer for `job_id` is cancelled and replaced under one
    /// lock, so at most one timer per job is ever live. The new timer first
    /// fires one full interval from now.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::InvalidInterval`] when `time_interval` is zero.
    /// - [`SchedulerError::UnknownIntegration`] when no collector is registered.
    /// - [`SchedulerError::JobIntegrationMismatch`] when `job_id` is not the
    ///   conventional id for `integration`.
    /// - [`SchedulerError::Store`] when the metadata upsert fails.
    pub async fn add_or_update_job(
        &self,
        job_id: &str,
        time_interval: u32,
        integration: &str,
    ) -> Result<JobMetadata, SchedulerError> {
        if time_interval == 0 {
            return Err(SchedulerError::InvalidInterval(time_interval));
        }
        let integration = integration.trim().to_ascii_lowercase();
        if !self.supports(&integration) {
            return Err(SchedulerError::UnknownIntegration(integration));
        }
        if integration_for(job_id) != Some(integration.as_str()) {
            return Err(SchedulerError::JobIntegrationMismatch {
                job_id: job_id.to_owned(),
                integration,
            });
        }

        let admin_lock = self.admin_lock(job_id);
        let _admin = admin_lock.lock().await;

        let job = self
            .inner
            .deps
            .job_store
            .upsert(job_id, time_interval, true)
            .await?;
        let armed = self.arm(job_id, &integration, job.time_interval);

        tracing::info!(
            job_id,
            integration = %integration,
            time_interval = job.time_interval,
            armed,
            "scheduler: job updated"
        );
        Ok(job)
    }

    /// Cancel the job's pending timer and mark it disabled. The metadata row
    /// is kept. An in-flight cycle is allowed to finish.
    ///
    /// Returns `true` if a live timer was cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownJob`] when the job has neither a timer
    /// nor a metadata row, and [`SchedulerError::Store`] when the store fails.
    pub async fn remove_job(&self, job_id: &str) -> Result<bool, SchedulerError> {
        let admin_lock = self.admin_lock(job_id);
        let result = {
            let _admin = admin_lock.lock().await;
            self.disarm_and_disable(job_id).await
        };
        self.release_locks(job_id, &admin_lock);
        result
    }

    async fn disarm_and_disable(&self, job_id: &str) -> Result<bool, SchedulerError> {
        let cancelled = self.disarm(job_id);

        match self.inner.deps.job_store.set_enabled(job_id, false).await {
            Ok(()) => {}
            Err(StoreError::NotFound) if cancelled => {
                tracing::warn!(job_id, "scheduler: removed timer had no metadata row");
            }
            Err(StoreError::NotFound) => return Err(SchedulerError::UnknownJob(job_id.to_owned())),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(job_id, cancelled, "scheduler: job removed");
        Ok(cancelled)
    }

    /// Run one cycle now, outside the timer. The timer's next firing is not
    /// moved.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::UnknownJob`] when no metadata row exists.
    /// - [`SchedulerError::UnknownIntegration`] when the job maps to no collector.
    /// - [`SchedulerError::Systemic`] when the cycle was abandoned.
    pub async fn trigger_now(&self, job_id: &str) -> Result<TriggerResult, SchedulerError> {
        let job = match self.inner.deps.job_store.get(job_id).await {
            Ok(job) => job,
            Err(StoreError::NotFound) => return Err(SchedulerError::UnknownJob(job_id.to_owned())),
            Err(e) => return Err(e.into()),
        };
        let integration = self.resolve_integration(job_id)?;

        let cycle_lock = self.cycle_lock(job_id);
        let Ok(_guard) = cycle_lock.try_lock_owned() else {
            tracing::warn!(job_id, "scheduler: cycle already in flight; trigger skipped");
            return Ok(TriggerResult::Skipped);
        };

        tracing::info!(job_id, "scheduler: manual trigger");
        let report = self
            .run_cycle(job_id, &integration, job.time_interval)
            .await?;
        Ok(TriggerResult::Completed(report))
    }

    /// Every job in the store with its timer state.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] when the store cannot be read.
    pub async fn list_jobs(&self) -> Result<Vec<JobStatus>, SchedulerError> {
        let jobs = self.inner.deps.job_store.list_all().await?;
        let timers = lock(&self.inner.timers);
        Ok(jobs
            .into_iter()
            .map(|job| {
                let armed = timers.contains_key(&job.job_id);
                status_of(job, armed)
            })
            .collect())
    }

    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownJob`] when no metadata row exists.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatus, SchedulerError> {
        let job = match self.inner.deps.job_store.get(job_id).await {
            Ok(job) => job,
            Err(StoreError::NotFound) => return Err(SchedulerError::UnknownJob(job_id.to_owned())),
            Err(e) => return Err(e.into()),
        };
        let armed = self.is_armed(job_id);
        Ok(status_of(job, armed))
    }

    /// Job ids with a live timer, sorted.
    #[must_use]
    pub fn armed_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner.timers).keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn is_armed(&self, job_id: &str) -> bool {
        lock(&self.inner.timers).contains_key(job_id)
    }

    /// Interval of the live timer for `job_id`, if armed.
    #[must_use]
    pub fn armed_interval(&self, job_id: &str) -> Option<u32> {
        lock(&self.inner.timers)
            .get(job_id)
            .map(|timer| timer.time_interval)
    }

    /// Cancel every timer. Cycles already running finish on their own.
    /// Jobs cannot be armed again afterwards.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let cancelled = lock(&self.inner.timers).drain().count();
        tracing::info!(cancelled, "scheduler: shut down");
    }

    fn resolve_integration(&self, job_id: &str) -> Result<String, SchedulerError> {
        if let Some(timer) = lock(&self.inner.timers).get(job_id) {
            return Ok(timer.integration.clone());
        }
        let integration =
            integration_for(job_id).ok_or_else(|| SchedulerError::UnknownJob(job_id.to_owned()))?;
        if !self.supports(integration) {
            return Err(SchedulerError::UnknownIntegration(integration.to_owned()));
        }
        Ok(integration.to_owned())
    }

    fn cycle_lock(&self, job_id: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            lock(&self.inner.cycle_locks)
                .entry(job_id.to_owned())
                .or_default(),
        )
    }

    fn admin_lock(&self, job_id: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            lock(&self.inner.admin_locks)
                .entry(job_id.to_owned())
                .or_default(),
        )
    }

    /// Drop the per-job lock entries once nothing else holds them. `admin_lock`
    /// is the caller's own clone, so two references mean no waiter is queued.
    fn release_locks(&self, job_id: &str, admin_lock: &Arc<AsyncMutex<()>>) {
        {
            let mut admin_locks = lock(&self.inner.admin_locks);
            if Arc::strong_count(admin_lock) == 2 {
                admin_locks.remove(job_id);
            }
        }

        let mut cycle_locks = lock(&self.inner.cycle_locks);
        if cycle_locks
            .get(job_id)
            .is_some_and(|cycle_lock| Arc::strong_count(cycle_lock) == 1)
        {
            cycle_locks.remove(job_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_lock_count(&self) -> usize {
        lock(&self.inner.admin_locks).len() + lock(&self.inner.cycle_locks).len()
    }

    /// Install a timer for `job_id`, replacing any existing one. Returns
    /// `false` after shutdown.
    fn arm(&self, job_id: &str, integration: &str, time_interval: u32) -> bool {
        if self.inner.shutdown.is_cancelled() {
            tracing::warn!(job_id, "scheduler: shut down; not arming job");
            return false;
        }

        let token = self.inner.shutdown.child_token();
        let mut timers = lock(&self.inner.timers);
        let previous = timers.insert(
            job_id.to_owned(),
            ArmedTimer {
                integration: integration.to_owned(),
                time_interval,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            tracing::debug!(job_id, "scheduler: replaced existing timer");
        }

        let scheduler = self.clone();
        let job_id = job_id.to_owned();
        let integration = integration.to_owned();
        tokio::spawn(async move {
            scheduler
                .timer_loop(job_id, integration, time_interval, token)
                .await;
        });
        drop(timers);
        true
    }

    fn disarm(&self, job_id: &str) -> bool {
        match lock(&self.inner.timers).remove(job_id) {
            Some(timer) => {
                timer.token.cancel();
                true
            }
            None => false,
        }
    }

    async fn timer_loop(
        self,
        job_id: String,
        integration: String,
        time_interval: u32,
        token: CancellationToken,
    ) {
        let period = period_of(time_interval);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::debug!(job_id = %job_id, "scheduler: timer cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    let job_id = job_id.clone();
                    let integration = integration.clone();
                    tokio::spawn(async move {
                        scheduler.fire(&job_id, &integration, time_interval).await;
                    });
                }
            }
        }
    }

    async fn fire(&self, job_id: &str, integration: &str, time_interval: u32) {
        let cycle_lock = self.cycle_lock(job_id);
        let Ok(_guard) = cycle_lock.try_lock_owned() else {
            tracing::warn!(
                job_id,
                "scheduler: previous cycle still running; skipping this firing"
            );
            return;
        };

        // Systemic failures are logged inside the cycle; the timer keeps going.
        if let Ok(report) = self.run_cycle(job_id, integration, time_interval).await {
            tracing::info!(
                job_id,
                attempted = report.attempted(),
                failures = report.failures(),
                "scheduler: cycle complete"
            );
        }
    }
}

fn status_of(job: JobMetadata, armed: bool) -> JobStatus {
    JobStatus {
        job_id: job.job_id,
        time_interval: job.time_interval,
        enabled: job.enabled,
        last_success: job.last_success,
        armed,
    }
}
