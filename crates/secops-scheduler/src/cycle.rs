//! The run algorithm executed on every firing and by `trigger_now`.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use secops_collect::{collect, CollectRequest, CollectionOutcome, Collector};
use secops_core::{StoreError, TimeRange};

use crate::error::SchedulerError;
use crate::report::{CollectionRun, CycleReport};
use crate::scheduler::Scheduler;

enum CustomerResult {
    Ran(CollectionRun),
    Skipped(String),
}

impl Scheduler {
    /// Execute one cycle of `job_id`. The caller must hold the job's cycle lock.
    ///
    /// Collector lookup and customer enumeration are systemic: if either
    /// fails the cycle is abandoned and `last_success` is left alone. Once the
    /// customer loop finishes, `last_success` is recorded regardless of
    /// per-customer outcomes.
    pub(crate) async fn run_cycle(
        &self,
        job_id: &str,
        integration: &str,
        time_interval: u32,
    ) -> Result<CycleReport, SchedulerError> {
        let started_at = Utc::now();
        let time_range = TimeRange::interval_ending_at(started_at, time_interval);
        let deps = &self.inner.deps;

        let Some(collector) = deps.collectors.get(integration) else {
            return Err(abandon(
                job_id,
                format!("no collector registered for integration {integration}"),
            ));
        };

        let customers = match deps.registry.list_customers_for(integration).await {
            Ok(customers) => customers,
            Err(e) => {
                return Err(abandon(
                    job_id,
                    format!("could not enumerate customers: {e}"),
                ))
            }
        };

        tracing::info!(
            job_id,
            integration,
            customers = customers.len(),
            window_start = %time_range.start,
            window_end = %time_range.end,
            "scheduler: starting cycle"
        );

        let max_concurrent = self.inner.config.max_concurrent_customers.max(1);
        let results: Vec<CustomerResult> = stream::iter(customers)
            .map(|customer_code| {
                self.run_customer(collector.as_ref(), integration, customer_code, time_range)
            })
            .buffer_unordered(max_concurrent)
            .collect()
            .await;

        let mut runs = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for result in results {
            match result {
                CustomerResult::Ran(run) => runs.push(run),
                CustomerResult::Skipped(code) => skipped.push(code),
            }
        }
        runs.sort_by(|a, b| a.customer_code.cmp(&b.customer_code));
        skipped.sort();

        let finished_at = Utc::now();
        if let Err(e) = deps.job_store.record_success(job_id, finished_at).await {
            tracing::warn!(
                job_id,
                error = %e,
                "scheduler: cycle finished but last_success could not be recorded"
            );
        }

        let report = CycleReport {
            job_id: job_id.to_owned(),
            integration: integration.to_owned(),
            started_at,
            finished_at,
            time_range,
            runs,
            skipped,
        };
        if report.failures() > 0 {
            tracing::warn!(
                job_id,
                failures = report.failures(),
                attempted = report.attempted(),
                "scheduler: some customers failed during cycle"
            );
        }
        Ok(report)
    }

    async fn run_customer(
        &self,
        collector: &dyn Collector,
        integration: &str,
        customer_code: String,
        time_range: TimeRange,
    ) -> CustomerResult {
        let deps = &self.inner.deps;
        let started_at = Utc::now();

        let outcome = match deps.registry.get_binding(&customer_code, integration).await {
            Ok(binding) if binding.enabled => {
                match deps.credentials.resolve(binding.credential_ref()).await {
                    Ok(credentials) => {
                        let request = CollectRequest {
                            integration: integration.to_owned(),
                            customer_code: customer_code.clone(),
                            credentials,
                            time_range,
                        };
                        collect(collector, deps.shipper.as_ref(), &request).await
                    }
                    Err(e) => CollectionOutcome::PermanentError {
                        detail: format!("credential resolution failed: {e}"),
                    },
                }
            }
            Ok(_) | Err(StoreError::NotFound) => {
                tracing::debug!(
                    integration,
                    customer_code = %customer_code,
                    "scheduler: binding no longer active; skipping customer"
                );
                return CustomerResult::Skipped(customer_code);
            }
            Err(e) => CollectionOutcome::TransientError {
                detail: format!("binding lookup failed: {e}"),
            },
        };

        log_outcome(integration, &customer_code, &outcome);
        CustomerResult::Ran(CollectionRun {
            customer_code,
            integration: integration.to_owned(),
            started_at,
            outcome,
        })
    }
}

fn abandon(job_id: &str, reason: String) -> SchedulerError {
    tracing::error!(
        job_id,
        reason = %reason,
        "scheduler: systemic failure; cycle abandoned, last_success unchanged"
    );
    SchedulerError::Systemic {
        job_id: job_id.to_owned(),
        reason,
    }
}

fn log_outcome(integration: &str, customer_code: &str, outcome: &CollectionOutcome) {
    match outcome {
        CollectionOutcome::Success {
            fetched, shipped, ..
        } => {
            tracing::info!(
                integration,
                customer_code,
                fetched,
                shipped,
                "scheduler: customer collection succeeded"
            );
        }
        CollectionOutcome::TransientError { detail } => {
            tracing::warn!(
                integration,
                customer_code,
                error = %detail,
                "scheduler: transient collection failure; will retry next cycle"
            );
        }
        CollectionOutcome::PermanentError { detail } => {
            tracing::error!(
                integration,
                customer_code,
                error = %detail,
                "scheduler: permanent collection failure; binding needs operator action"
            );
        }
    }
}
