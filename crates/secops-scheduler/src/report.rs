use chrono::{DateTime, Utc};
use secops_collect::{CollectionOutcome, OutcomeKind};
use secops_core::TimeRange;
use serde::Serialize;

/// One collector invocation for one customer within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionRun {
    pub customer_code: String,
    pub integration: String,
    pub started_at: DateTime<Utc>,
    pub outcome: CollectionOutcome,
}

impl CollectionRun {
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }
}

/// Summary of one completed cycle.
///
/// A cycle that reaches the end of the customer loop is complete even when
/// individual runs failed; those failures show up here and in the logs, not
/// in the job's `last_success`.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub job_id: String,
    pub integration: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub time_range: TimeRange,
    /// Runs ordered by customer code.
    pub runs: Vec<CollectionRun>,
    /// Customers listed by the registry whose binding vanished before their turn.
    pub skipped: Vec<String>,
}

impl CycleReport {
    /// Number of collector invocations.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.runs.iter().filter(|r| !r.outcome.is_success()).count()
    }

    #[must_use]
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.runs.iter().filter(|r| r.kind() == kind).count()
    }
}

/// Result of an out-of-band `trigger_now`.
#[derive(Debug, Clone)]
pub enum TriggerResult {
    Completed(CycleReport),
    /// A cycle for the job was already in flight.
    Skipped,
}

/// Administrative view of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub job_id: String,
    pub time_interval: u32,
    pub enabled: bool,
    pub last_success: Option<DateTime<Utc>>,
    /// Whether this process holds a live timer for the job.
    pub armed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str, outcome: CollectionOutcome) -> CollectionRun {
        CollectionRun {
            customer_code: code.to_string(),
            integration: "duo".to_string(),
            started_at: Utc::now(),
            outcome,
        }
    }

    #[test]
    fn report_counts_failures_by_kind() {
        let now = Utc::now();
        let report = CycleReport {
            job_id: "invoke_duo_integration_collect".to_string(),
            integration: "duo".to_string(),
            started_at: now,
            finished_at: now,
            time_range: TimeRange::interval_ending_at(now, 15),
            runs: vec![
                run(
                    "00001",
                    CollectionOutcome::PermanentError {
                        detail: "revoked".to_string(),
                    },
                ),
                run(
                    "00002",
                    CollectionOutcome::Success {
                        fetched: 2,
                        shipped: 2,
                        ship_error: None,
                    },
                ),
                run(
                    "00003",
                    CollectionOutcome::TransientError {
                        detail: "timeout".to_string(),
                    },
                ),
            ],
            skipped: vec![],
        };

        assert_eq!(report.attempted(), 3);
        assert_eq!(report.failures(), 2);
        assert_eq!(report.count(OutcomeKind::PermanentError), 1);
        assert_eq!(report.count(OutcomeKind::Success), 1);
    }
}
