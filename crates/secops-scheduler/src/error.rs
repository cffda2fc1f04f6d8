use secops_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No collector is registered for the integration.
    #[error("no collector registered for integration \"{0}\"")]
    UnknownIntegration(String),

    #[error("unknown job \"{0}\"")]
    UnknownJob(String),

    /// The job id does not follow `invoke_<integration>_integration_collect`
    /// for the integration it was registered with.
    #[error("job \"{job_id}\" does not collect integration \"{integration}\"")]
    JobIntegrationMismatch { job_id: String, integration: String },

    #[error("time_interval must be greater than zero, got {0}")]
    InvalidInterval(u32),

    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    /// Shared infrastructure failed and the cycle was abandoned.
    #[error("cycle for {job_id} abandoned: {reason}")]
    Systemic { job_id: String, reason: String },
}
