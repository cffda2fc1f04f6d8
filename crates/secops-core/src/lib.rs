//! Shared configuration, domain types, and storage contracts for the
//! multi-tenant integration collection engine.

mod app_config;
mod config;
mod jobs_file;
mod store;
mod types;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use jobs_file::{load_jobs_file, BuiltinJob, JobsFile};
pub use store::{CredentialStore, IntegrationRegistry, JobStore, StoreError};
pub use types::{
    CredentialRef, Credentials, CustomerIntegrationBinding, JobMetadata, NewBinding,
    NormalizedRecord, TimeRange,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read jobs file {path}: {source}")]
    JobsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse jobs file: {0}")]
    JobsFileParse(#[from] serde_yaml::Error),

    #[error("jobs file validation failed: {0}")]
    Validation(String),
}
