use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub jobs_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Upper bound on customers collected concurrently within one job cycle.
    pub scheduler_max_concurrent_customers: usize,
    /// Interval assigned to jobs created by provisioning without an explicit one.
    pub default_job_interval_minutes: u32,
    pub collector_request_timeout_secs: u64,
    pub collector_user_agent: String,
    /// Integrations served by the generic HTTP pull collector.
    pub http_pull_integrations: Vec<String>,
    pub graylog_gelf_url: Option<String>,
    pub shipper_max_retries: u32,
    pub shipper_retry_backoff_base_ms: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("jobs_path", &self.jobs_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "scheduler_max_concurrent_customers",
                &self.scheduler_max_concurrent_customers,
            )
            .field(
                "default_job_interval_minutes",
                &self.default_job_interval_minutes,
            )
            .field(
                "collector_request_timeout_secs",
                &self.collector_request_timeout_secs,
            )
            .field("collector_user_agent", &self.collector_user_agent)
            .field("http_pull_integrations", &self.http_pull_integrations)
            .field(
                "graylog_gelf_url",
                &self.graylog_gelf_url.as_ref().map(|_| "[redacted]"),
            )
            .field("shipper_max_retries", &self.shipper_max_retries)
            .field(
                "shipper_retry_backoff_base_ms",
                &self.shipper_retry_backoff_base_ms,
            )
            .finish()
    }
}
