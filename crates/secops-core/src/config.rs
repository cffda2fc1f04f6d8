use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("SECOPS_ENV", "development"))?;

    let bind_addr = parse_addr("SECOPS_BIND_ADDR", "0.0.0.0:5000")?;
    let log_level = or_default("SECOPS_LOG_LEVEL", "info");
    let jobs_path = PathBuf::from(or_default("SECOPS_JOBS_PATH", "./config/jobs.yaml"));

    let db_max_connections = parse_u32("SECOPS_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SECOPS_DB_MIN_CONNECTIONS", "1")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "SECOPS_DB_MIN_CONNECTIONS",
            format!("must not exceed SECOPS_DB_MAX_CONNECTIONS ({db_max_connections})"),
        ));
    }
    let db_acquire_timeout_secs = parse_u64("SECOPS_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let scheduler_max_concurrent_customers =
        parse_usize("SECOPS_SCHEDULER_MAX_CONCURRENT_CUSTOMERS", "5")?;
    if scheduler_max_concurrent_customers == 0 {
        return Err(invalid(
            "SECOPS_SCHEDULER_MAX_CONCURRENT_CUSTOMERS",
            "must be at least 1".to_string(),
        ));
    }

    let default_job_interval_minutes = parse_u32("SECOPS_DEFAULT_JOB_INTERVAL_MINUTES", "15")?;
    if default_job_interval_minutes == 0 {
        return Err(invalid(
            "SECOPS_DEFAULT_JOB_INTERVAL_MINUTES",
            "must be greater than zero".to_string(),
        ));
    }

    let collector_request_timeout_secs = parse_u64("SECOPS_COLLECTOR_REQUEST_TIMEOUT_SECS", "30")?;
    let collector_user_agent = or_default("SECOPS_COLLECTOR_USER_AGENT", "secops-collector/0.1");
    let http_pull_integrations = parse_name_list(&or_default("SECOPS_HTTP_PULL_INTEGRATIONS", ""));
    let graylog_gelf_url = lookup("SECOPS_GRAYLOG_GELF_URL")
        .ok()
        .filter(|v| !v.trim().is_empty());

    let shipper_max_retries = parse_u32("SECOPS_SHIPPER_MAX_RETRIES", "3")?;
    let shipper_retry_backoff_base_ms = parse_u64("SECOPS_SHIPPER_RETRY_BACKOFF_BASE_MS", "500")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        jobs_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scheduler_max_concurrent_customers,
        default_job_interval_minutes,
        collector_request_timeout_secs,
        collector_user_agent,
        http_pull_integrations,
        graylog_gelf_url,
        shipper_max_retries,
        shipper_retry_backoff_base_ms,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SECOPS_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

/// Split a comma-separated list into lowercase, trimmed, de-duplicated names.
fn parse_name_list(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let name = name.to_lowercase();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
