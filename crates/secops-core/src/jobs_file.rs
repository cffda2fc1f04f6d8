use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A job the process provisions on its own at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinJob {
    pub integration: String,
    pub time_interval: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct JobsFile {
    #[serde(default)]
    pub jobs: Vec<BuiltinJob>,
}

/// Load and validate the built-in jobs file.
///
/// A missing file yields an empty job list; the file is optional.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_jobs_file(path: &Path) -> Result<JobsFile, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(JobsFile::default()),
        Err(e) => {
            return Err(ConfigError::JobsFileIo {
                path: path.display().to_string(),
                source: e,
            })
        }
    };

    let jobs_file = parse_jobs_file(&content)?;
    Ok(jobs_file)
}

fn parse_jobs_file(content: &str) -> Result<JobsFile, ConfigError> {
    let mut jobs_file: JobsFile = serde_yaml::from_str(content)?;
    for job in &mut jobs_file.jobs {
        job.integration = job.integration.trim().to_lowercase();
    }
    validate_jobs(&jobs_file)?;
    Ok(jobs_file)
}

fn validate_jobs(jobs_file: &JobsFile) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for job in &jobs_file.jobs {
        if job.integration.is_empty() {
            return Err(ConfigError::Validation(
                "integration name must be non-empty".to_string(),
            ));
        }

        if job.time_interval == 0 {
            return Err(ConfigError::Validation(format!(
                "job for '{}' has time_interval 0; must be greater than zero",
                job.integration
            )));
        }

        if !seen.insert(job.integration.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate job for integration '{}'",
                job.integration
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jobs_and_defaults_enabled() {
        let yaml = "jobs:\n  - integration: Duo\n    time_interval: 15\n  - integration: cato\n    time_interval: 5\n    enabled: false\n";
        let file = parse_jobs_file(yaml).expect("valid file");
        assert_eq!(file.jobs.len(), 2);
        assert_eq!(file.jobs[0].integration, "duo");
        assert!(file.jobs[0].enabled);
        assert!(!file.jobs[1].enabled);
    }

    #[test]
    fn rejects_zero_interval() {
        let yaml = "jobs:\n  - integration: duo\n    time_interval: 0\n";
        let err = parse_jobs_file(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("time_interval 0")));
    }

    #[test]
    fn rejects_duplicate_integrations_case_insensitively() {
        let yaml = "jobs:\n  - integration: duo\n    time_interval: 5\n  - integration: DUO\n    time_interval: 10\n";
        let err = parse_jobs_file(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn rejects_blank_integration() {
        let yaml = "jobs:\n  - integration: '  '\n    time_interval: 5\n";
        let err = parse_jobs_file(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = load_jobs_file(&dir.path().join("absent.yaml")).expect("missing is ok");
        assert!(file.jobs.is_empty());
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jobs.yaml");
        std::fs::write(&path, "jobs:\n  - integration: huntress\n    time_interval: 60\n")
            .expect("write");
        let file = load_jobs_file(&path).expect("load");
        assert_eq!(file.jobs[0].integration, "huntress");
        assert_eq!(file.jobs[0].time_interval, 60);
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = parse_jobs_file("jobs: [ {integration: duo").unwrap_err();
        assert!(matches!(err, ConfigError::JobsFileParse(_)));
    }
}
