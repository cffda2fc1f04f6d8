//! Job identifiers follow `invoke_<integration>_integration_collect`.

const PREFIX: &str = "invoke_";
const SUFFIX: &str = "_integration_collect";

/// The job id that collects `integration`, e.g. `invoke_duo_integration_collect`.
#[must_use]
pub fn job_id_for(integration: &str) -> String {
    format!("{PREFIX}{}{SUFFIX}", integration.trim().to_ascii_lowercase())
}

/// The integration a conventionally named job collects, if `job_id` follows
/// the naming scheme.
#[must_use]
pub fn integration_for(job_id: &str) -> Option<&str> {
    job_id
        .strip_prefix(PREFIX)?
        .strip_suffix(SUFFIX)
        .filter(|name| !name.is_empty())
}
