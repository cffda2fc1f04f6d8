use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Persisted schedule state for one recurring collection job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: String,
    /// Minutes between firings. Always greater than zero.
    pub time_interval: u32,
    pub enabled: bool,
    /// Completion time of the most recent full scheduler cycle.
    pub last_success: Option<DateTime<Utc>>,
}

impl JobMetadata {
    /// The configured interval as a wall-clock [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.time_interval) * 60)
    }
}

/// Opaque handle to a binding's credential set in the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialRef(pub i64);

/// One customer's enrolment in one integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerIntegrationBinding {
    pub id: i64,
    pub customer_code: String,
    pub integration_name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl CustomerIntegrationBinding {
    #[must_use]
    pub fn credential_ref(&self) -> CredentialRef {
        CredentialRef(self.id)
    }
}

/// Input for provisioning a new binding together with its credential set.
#[derive(Debug, Clone)]
pub struct NewBinding {
    pub customer_code: String,
    pub integration_name: String,
    pub credentials: Credentials,
}

/// Vendor auth keys resolved for one binding.
///
/// Values never appear in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    #[must_use]
    pub fn new(keys: BTreeMap<String, String>) -> Self {
        Self(keys)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "[redacted]")))
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Half-open collection window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// The window of one job interval that ends at `end`.
    ///
    /// Bounds derive from the interval, not from `last_success`, so the
    /// lookback after a missed cycle or a restart never exceeds one interval.
    #[must_use]
    pub fn interval_ending_at(end: DateTime<Utc>, time_interval_minutes: u32) -> Self {
        let start = end - TimeDelta::minutes(i64::from(time_interval_minutes));
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// A vendor record normalized for the downstream log pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub integration: String,
    pub customer_code: String,
    pub observed_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}
