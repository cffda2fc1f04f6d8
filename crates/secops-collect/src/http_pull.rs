//! Generic REST pull collector.
//!
//! Serves any vendor that exposes a JSON endpoint accepting a time window as
//! `from`/`to` RFC 3339 query parameters and a bearer API key. The endpoint
//! and key come from the binding's credential set (`API_URL`, `API_KEY`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use secops_core::{NormalizedRecord, TimeRange};
use serde_json::Value;

use crate::collector::{CollectRequest, Collector};
use crate::error::CollectorError;

pub const API_URL_KEY: &str = "API_URL";
pub const API_KEY_KEY: &str = "API_KEY";

/// Fields checked, in order, for a record's own event time.
const TIMESTAMP_FIELDS: [&str; 3] = ["timestamp", "time", "created_at"];

pub struct HttpPullCollector {
    integration: String,
    client: Client,
}

impl HttpPullCollector {
    /// # Errors
    ///
    /// Returns [`CollectorError::Permanent`] if the HTTP client cannot be built.
    pub fn new(
        integration: impl Into<String>,
        timeout_secs: u64,
        user_agent: &str,
    ) -> Result<Self, CollectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| CollectorError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            integration: integration.into().to_ascii_lowercase(),
            client,
        })
    }

    fn endpoint(request: &CollectRequest) -> Result<Url, CollectorError> {
        let raw = request.credentials.get(API_URL_KEY).ok_or_else(|| {
            CollectorError::Permanent(format!("credential {API_URL_KEY} is not configured"))
        })?;
        let mut url = Url::parse(raw).map_err(|e| {
            CollectorError::Permanent(format!("credential {API_URL_KEY} is not a valid URL: {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("from", &request.time_range.start.to_rfc3339())
            .append_pair("to", &request.time_range.end.to_rfc3339());
        Ok(url)
    }
}

impl std::fmt::Debug for HttpPullCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPullCollector")
            .field("integration", &self.integration)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Collector for HttpPullCollector {
    fn integration(&self) -> &str {
        &self.integration
    }

    async fn fetch(
        &self,
        request: &CollectRequest,
    ) -> Result<Vec<NormalizedRecord>, CollectorError> {
        let url = Self::endpoint(request)?;
        let api_key = request.credentials.get(API_KEY_KEY).ok_or_else(|| {
            CollectorError::Permanent(format!("credential {API_KEY_KEY} is not configured"))
        })?;

        let response = self
            .client
            .get(url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let body: Value = response.json().await.map_err(|e| {
            CollectorError::Transient(format!("vendor response is not valid JSON: {e}"))
        })?;

        let items = extract_items(body)?;
        Ok(items
            .into_iter()
            .map(|payload| NormalizedRecord {
                integration: self.integration.clone(),
                customer_code: request.customer_code.clone(),
                observed_at: observed_at(&payload, &request.time_range),
                payload,
            })
            .collect())
    }
}

fn classify_transport_error(err: reqwest::Error) -> CollectorError {
    if err.is_timeout() {
        CollectorError::Transient(format!("vendor request timed out: {err}"))
    } else if err.is_connect() {
        CollectorError::Transient(format!("could not reach vendor: {err}"))
    } else {
        CollectorError::Transient(format!("vendor request failed: {err}"))
    }
}

/// Map a non-2xx vendor status to an error class.
///
/// Auth failures and a missing endpoint need an operator to fix the binding;
/// everything else may clear up by the next cycle.
fn classify_status(status: StatusCode) -> CollectorError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CollectorError::Permanent(format!("vendor rejected credentials (HTTP {status})"))
        }
        StatusCode::NOT_FOUND => {
            CollectorError::Permanent(format!("vendor endpoint not found (HTTP {status})"))
        }
        _ => CollectorError::Transient(format!("vendor returned HTTP {status}")),
    }
}

/// Accept either a top-level array or an object with a `data` array.
fn extract_items(body: Value) -> Result<Vec<Value>, CollectorError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(CollectorError::Transient(
                "vendor response field \"data\" is not an array".to_string(),
            )),
        },
        _ => Err(CollectorError::Transient(
            "vendor response is neither an array nor an object".to_string(),
        )),
    }
}

fn observed_at(payload: &Value, range: &TimeRange) -> DateTime<Utc> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|field| payload.get(*field))
        .find_map(parse_timestamp)
        .unwrap_or(range.end)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        // Vendors that send numbers use Unix seconds.
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}
