//! Graylog GELF-over-HTTP shipper.
//!
//! Each record is posted as one GELF 1.1 JSON message. Delivery is sequential
//! and stops at the first record that still fails after retries, so the
//! pipeline sees records in the order the collector produced them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use secops_core::NormalizedRecord;
use serde::Serialize;

use crate::error::ShipError;
use crate::retry::retry_with_backoff;
use crate::shipper::EventShipper;

/// GELF syslog level for informational messages.
const GELF_LEVEL_INFO: u8 = 6;

#[derive(Debug, Serialize)]
struct GelfMessage<'a> {
    version: &'static str,
    host: &'a str,
    short_message: String,
    timestamp: f64,
    level: u8,
    #[serde(rename = "_integration")]
    integration: &'a str,
    #[serde(rename = "_customer_code")]
    customer_code: &'a str,
    #[serde(rename = "_payload")]
    payload: String,
}

impl<'a> GelfMessage<'a> {
    fn from_record(host: &'a str, record: &'a NormalizedRecord) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let timestamp = record.observed_at.timestamp_millis() as f64 / 1_000.0;
        Self {
            version: "1.1",
            host,
            short_message: format!("{} event for {}", record.integration, record.customer_code),
            timestamp,
            level: GELF_LEVEL_INFO,
            integration: &record.integration,
            customer_code: &record.customer_code,
            payload: record.payload.to_string(),
        }
    }
}

/// Posts records to a Graylog GELF HTTP input.
pub struct GelfHttpShipper {
    client: Client,
    url: Url,
    host: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl GelfHttpShipper {
    /// Build a shipper for the GELF HTTP input at `url`
    /// (usually `http://graylog:12201/gelf`).
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::InvalidUrl`] if `url` does not parse and
    /// [`ShipError::Http`] if the HTTP client cannot be built.
    pub fn new(
        url: &str,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, ShipError> {
        let parsed = Url::parse(url).map_err(|e| ShipError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: parsed,
            host: "secops-collector".to_owned(),
            max_retries,
            backoff_base_ms,
        })
    }

    /// Override the `host` field reported in every message.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    async fn send_one(&self, body: &GelfMessage<'_>) -> Result<(), ShipError> {
        let response = self.client.post(self.url.clone()).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ShipError::Unavailable {
                status: status.as_u16(),
            });
        }
        Err(ShipError::Rejected {
            status: status.as_u16(),
        })
    }
}

impl std::fmt::Debug for GelfHttpShipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GelfHttpShipper")
            .field("host", &self.url.host_str())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventShipper for GelfHttpShipper {
    async fn ship(&self, records: &[NormalizedRecord]) -> Result<usize, ShipError> {
        for (shipped, record) in records.iter().enumerate() {
            let message = GelfMessage::from_record(&self.host, record);
            let result =
                retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
                    self.send_one(&message)
                })
                .await;
            if let Err(err) = result {
                return Err(ShipError::Partial {
                    shipped,
                    total: records.len(),
                    source: Box::new(err),
                });
            }
        }
        tracing::debug!(count = records.len(), "shipper: delivered batch to graylog");
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn gelf_message_carries_record_fields() {
        let record = NormalizedRecord {
            integration: "duo".to_string(),
            customer_code: "00001".to_string(),
            observed_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            payload: serde_json::json!({ "user": "alice" }),
        };
        let message = GelfMessage::from_record("collector-1", &record);
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["version"], "1.1");
        assert_eq!(value["host"], "collector-1");
        assert_eq!(value["_integration"], "duo");
        assert_eq!(value["_customer_code"], "00001");
        assert_eq!(value["level"], 6);
        assert_eq!(value["timestamp"], 1_740_830_400.0);
        assert_eq!(value["_payload"], r#"{"user":"alice"}"#);
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = GelfHttpShipper::new("not a url", 5, 0, 0).unwrap_err();
        assert!(matches!(err, ShipError::InvalidUrl { .. }));
    }
}
