use std::sync::Arc;

use async_trait::async_trait;
use secops_core::{AppConfig, NormalizedRecord};

use crate::error::ShipError;
use crate::gelf::GelfHttpShipper;

/// Forwards normalized records to the downstream log pipeline.
#[async_trait]
pub trait EventShipper: Send + Sync {
    /// Deliver `records` in order and return how many were accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError`] when delivery stops before the whole batch is
    /// accepted. [`ShipError::shipped`] reports the delivered prefix.
    async fn ship(&self, records: &[NormalizedRecord]) -> Result<usize, ShipError>;
}

/// Writes each record as a structured `tracing` event.
///
/// Used when no log pipeline endpoint is configured, so local runs still
/// show what was collected.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingShipper;

#[async_trait]
impl EventShipper for TracingShipper {
    async fn ship(&self, records: &[NormalizedRecord]) -> Result<usize, ShipError> {
        for record in records {
            tracing::info!(
                target: "secops::events",
                integration = %record.integration,
                customer_code = %record.customer_code,
                observed_at = %record.observed_at.to_rfc3339(),
                payload = %record.payload,
                "event"
            );
        }
        Ok(records.len())
    }
}

/// The GELF shipper when `SECOPS_GRAYLOG_GELF_URL` is set, otherwise
/// [`TracingShipper`].
///
/// # Errors
///
/// Returns [`ShipError`] if the configured GELF URL is invalid.
pub fn shipper_from_config(config: &AppConfig) -> Result<Arc<dyn EventShipper>, ShipError> {
    match config.graylog_gelf_url.as_deref() {
        Some(url) => {
            let shipper = GelfHttpShipper::new(
                url,
                config.collector_request_timeout_secs,
                config.shipper_max_retries,
                config.shipper_retry_backoff_base_ms,
            )?;
            Ok(Arc::new(shipper))
        }
        None => {
            tracing::info!("shipper: no GELF URL configured; logging records instead");
            Ok(Arc::new(TracingShipper))
        }
    }
}
