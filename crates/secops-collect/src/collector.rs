//! The uniform contract every vendor collector implements, and the wrapper
//! that turns a fetch into a typed [`CollectionOutcome`].

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use secops_core::{Credentials, NormalizedRecord, TimeRange};
use serde::Serialize;

use crate::error::CollectorError;
use crate::shipper::EventShipper;

/// Everything a collector needs for one customer within one cycle.
#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub integration: String,
    pub customer_code: String,
    pub credentials: Credentials,
    pub time_range: TimeRange,
}

/// A vendor-specific unit that fetches and normalizes data for one customer.
#[async_trait]
pub trait Collector: Send + Sync {
    /// The integration name this collector serves, e.g. `"duo"`.
    fn integration(&self) -> &str;

    /// Fetch and normalize records for `request.time_range`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Transient`] for failures worth retrying next
    /// cycle and [`CollectorError::Permanent`] for credential problems.
    async fn fetch(&self, request: &CollectRequest)
        -> Result<Vec<NormalizedRecord>, CollectorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    TransientError,
    PermanentError,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::TransientError => write!(f, "transient_error"),
            OutcomeKind::PermanentError => write!(f, "permanent_error"),
        }
    }
}

/// Result of one collector invocation for one customer.
///
/// Fetch success and ship success are reported independently: a failed
/// shipment never turns a successful fetch into a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectionOutcome {
    Success {
        fetched: usize,
        shipped: usize,
        ship_error: Option<String>,
    },
    TransientError {
        detail: String,
    },
    PermanentError {
        detail: String,
    },
}

impl CollectionOutcome {
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            CollectionOutcome::Success { .. } => OutcomeKind::Success,
            CollectionOutcome::TransientError { .. } => OutcomeKind::TransientError,
            CollectionOutcome::PermanentError { .. } => OutcomeKind::PermanentError,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.kind() == OutcomeKind::Success
    }

    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        match self {
            CollectionOutcome::Success { .. } => None,
            CollectionOutcome::TransientError { detail }
            | CollectionOutcome::PermanentError { detail } => Some(detail),
        }
    }
}

impl From<CollectorError> for CollectionOutcome {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Transient(detail) => CollectionOutcome::TransientError { detail },
            CollectorError::Permanent(detail) => CollectionOutcome::PermanentError { detail },
        }
    }
}

/// Run one collector for one customer and ship whatever it returns.
///
/// Never fails: fetch errors and collector panics are converted into an
/// outcome. Shipping failures are logged and recorded in `ship_error`.
pub async fn collect(
    collector: &dyn Collector,
    shipper: &dyn EventShipper,
    request: &CollectRequest,
) -> CollectionOutcome {
    let fetched = match AssertUnwindSafe(collector.fetch(request))
        .catch_unwind()
        .await
    {
        Ok(Ok(records)) => records,
        Ok(Err(err)) => return err.into(),
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            return CollectionOutcome::TransientError {
                detail: format!("collector panicked: {detail}"),
            };
        }
    };

    let fetched_count = fetched.len();
    if fetched.is_empty() {
        return CollectionOutcome::Success {
            fetched: 0,
            shipped: 0,
            ship_error: None,
        };
    }

    match shipper.ship(&fetched).await {
        Ok(shipped) => CollectionOutcome::Success {
            fetched: fetched_count,
            shipped,
            ship_error: None,
        },
        Err(err) => {
            tracing::warn!(
                integration = %request.integration,
                customer_code = %request.customer_code,
                fetched = fetched_count,
                shipped = err.shipped(),
                error = %err,
                "collector: shipping failed; fetch still counts as successful"
            );
            CollectionOutcome::Success {
                fetched: fetched_count,
                shipped: err.shipped(),
                ship_error: Some(err.to_string()),
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
