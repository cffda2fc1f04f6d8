use thiserror::Error;

/// Failure of a vendor fetch, classified for the scheduler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectorError {
    /// Worth retrying next cycle: timeouts, connection failures, 5xx, 429.
    #[error("transient collector error: {0}")]
    Transient(String),

    /// Needs operator action: missing or rejected credentials.
    #[error("permanent collector error: {0}")]
    Permanent(String),
}

impl CollectorError {
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, CollectorError::Permanent(_))
    }

    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            CollectorError::Transient(detail) | CollectorError::Permanent(detail) => detail,
        }
    }
}

/// Errors returned by event shippers.
#[derive(Debug, Error)]
pub enum ShipError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The pipeline answered with a 5xx or 429.
    #[error("log pipeline unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// The pipeline refused the record; retrying will not help.
    #[error("log pipeline rejected record (HTTP {status})")]
    Rejected { status: u16 },

    #[error("invalid shipper URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Delivery stopped part way through a batch.
    #[error("shipped {shipped} of {total} records: {source}")]
    Partial {
        shipped: usize,
        total: usize,
        #[source]
        source: Box<ShipError>,
    },
}

impl ShipError {
    /// Records delivered before the failure.
    #[must_use]
    pub fn shipped(&self) -> usize {
        match self {
            ShipError::Partial { shipped, .. } => *shipped,
            _ => 0,
        }
    }
}
