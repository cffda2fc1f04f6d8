//! Integration collector interface, the collector registry, and the event
//! shippers that forward normalized records to the log pipeline.

pub mod collector;
pub mod error;
pub mod gelf;
pub mod http_pull;
pub mod registry;
pub(crate) mod retry;
pub mod shipper;

pub use collector::{collect, CollectRequest, CollectionOutcome, Collector, OutcomeKind};
pub use error::{CollectorError, ShipError};
pub use gelf::GelfHttpShipper;
pub use http_pull::HttpPullCollector;
pub use registry::{CollectorRegistry, RegistryError};
pub use shipper::{shipper_from_config, EventShipper, TracingShipper};
