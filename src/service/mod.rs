//! Business logic layer

pub mod delivery;
pub mod delivery_log;
pub mod registry;

pub use delivery::{DeliveryError, DeliveryOptions, DeliveryOrchestrator};
pub use delivery_log::{DeliveryLogSink, TracingDeliveryLog};
pub use registry::{describe_provider, provider_schema, ConnectionRegistry};
