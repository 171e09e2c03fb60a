//! Transport driver contract for the OPC UA bridge runtime
//!
//! This crate defines the seam between the protocol-client runtime and the
//! wire-level client stack: the driver trait, the service request/response
//! types, the session state machine and the asynchronous event stream.

pub mod driver;
pub mod services;
pub mod state;

pub use driver::{StructureResolver, TransportDriver, TransportEvent};
pub use services::{
    MonitoredItemRequest, MonitoredItemResult, ReadValueId, RevisedSubscriptionParameters,
    SubscriptionParameters, WriteValue,
};
pub use state::SessionState;
