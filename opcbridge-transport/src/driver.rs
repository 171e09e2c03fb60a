//! Transport driver contract
//!
//! This module defines the fixed contract between the bridge runtime and a
//! pluggable wire-level driver. The runtime never touches the network
//! itself: it submits service calls through `TransportDriver` and consumes
//! the asynchronous completions from the driver's event stream.
//!
//! # Submission vs. completion
//!
//! `begin_read`/`begin_write` return synchronously with the *submission*
//! result only. Completion of the service call is delivered later as a
//! [`TransportEvent`] carrying the transaction id, possibly on a
//! driver-owned thread, and must be treated as concurrent with everything
//! else in the runtime.

use crate::services::{
    MonitoredItemRequest, MonitoredItemResult, ReadValueId, RevisedSubscriptionParameters,
    SubscriptionParameters, WriteValue,
};
use crate::state::SessionState;
use async_trait::async_trait;
use opcbridge_core::{DataValue, NodeId, OpcResult, StatusCode, StructureDefinition};
use tokio::sync::mpsc;

/// Asynchronous event delivered by the driver to the session's event pump
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection state changed
    StateChanged(SessionState),
    /// A read service call completed; results are in submission order
    ReadComplete {
        transaction_id: u32,
        results: Vec<DataValue>,
    },
    /// A write service call completed; results are in submission order
    WriteComplete {
        transaction_id: u32,
        results: Vec<StatusCode>,
    },
    /// Change notifications for monitored items of one subscription
    DataChange {
        subscription: String,
        notifications: Vec<(u32, DataValue)>,
    },
}

/// Lookup into the driver's cached type dictionary
///
/// A `None` result is a recoverable error: the caller logs it and skips the
/// decode, leaving the affected sub-tree at its previous value.
pub trait StructureResolver: Send + Sync {
    fn structure_definition(&self, type_id: &NodeId) -> Option<StructureDefinition>;
}

/// Driver interface to a remote data-acquisition server
///
/// # Why a Trait?
/// Using a trait allows:
/// - **Polymorphism**: the runtime works with any wire-level stack
/// - **Testability**: sessions are tested against scripted mock drivers
/// - **Extensibility**: new transport stacks plug in without runtime changes
#[async_trait]
pub trait TransportDriver: StructureResolver {
    /// Install the event sink before the first connect
    ///
    /// The runtime owns the receiving end; the driver must deliver all
    /// state changes, completions and notifications through this channel.
    fn set_event_sink(&self, sink: mpsc::UnboundedSender<TransportEvent>);

    /// Submit a transport-level connect
    ///
    /// Success is asynchronous: the remaining setup happens when the driver
    /// reports `StateChanged`, not inline.
    async fn connect(&self) -> OpcResult<()>;

    /// Submit a transport-level disconnect
    async fn disconnect(&self) -> OpcResult<()>;

    /// Submit a batched read; completion arrives as `ReadComplete`
    ///
    /// A synchronous error means the submission itself failed and no
    /// completion will be delivered for this transaction id.
    fn begin_read(&self, nodes: Vec<ReadValueId>, transaction_id: u32) -> OpcResult<()>;

    /// Submit a batched write; completion arrives as `WriteComplete`
    fn begin_write(&self, nodes: Vec<WriteValue>, transaction_id: u32) -> OpcResult<()>;

    /// Create a server-side subscription
    async fn create_subscription(
        &self,
        params: SubscriptionParameters,
    ) -> OpcResult<RevisedSubscriptionParameters>;

    /// Bulk-create monitored items on a subscription
    ///
    /// Returns per-element status and revised parameters in request order.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: Vec<MonitoredItemRequest>,
    ) -> OpcResult<Vec<MonitoredItemResult>>;

    /// Register node handles on the server, returning the registered ids
    /// in request order
    async fn register_nodes(&self, nodes: Vec<NodeId>) -> OpcResult<Vec<NodeId>>;

    /// Read the server's namespace table
    ///
    /// The position of a URI in the returned table is its namespace index
    /// on the server.
    async fn read_namespace_array(&self) -> OpcResult<Vec<String>>;
}
