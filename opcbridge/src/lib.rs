//! opcbridge - client-side runtime of an industrial control-system field
//! protocol bridge
//!
//! The runtime maintains long-lived sessions to remote data-acquisition
//! servers, subscribes to live value changes, batches outgoing read/write
//! operations and maps each server-side value - scalar or structured -
//! onto a tree of bound application variables.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `opcbridge-core`: core types, error handling, value model and
//!   configuration
//! - `opcbridge-transport`: the pluggable transport-driver contract and
//!   the asynchronous event stream
//! - `opcbridge-client`: the protocol-client runtime (session,
//!   subscription, request batching, data binding, transaction
//!   correlation)
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use opcbridge::{
//!     ItemConfig, Registry, RegistryKeyNamespace, Session, SessionConfig,
//! };
//! # async fn example(driver: Arc<dyn opcbridge::TransportDriver>) -> anyhow::Result<()> {
//! let keys = RegistryKeyNamespace::new();
//! let sessions = Registry::new(keys.clone());
//! let subscriptions = Registry::new(keys);
//!
//! let session = Session::create(
//!     "plc1",
//!     SessionConfig {
//!         server_url: "opc.tcp://plc1:4840".into(),
//!         ..SessionConfig::default()
//!     },
//!     driver,
//!     &sessions,
//! )?;
//! session.add_subscription("fast", Duration::from_millis(100), &subscriptions)?;
//! let _item = session.add_item(ItemConfig {
//!     subscription: Some("fast".into()),
//!     ..ItemConfig::default()
//! })?;
//! session.connect().await?;
//! # Ok(())
//! # }
//! ```

pub use opcbridge_core::{
    ConnectionStatus, DataValue, Identifier, InitialPolicy, ItemConfig, NodeId, OpcError,
    OpcResult, Priority, ProcessReason, SessionConfig, StatusCode, StructureDefinition,
    StructureMember, TimestampSource, Variant, VariantKind,
};

pub use opcbridge_transport::{
    MonitoredItemRequest, MonitoredItemResult, ReadValueId, RevisedSubscriptionParameters,
    SessionState, StructureResolver, SubscriptionParameters, TransportDriver, TransportEvent,
    WriteValue,
};

pub use opcbridge_client::{
    BatcherParams, BindingTree, Item, LeafHandle, NamespaceMap, Registry, RegistryKeyNamespace,
    RequestBatcher, RequestConsumer, Session, Subscription, TransactionTracker, Update,
    UpdateQueue, ValueConsumer,
};
