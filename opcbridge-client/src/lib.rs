//! Protocol-client runtime for the OPC UA bridge
//!
//! This crate implements the orchestration and data-model logic that sits
//! between a generic transport driver and a generic value consumer:
//!
//! - **Session**: connection-lifecycle state machine with reconnect,
//!   namespace re-mapping and the post-activation sequence
//! - **Subscription**: monitored-item groups sharing one publish interval
//! - **RequestBatcher**: generic priority-based request batching with
//!   adaptive pacing
//! - **BindingTree**: hierarchical data binding decomposing structured
//!   server values onto individually addressable leaf bindings
//! - **TransactionTracker**: correlation of asynchronous service
//!   completions back to the items that requested them

pub mod batcher;
pub mod consumer;
pub mod item;
pub mod namespace;
pub mod registry;
pub mod session;
pub mod subscription;
pub mod transaction;
pub mod tree;
pub mod update;

pub use batcher::{BatcherParams, RequestBatcher, RequestConsumer};
pub use consumer::ValueConsumer;
pub use item::Item;
pub use namespace::NamespaceMap;
pub use registry::{Registry, RegistryKeyNamespace};
pub use session::{ReadRequest, Session, WriteRequest};
pub use subscription::Subscription;
pub use transaction::TransactionTracker;
pub use tree::{BindingTree, LeafHandle, OutgoingBuffer};
pub use update::{Update, UpdateQueue};
