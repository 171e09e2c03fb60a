//! One server-side value of interest
//!
//! An item owns the binding tree that decomposes its server value onto
//! bound consumers, carries the per-item connection state ladder and the
//! bookkeeping the session needs to correlate and re-establish it across
//! reconnects.

use crate::consumer::ValueConsumer;
use crate::namespace::NamespaceMap;
use crate::tree::{BindingTree, LeafHandle, OutgoingBuffer};
use crate::update::Update;
use opcbridge_core::{
    ConnectionStatus, DataValue, ItemConfig, NodeId, OpcResult, ProcessReason, StatusCode,
    TimestampSource, Variant,
};
use opcbridge_transport::StructureResolver;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Scalar state of an item, guarded by one lock
struct ItemState {
    node_id: NodeId,
    registered: bool,
    revised_sampling_interval: Duration,
    revised_queue_size: u32,
    connection: ConnectionStatus,
    last_status: StatusCode,
    last_reason: ProcessReason,
    /// Client (local) timestamp of the last update
    ts_client: u64,
    /// Server timestamp of the last update
    ts_server: u64,
    /// Source timestamp of the last update
    ts_source: u64,
    /// Timestamp taken from the configured data element, if any
    ts_data: u64,
}

/// One server-side addressable value bound into the runtime
pub struct Item {
    config: ItemConfig,
    state: Mutex<ItemState>,
    /// Incoming decode and queue-delivery path
    tree: Mutex<BindingTree>,
    /// Outgoing write-side state, distinct from the tree lock so that a
    /// consumer callback never blocks an unrelated write assembly
    outgoing: Mutex<OutgoingBuffer>,
}

impl Item {
    pub fn new(config: ItemConfig) -> Arc<Self> {
        let node_id = NodeId {
            namespace_index: config.namespace_index,
            identifier: config.identifier.clone(),
        };
        let time_source_member = match &config.timestamp_source {
            TimestampSource::Data(member) => Some(member.clone()),
            _ => None,
        };
        Arc::new(Self {
            state: Mutex::new(ItemState {
                node_id,
                registered: false,
                revised_sampling_interval: config.sampling_interval,
                revised_queue_size: config.queue_size,
                connection: ConnectionStatus::Down,
                last_status: StatusCode::GOOD,
                last_reason: ProcessReason::None,
                ts_client: 0,
                ts_server: 0,
                ts_source: 0,
                ts_data: 0,
            }),
            tree: Mutex::new(BindingTree::new(
                config.client_queue_size,
                config.discard_oldest,
                time_source_member,
            )),
            outgoing: Mutex::new(OutgoingBuffer::new()),
            config,
        })
    }

    pub fn config(&self) -> &ItemConfig {
        &self.config
    }

    /// Bind a consumer to the element at the given path
    ///
    /// An empty path binds the scalar root. Structural misconfiguration
    /// (leaf under leaf, occupied path) is a hard error.
    pub fn add_leaf(
        &self,
        path: &[String],
        consumer: Arc<dyn ValueConsumer>,
    ) -> OpcResult<LeafHandle> {
        self.tree.lock().unwrap().add_leaf(path, consumer)
    }

    /// Current node id (after namespace mapping and registration)
    pub fn node_id(&self) -> NodeId {
        self.state.lock().unwrap().node_id.clone()
    }

    /// Rebuild the node id from the configuration against a freshly
    /// resolved namespace map; drops any registered handle
    pub fn rebuild_node_id(&self, namespaces: &NamespaceMap) {
        let mut state = self.state.lock().unwrap();
        state.node_id = NodeId {
            namespace_index: namespaces.map(self.config.namespace_index),
            identifier: self.config.identifier.clone(),
        };
        state.registered = false;
    }

    /// Replace the node id with the server-registered handle
    pub fn set_registered_node_id(&self, node_id: NodeId) {
        let mut state = self.state.lock().unwrap();
        state.node_id = node_id;
        state.registered = true;
    }

    pub fn is_registered(&self) -> bool {
        self.state.lock().unwrap().registered
    }

    /// Whether this item is monitored through a subscription
    pub fn is_monitored(&self) -> bool {
        self.config.monitored && self.config.subscription.is_some()
    }

    /// Record the server-revised monitoring parameters; the last revision
    /// is authoritative
    pub fn set_revised_parameters(&self, sampling_interval: Duration, queue_size: u32) {
        let mut state = self.state.lock().unwrap();
        state.revised_sampling_interval = sampling_interval;
        state.revised_queue_size = queue_size;
    }

    pub fn revised_sampling_interval(&self) -> Duration {
        self.state.lock().unwrap().revised_sampling_interval
    }

    pub fn revised_queue_size(&self) -> u32 {
        self.state.lock().unwrap().revised_queue_size
    }

    pub fn connection_state(&self) -> ConnectionStatus {
        self.state.lock().unwrap().connection
    }

    pub fn set_connection_state(&self, connection: ConnectionStatus) {
        self.state.lock().unwrap().connection = connection;
    }

    /// Status code of the most recent service interaction
    pub fn last_status(&self) -> StatusCode {
        self.state.lock().unwrap().last_status
    }

    /// Reason of the most recent processing
    pub fn last_reason(&self) -> ProcessReason {
        self.state.lock().unwrap().last_reason
    }

    /// Push an incoming data value down the root element
    ///
    /// Called from the session's event pump when new data is received for
    /// this item. Timestamps and status are recorded before the value is
    /// decoded onto the tree.
    pub fn set_incoming_data(
        &self,
        value: DataValue,
        reason: ProcessReason,
        resolver: &dyn StructureResolver,
    ) {
        let update_ts = match &self.config.timestamp_source {
            TimestampSource::Server => value.server_timestamp,
            // For the data-element source the extraction happens during
            // decode; the source timestamp is the fallback.
            TimestampSource::Source | TimestampSource::Data(_) => value.source_timestamp,
        };
        {
            let mut state = self.state.lock().unwrap();
            state.ts_client = now_millis();
            state.ts_server = value.server_timestamp;
            state.ts_source = value.source_timestamp;
            state.last_status = value.status;
            state.last_reason = reason;
        }
        let mut tree = self.tree.lock().unwrap();
        tree.set_incoming_data(value.value, reason, value.status, update_ts, resolver);
        let ts_data = tree.last_data_timestamp().unwrap_or(value.source_timestamp);
        drop(tree);
        self.state.lock().unwrap().ts_data = ts_data;
    }

    /// Push an out-of-band event down the root element
    pub fn set_incoming_event(&self, reason: ProcessReason, status: StatusCode) {
        let now = now_millis();
        {
            let mut state = self.state.lock().unwrap();
            state.ts_client = now;
            state.last_status = status;
            state.last_reason = reason;
        }
        self.tree
            .lock()
            .unwrap()
            .set_incoming_event(reason, status, now);
    }

    /// Store an outgoing value on a bound leaf
    pub fn set_outgoing(&self, leaf: LeafHandle, value: Variant) {
        self.outgoing.lock().unwrap().set(leaf, value);
    }

    /// True if any bound leaf has unwritten outgoing data
    pub fn is_dirty(&self) -> bool {
        self.outgoing.lock().unwrap().is_dirty()
    }

    /// Assemble and consume the outgoing value for a write service call
    ///
    /// Drains the dirty write slots and substitutes them into the last
    /// incoming template. Returns `None` when there is nothing to write.
    pub fn take_outgoing_data(&self) -> Option<Variant> {
        let dirty = self.outgoing.lock().unwrap().take_dirty();
        if dirty.is_empty() {
            return None;
        }
        self.tree.lock().unwrap().assemble_outgoing(&dirty)
    }

    /// Remove and return the next queued update of a bound leaf
    pub fn next_update(&self, leaf: LeafHandle) -> Option<(Update, Option<ProcessReason>)> {
        self.tree.lock().unwrap().pop_update(leaf)
    }

    /// Trigger downstream re-processing on every mapped leaf
    pub fn request_notify(&self, reason: ProcessReason) {
        self.tree.lock().unwrap().request_notify(reason);
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        write!(
            f,
            "item={} state={} status={} reason={} monitored={} registered={}",
            state.node_id,
            state.connection.as_str(),
            state.last_status,
            state.last_reason.as_str(),
            if self.is_monitored() { "y" } else { "n" },
            if state.registered { "y" } else { "n" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcbridge_core::Identifier;
    use std::sync::Mutex as StdMutex;

    struct NullConsumer;

    impl ValueConsumer for NullConsumer {
        fn notify(&self, _reason: ProcessReason) {}
    }

    struct NullResolver;

    impl StructureResolver for NullResolver {
        fn structure_definition(
            &self,
            _type_id: &NodeId,
        ) -> Option<opcbridge_core::StructureDefinition> {
            None
        }
    }

    struct CountingConsumer {
        count: StdMutex<usize>,
    }

    impl ValueConsumer for CountingConsumer {
        fn notify(&self, _reason: ProcessReason) {
            *self.count.lock().unwrap() += 1;
        }
    }

    fn config(ns: u16, id: u32) -> ItemConfig {
        ItemConfig {
            namespace_index: ns,
            identifier: Identifier::Numeric(id),
            ..ItemConfig::default()
        }
    }

    #[test]
    fn test_rebuild_node_id_maps_namespace() {
        let item = Item::new(config(2, 42));
        assert_eq!(item.node_id(), NodeId::numeric(2, 42));

        let mut namespaces = NamespaceMap::new([(2, "urn:plant".to_string())]);
        namespaces.resolve(&["http://opcfoundation.org/UA/".into(), "urn:plant".into()]);
        item.rebuild_node_id(&namespaces);
        assert_eq!(item.node_id(), NodeId::numeric(1, 42));
    }

    #[test]
    fn test_registration_dropped_on_rebuild() {
        let item = Item::new(config(0, 7));
        item.set_registered_node_id(NodeId::numeric(0, 9999));
        assert!(item.is_registered());
        item.rebuild_node_id(&NamespaceMap::new([]));
        assert!(!item.is_registered());
        assert_eq!(item.node_id(), NodeId::numeric(0, 7));
    }

    #[test]
    fn test_incoming_data_updates_state_and_queue() {
        let item = Item::new(config(0, 1));
        let leaf = item.add_leaf(&[], Arc::new(NullConsumer)).unwrap();
        let value = DataValue {
            value: Variant::Int32(5),
            status: StatusCode::GOOD,
            server_timestamp: 100,
            source_timestamp: 90,
        };
        item.set_incoming_data(value, ProcessReason::ReadComplete, &NullResolver);
        assert_eq!(item.last_status(), StatusCode::GOOD);
        assert_eq!(item.last_reason(), ProcessReason::ReadComplete);

        let (update, _) = item.next_update(leaf).unwrap();
        assert_eq!(update.data, Some(Variant::Int32(5)));
        // Default timestamp source is the server timestamp.
        assert_eq!(update.timestamp, 100);
    }

    #[test]
    fn test_outgoing_roundtrip() {
        let item = Item::new(config(0, 1));
        let leaf = item.add_leaf(&[], Arc::new(NullConsumer)).unwrap();
        assert!(!item.is_dirty());
        assert!(item.take_outgoing_data().is_none());

        item.set_outgoing(leaf, Variant::Double(2.5));
        assert!(item.is_dirty());
        assert_eq!(item.take_outgoing_data(), Some(Variant::Double(2.5)));
        assert!(!item.is_dirty());
    }

    #[test]
    fn test_event_reaches_every_leaf() {
        let item = Item::new(config(0, 1));
        let counter = Arc::new(CountingConsumer {
            count: StdMutex::new(0),
        });
        item.add_leaf(&["a".to_string()], counter.clone()).unwrap();
        item.add_leaf(&["b".to_string()], counter.clone()).unwrap();
        item.set_incoming_event(ProcessReason::ConnectionLoss, StatusCode::BAD_CONNECTION_LOST);
        assert_eq!(*counter.count.lock().unwrap(), 2);
        assert_eq!(item.last_reason(), ProcessReason::ConnectionLoss);
    }
}
