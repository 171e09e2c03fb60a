//! Session: connection-lifecycle state machine and service orchestration
//!
//! A session owns the transport driver, all items, the subscriptions, two
//! request batchers (read and write) and the transaction tracker. It
//! drives connect/disconnect and, on state transitions, re-resolves the
//! namespace mapping, re-registers node handles, re-creates subscriptions
//! and issues a full initial read, all funneled through the batchers.
//!
//! The driver reports everything asynchronously through its event channel;
//! a dedicated event-pump task consumes it. Batch delivery happens on the
//! batcher worker tasks, which build one service call per batch, allocate
//! a fresh transaction id and register the pending transaction under the
//! same lock, so a completion can never race a registration reusing an id.

use crate::batcher::{BatcherParams, RequestBatcher, RequestConsumer};
use crate::item::Item;
use crate::namespace::NamespaceMap;
use crate::registry::Registry;
use crate::subscription::Subscription;
use crate::transaction::TransactionTracker;
use crate::tree::LeafHandle;
use async_trait::async_trait;
use opcbridge_core::{
    ConnectionStatus, DataValue, InitialPolicy, ItemConfig, OpcError, OpcResult, Priority,
    ProcessReason, SessionConfig, StatusCode, Variant,
};
use opcbridge_transport::{
    ReadValueId, SessionState, StructureResolver, TransportDriver, TransportEvent, WriteValue,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

/// Read-request cargo: one item per entry
pub struct ReadRequest {
    pub item: Arc<Item>,
}

/// Write-request cargo: one item per entry
pub struct WriteRequest {
    pub item: Arc<Item>,
}

/// Client session to one remote server
pub struct Session {
    name: String,
    /// Back-reference handed to spawned tasks and batch consumers
    weak: Weak<Session>,
    config: SessionConfig,
    driver: Arc<dyn TransportDriver>,
    state: Mutex<SessionState>,
    items: Mutex<Vec<Arc<Item>>>,
    subscriptions: Mutex<HashMap<String, Arc<Subscription>>>,
    read_batcher: RequestBatcher<ReadRequest>,
    write_batcher: RequestBatcher<WriteRequest>,
    /// Outstanding transactions; also serializes id use between submission
    /// and completion
    ops: Mutex<TransactionTracker>,
    transaction_id: AtomicU32,
    namespaces: Mutex<NamespaceMap>,
    reconnecting: AtomicBool,
}

struct ReadBatchConsumer {
    session: Weak<Session>,
}

#[async_trait]
impl RequestConsumer<ReadRequest> for ReadBatchConsumer {
    async fn process_requests(&self, batch: Vec<ReadRequest>) {
        if let Some(session) = self.session.upgrade() {
            session.process_read_batch(batch);
        }
    }
}

struct WriteBatchConsumer {
    session: Weak<Session>,
}

#[async_trait]
impl RequestConsumer<WriteRequest> for WriteBatchConsumer {
    async fn process_requests(&self, batch: Vec<WriteRequest>) {
        if let Some(session) = self.session.upgrade() {
            session.process_write_batch(batch);
        }
    }
}

impl Session {
    /// Create a session and register it under a process-wide unique name
    ///
    /// Starts the event-pump task and both batcher workers; must be
    /// called from within a tokio runtime.
    pub fn create(
        name: impl Into<String>,
        config: SessionConfig,
        driver: Arc<dyn TransportDriver>,
        registry: &Registry<Session>,
    ) -> OpcResult<Arc<Session>> {
        let name = name.into();
        let params = BatcherParams {
            max_per_batch: config.max_nodes_per_service_call,
            min_hold_off: config.min_hold_off,
            max_hold_off: config.max_hold_off,
        };
        let namespaces = NamespaceMap::new(config.namespace_uris.iter().cloned());
        let session = Arc::new_cyclic(|weak: &Weak<Session>| Session {
            name: name.clone(),
            weak: weak.clone(),
            read_batcher: RequestBatcher::new(
                format!("{}-read", name),
                Arc::new(ReadBatchConsumer {
                    session: weak.clone(),
                }),
                params,
            ),
            write_batcher: RequestBatcher::new(
                format!("{}-write", name),
                Arc::new(WriteBatchConsumer {
                    session: weak.clone(),
                }),
                params,
            ),
            config,
            driver,
            state: Mutex::new(SessionState::Disconnected),
            items: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(HashMap::new()),
            ops: Mutex::new(TransactionTracker::new()),
            transaction_id: AtomicU32::new(0),
            namespaces: Mutex::new(namespaces),
            reconnecting: AtomicBool::new(false),
        });
        if !registry.insert(&session.name, session.clone()) {
            return Err(OpcError::Config(format!(
                "session name '{}' already in use",
                session.name
            )));
        }
        session.start_event_pump();
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_active()
    }

    fn start_event_pump(&self) {
        let (sink, mut events) = mpsc::unbounded_channel();
        self.driver.set_event_sink(sink);
        let weak = self.weak.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(session) = weak.upgrade() else { break };
                session.handle_event(event).await;
            }
        });
    }

    /// Add a subscription owned by this session
    pub fn add_subscription(
        &self,
        name: impl Into<String>,
        publishing_interval: Duration,
        registry: &Registry<Subscription>,
    ) -> OpcResult<Arc<Subscription>> {
        let name = name.into();
        let subscription = Subscription::new(name.clone(), self.name.clone(), publishing_interval);
        if !registry.insert(&name, subscription.clone()) {
            return Err(OpcError::Config(format!(
                "subscription name '{}' already in use",
                name
            )));
        }
        self.subscriptions
            .lock()
            .unwrap()
            .insert(name, subscription.clone());
        Ok(subscription)
    }

    /// Add an item; a monitored item is attached to its configured
    /// subscription, which must exist
    pub fn add_item(&self, config: ItemConfig) -> OpcResult<Arc<Item>> {
        let item = Item::new(config);
        if item.config().monitored {
            if let Some(subscription_name) = item.config().subscription.clone() {
                let subscriptions = self.subscriptions.lock().unwrap();
                let subscription = subscriptions.get(&subscription_name).ok_or_else(|| {
                    OpcError::Config(format!(
                        "item {} references unknown subscription '{}'",
                        item.node_id(),
                        subscription_name
                    ))
                })?;
                subscription.add_item(item.clone());
            }
        }
        self.items.lock().unwrap().push(item.clone());
        Ok(item)
    }

    pub fn item_count(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Set a runtime-tunable option; unknown options are logged and
    /// ignored
    pub fn set_option(&self, name: &str, value: &str) {
        let mut params = BatcherParams {
            max_per_batch: self.config.max_nodes_per_service_call,
            min_hold_off: self.config.min_hold_off,
            max_hold_off: self.config.max_hold_off,
        };
        match name {
            "batch-nodes" => match value.parse::<usize>() {
                Ok(max) => {
                    params.max_per_batch = max;
                    self.apply_batcher_params(params);
                }
                Err(_) => log::error!("session {}: invalid 'batch-nodes' value - ignored", self.name),
            },
            "min-holdoff" => match value.parse::<u64>() {
                Ok(millis) => {
                    params.min_hold_off = Duration::from_millis(millis);
                    self.apply_batcher_params(params);
                }
                Err(_) => log::error!("session {}: invalid 'min-holdoff' value - ignored", self.name),
            },
            "max-holdoff" => match value.parse::<u64>() {
                Ok(millis) => {
                    params.max_hold_off = Duration::from_millis(millis);
                    self.apply_batcher_params(params);
                }
                Err(_) => log::error!("session {}: invalid 'max-holdoff' value - ignored", self.name),
            },
            _ => log::error!("session {}: unknown option '{}' - ignored", self.name, name),
        }
    }

    fn apply_batcher_params(&self, params: BatcherParams) {
        self.read_batcher
            .set_params(params.max_per_batch, params.min_hold_off, params.max_hold_off);
        self.write_batcher
            .set_params(params.max_per_batch, params.min_hold_off, params.max_hold_off);
    }

    /// Submit a transport-level connect
    ///
    /// No-op when already active. Success is asynchronous; the remaining
    /// setup happens when the driver reports the state change.
    pub async fn connect(&self) -> OpcResult<()> {
        if self.state().is_active() {
            log::debug!("session {}: already connected", self.name);
            return Ok(());
        }
        self.driver.connect().await
    }

    /// Submit a transport-level disconnect
    pub async fn disconnect(&self) -> OpcResult<()> {
        if self.state() == SessionState::Disconnected {
            log::debug!("session {}: already disconnected", self.name);
            return Ok(());
        }
        let result = self.driver.disconnect().await;
        for subscription in self.subscriptions.lock().unwrap().values() {
            subscription.clear();
        }
        result
    }

    /// Queue a read request for one item at its configured priority
    pub fn request_read(&self, item: Arc<Item>) {
        let priority = item.config().priority;
        self.read_batcher.push(ReadRequest { item }, priority);
    }

    /// Queue a write request for one item at its configured priority
    pub fn request_write(&self, item: Arc<Item>) {
        let priority = item.config().priority;
        self.write_batcher.push(WriteRequest { item }, priority);
    }

    /// Store an outgoing value on a bound leaf and queue the write
    pub fn write_value(&self, item: &Arc<Item>, leaf: LeafHandle, value: Variant) {
        item.set_outgoing(leaf, value);
        self.request_write(item.clone());
    }

    fn next_transaction_id(&self) -> u32 {
        self.transaction_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn resolver(&self) -> &dyn StructureResolver {
        &*self.driver
    }

    /// Deliver one read batch to the driver
    ///
    /// Called from the read batcher's worker task. On synchronous
    /// submission failure every item of the batch gets a synthesized
    /// failure event instead of a registered transaction.
    fn process_read_batch(&self, batch: Vec<ReadRequest>) {
        let items: Vec<Arc<Item>> = batch.into_iter().map(|request| request.item).collect();
        let nodes: Vec<ReadValueId> = items
            .iter()
            .map(|item| ReadValueId {
                node_id: item.node_id(),
            })
            .collect();
        let transaction_id = self.next_transaction_id();

        let mut ops = self.ops.lock().unwrap();
        match self.driver.begin_read(nodes, transaction_id) {
            Ok(()) => {
                log::debug!(
                    "session {}: read service submitted (transaction id {}, {} node(s))",
                    self.name,
                    transaction_id,
                    items.len()
                );
                ops.register(transaction_id, items);
            }
            Err(e) => {
                drop(ops);
                log::error!(
                    "session {}: read service submission failed ({})",
                    self.name,
                    e
                );
                for item in items {
                    item.set_incoming_event(ProcessReason::ReadFailure, StatusCode::BAD);
                }
            }
        }
    }

    /// Deliver one write batch to the driver
    fn process_write_batch(&self, batch: Vec<WriteRequest>) {
        let mut items = Vec::new();
        let mut nodes = Vec::new();
        for request in batch {
            let item = request.item;
            match item.take_outgoing_data() {
                Some(value) => {
                    nodes.push(WriteValue {
                        node_id: item.node_id(),
                        value,
                    });
                    items.push(item);
                }
                None => {
                    log::warn!(
                        "session {}: item {} has no outgoing data to write",
                        self.name,
                        item.node_id()
                    );
                    item.set_incoming_event(ProcessReason::WriteFailure, StatusCode::BAD_NO_DATA);
                }
            }
        }
        if items.is_empty() {
            return;
        }
        let transaction_id = self.next_transaction_id();

        let mut ops = self.ops.lock().unwrap();
        match self.driver.begin_write(nodes, transaction_id) {
            Ok(()) => {
                log::debug!(
                    "session {}: write service submitted (transaction id {}, {} node(s))",
                    self.name,
                    transaction_id,
                    items.len()
                );
                ops.register(transaction_id, items);
            }
            Err(e) => {
                drop(ops);
                log::error!(
                    "session {}: write service submission failed ({})",
                    self.name,
                    e
                );
                for item in items {
                    item.set_incoming_event(ProcessReason::WriteFailure, StatusCode::BAD);
                }
            }
        }
    }

    async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(new_state) => self.handle_state_change(new_state).await,
            TransportEvent::ReadComplete {
                transaction_id,
                results,
            } => self.handle_read_complete(transaction_id, results),
            TransportEvent::WriteComplete {
                transaction_id,
                results,
            } => self.handle_write_complete(transaction_id, results),
            TransportEvent::DataChange {
                subscription,
                notifications,
            } => self.handle_data_change(&subscription, notifications),
        }
    }

    async fn handle_state_change(&self, new_state: SessionState) {
        let old_state = {
            let mut state = self.state.lock().unwrap();
            let old = *state;
            if let Err(e) = old.validate_transition(new_state) {
                // The driver owns the truth; log and follow it.
                log::warn!("session {}: {}", self.name, e);
            }
            *state = new_state;
            old
        };
        log::info!(
            "session {}: connection status changed from {} to {}",
            self.name,
            old_state.as_str(),
            new_state.as_str()
        );
        match new_state {
            SessionState::Active => self.on_session_active().await,
            SessionState::Disconnected => {
                if old_state != SessionState::Disconnected {
                    self.on_connection_loss();
                }
            }
            SessionState::Connecting | SessionState::Connected => {}
        }
    }

    /// Post-activation sequence: namespace re-mapping, node id rebuild,
    /// node registration, subscription re-creation and the full initial
    /// read. Restart state is never assumed stale.
    async fn on_session_active(&self) {
        match self.driver.read_namespace_array().await {
            Ok(table) => self.namespaces.lock().unwrap().resolve(&table),
            Err(e) => log::warn!(
                "session {}: reading namespace table failed ({})",
                self.name,
                e
            ),
        }

        let items: Vec<Arc<Item>> = self.items.lock().unwrap().clone();
        {
            let namespaces = self.namespaces.lock().unwrap();
            for item in &items {
                item.rebuild_node_id(&namespaces);
            }
        }

        let to_register: Vec<Arc<Item>> = items
            .iter()
            .filter(|item| item.config().register_node)
            .cloned()
            .collect();
        if !to_register.is_empty() {
            let nodes = to_register.iter().map(|item| item.node_id()).collect();
            match self.driver.register_nodes(nodes).await {
                Ok(registered) => {
                    for (item, node_id) in to_register.iter().zip(registered) {
                        item.set_registered_node_id(node_id);
                    }
                }
                Err(e) => log::warn!(
                    "session {}: node registration failed ({})",
                    self.name,
                    e
                ),
            }
        }

        let subscriptions: Vec<Arc<Subscription>> =
            self.subscriptions.lock().unwrap().values().cloned().collect();
        futures::future::join_all(subscriptions.iter().map(|subscription| async {
            subscription.create(&*self.driver).await;
            subscription.add_monitored_items(&*self.driver).await;
        }))
        .await;

        log::info!(
            "session {}: activated, issuing initial read for {} item(s)",
            self.name,
            items.len()
        );
        for item in items {
            item.set_connection_state(ConnectionStatus::InitialRead);
            self.read_batcher.push(ReadRequest { item }, Priority::High);
        }
    }

    /// Connection-loss sequence: discard in-flight work, mark every item
    /// down and propagate the loss event through every binding tree
    fn on_connection_loss(&self) {
        self.read_batcher.clear();
        self.write_batcher.clear();
        self.ops.lock().unwrap().clear();

        for subscription in self.subscriptions.lock().unwrap().values() {
            subscription.clear();
        }
        let items: Vec<Arc<Item>> = self.items.lock().unwrap().clone();
        for item in items {
            item.set_connection_state(ConnectionStatus::Down);
            item.set_incoming_event(ProcessReason::ConnectionLoss, StatusCode::BAD_CONNECTION_LOST);
        }

        if self.config.auto_connect {
            self.start_reconnect_watchdog();
        }
    }

    fn start_reconnect_watchdog(&self) {
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak = self.weak.clone();
        let delay = self.config.reconnect_delay;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                let Some(session) = weak.upgrade() else { return };
                if session.state() != SessionState::Disconnected {
                    session.reconnecting.store(false, Ordering::Release);
                    break;
                }
                log::info!("session {}: attempting reconnect", session.name);
                if let Err(e) = session.driver.connect().await {
                    log::warn!(
                        "session {}: reconnect attempt failed ({})",
                        session.name,
                        e
                    );
                }
            }
        });
    }

    fn handle_read_complete(&self, transaction_id: u32, results: Vec<DataValue>) {
        let Some(items) = self.ops.lock().unwrap().retire(transaction_id) else {
            log::warn!(
                "session {}: received a read callback with unknown transaction id {} - ignored",
                self.name,
                transaction_id
            );
            return;
        };
        log::debug!(
            "session {}: read complete (transaction id {}, {} item(s))",
            self.name,
            transaction_id,
            items.len()
        );
        for (item, result) in items.iter().zip(results) {
            if result.status.is_bad() {
                item.set_incoming_event(ProcessReason::ReadFailure, result.status);
            } else {
                item.set_incoming_data(result, ProcessReason::ReadComplete, self.resolver());
            }
            if item.connection_state() == ConnectionStatus::InitialRead {
                self.finish_initial_read(item);
            }
        }
    }

    /// Step the per-item ladder after the initial read completed
    ///
    /// With an initial-value policy of `Write` the resting output value is
    /// pushed to the server exactly once; everything else goes up
    /// directly.
    fn finish_initial_read(&self, item: &Arc<Item>) {
        match item.config().initial_policy {
            InitialPolicy::Write => {
                item.set_connection_state(ConnectionStatus::InitialWrite);
                if item.is_dirty() {
                    self.request_write(item.clone());
                } else {
                    // Ask the consumers to produce the resting value.
                    item.request_notify(ProcessReason::WriteRequest);
                }
            }
            InitialPolicy::Read | InitialPolicy::Ignore => {
                item.set_connection_state(ConnectionStatus::Up);
            }
        }
    }

    fn handle_write_complete(&self, transaction_id: u32, results: Vec<StatusCode>) {
        let Some(items) = self.ops.lock().unwrap().retire(transaction_id) else {
            log::warn!(
                "session {}: received a write callback with unknown transaction id {} - ignored",
                self.name,
                transaction_id
            );
            return;
        };
        log::debug!(
            "session {}: write complete (transaction id {}, {} item(s))",
            self.name,
            transaction_id,
            items.len()
        );
        for (item, status) in items.iter().zip(results) {
            if status.is_bad() {
                item.set_incoming_event(ProcessReason::WriteFailure, status);
            } else {
                item.set_incoming_event(ProcessReason::WriteComplete, status);
            }
            if item.connection_state() == ConnectionStatus::InitialWrite {
                item.set_connection_state(ConnectionStatus::Up);
            }
        }
    }

    fn handle_data_change(&self, subscription: &str, notifications: Vec<(u32, DataValue)>) {
        let target = self.subscriptions.lock().unwrap().get(subscription).cloned();
        match target {
            Some(target) => target.data_change(notifications, self.resolver()),
            None => log::warn!(
                "session {}: data change for unknown subscription '{}' - ignored",
                self.name,
                subscription
            ),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session={} url={} status={} autoconnect={} subscriptions={} items={}",
            self.name,
            self.config.server_url,
            self.state().as_str(),
            if self.config.auto_connect { "y" } else { "n" },
            self.subscriptions.lock().unwrap().len(),
            self.items.lock().unwrap().len()
        )
    }
}
