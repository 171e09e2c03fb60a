//! Tree of data elements representing structured server values
//!
//! An element can be a structural node, having child elements, or a leaf,
//! bound to a value consumer. Each element has a single parent node; the
//! root element has no parent.
//!
//! In the simple case (scalar data), the root element *is* the unnamed
//! leaf. In the structure case there is always a root node named `[ROOT]`,
//! so that all leaves with simple names are children of that root node.
//!
//! The tree is stored as a flat arena owned by the item: nodes hold child
//! indices into the arena, each arena entry holds the index of its parent.
//! This gives bidirectional navigation without ownership cycles.
//!
//! Decoding routes a structured value to child elements through a lazily
//! built member-index map. The map is name-matched against the structure
//! definition the first time a concrete definition is seen and invalidated
//! on connection loss, because servers may change encodings between
//! reconnects.
//!
//! Outgoing write slots and dirty flags live outside the tree, in the
//! item's [`OutgoingBuffer`] under its own lock, so a value-consumer
//! callback running under the tree lock never blocks an unrelated
//! write-assembly operation.

use crate::consumer::ValueConsumer;
use crate::update::{Update, UpdateQueue};
use opcbridge_core::{OpcError, OpcResult, ProcessReason, StatusCode, Variant};
use opcbridge_transport::StructureResolver;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Handle to one leaf element of a binding tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafHandle(usize);

/// Latest outgoing write slot per leaf
///
/// Presence of a slot is the leaf's dirty flag; consuming a slot during
/// write assembly clears it.
#[derive(Debug, Default)]
pub struct OutgoingBuffer {
    slots: HashMap<LeafHandle, Variant>,
}

impl OutgoingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the leaf's latest outgoing value and mark it dirty
    pub fn set(&mut self, leaf: LeafHandle, value: Variant) {
        self.slots.insert(leaf, value);
    }

    /// True if any leaf has unwritten outgoing data
    pub fn is_dirty(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Drain all dirty slots for write assembly
    pub fn take_dirty(&mut self) -> HashMap<LeafHandle, Variant> {
        std::mem::take(&mut self.slots)
    }
}

struct NodeState {
    children: Vec<usize>,
    /// Structure member index -> arena index, built at most once per
    /// connection epoch; empty whenever `mapped` is false
    member_map: BTreeMap<usize, usize>,
    mapped: bool,
    /// Member index supplying the data timestamp, resolved at map build
    time_source: Option<usize>,
    /// Last incoming composite value, template for outgoing assembly
    template: Option<Variant>,
}

impl NodeState {
    fn new() -> Self {
        Self {
            children: Vec::new(),
            member_map: BTreeMap::new(),
            mapped: false,
            time_source: None,
            template: None,
        }
    }
}

struct LeafState {
    queue: UpdateQueue,
    consumer: Arc<dyn ValueConsumer>,
}

enum ElementKind {
    Node(NodeState),
    Leaf(LeafState),
}

struct Element {
    name: String,
    parent: Option<usize>,
    kind: ElementKind,
}

impl Element {
    fn is_leaf(&self) -> bool {
        matches!(self.kind, ElementKind::Leaf(_))
    }

    fn node(&self) -> &NodeState {
        match &self.kind {
            ElementKind::Node(n) => n,
            ElementKind::Leaf(_) => unreachable!("element is a leaf"),
        }
    }

    fn node_mut(&mut self) -> &mut NodeState {
        match &mut self.kind {
            ElementKind::Node(n) => n,
            ElementKind::Leaf(_) => unreachable!("element is a leaf"),
        }
    }
}

/// Per-item binding tree decomposing server values onto leaf bindings
pub struct BindingTree {
    arena: Vec<Element>,
    root: Option<usize>,
    client_queue_size: usize,
    discard_oldest: bool,
    /// Structure member name supplying the data timestamp, if configured
    time_source_member: Option<String>,
    /// Data timestamp extracted during the most recent structured decode
    last_data_timestamp: Option<u64>,
}

impl BindingTree {
    pub fn new(
        client_queue_size: usize,
        discard_oldest: bool,
        time_source_member: Option<String>,
    ) -> Self {
        Self {
            arena: Vec::new(),
            root: None,
            client_queue_size,
            discard_oldest,
            time_source_member,
            last_data_timestamp: None,
        }
    }

    /// Number of elements in the tree
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Data timestamp extracted from the most recent structured decode
    pub fn last_data_timestamp(&self) -> Option<u64> {
        self.last_data_timestamp
    }

    fn new_leaf(&mut self, name: &str, consumer: Arc<dyn ValueConsumer>) -> usize {
        self.arena.push(Element {
            name: name.to_string(),
            parent: None,
            kind: ElementKind::Leaf(LeafState {
                queue: UpdateQueue::new(self.client_queue_size, self.discard_oldest),
                consumer,
            }),
        });
        self.arena.len() - 1
    }

    fn new_node(&mut self, name: &str) -> usize {
        self.arena.push(Element {
            name: name.to_string(),
            parent: None,
            kind: ElementKind::Node(NodeState::new()),
        });
        self.arena.len() - 1
    }

    fn find_child(&self, node: usize, name: &str) -> Option<usize> {
        self.arena[node]
            .node()
            .children
            .iter()
            .copied()
            .find(|&child| self.arena[child].name == name)
    }

    /// Add a new leaf element at the given element path
    ///
    /// Creates any missing intermediate nodes. An empty path binds the
    /// unnamed root leaf (scalar item). Adding below an existing leaf, or
    /// at an already-occupied path, is a configuration error.
    pub fn add_leaf(
        &mut self,
        path: &[String],
        consumer: Arc<dyn ValueConsumer>,
    ) -> OpcResult<LeafHandle> {
        // Walk down the chain of children as long as names match.
        let mut remaining: &[String] = path;
        let mut branch = self.root;
        while let Some(part) = remaining.first() {
            match branch {
                Some(elem) if !self.arena[elem].is_leaf() => {
                    match self.find_child(elem, part) {
                        Some(child) => {
                            branch = Some(child);
                            remaining = &remaining[1..];
                        }
                        None => break,
                    }
                }
                _ => break,
            }
        }

        if let Some(elem) = branch {
            if self.arena[elem].is_leaf() {
                return Err(OpcError::Config(format!(
                    "can't add leaf to existing leaf '{}'",
                    self.arena[elem].name
                )));
            }
        }
        if remaining.is_empty() {
            if self.root.is_some() {
                return Err(OpcError::Config("root element does already exist".into()));
            }
            // Scalar item: the unnamed root leaf.
            let leaf = self.new_leaf("", consumer);
            self.root = Some(leaf);
            return Ok(LeafHandle(leaf));
        }

        let Some((leaf_name, intermediate)) = remaining.split_last() else {
            return Err(OpcError::Config("empty element path".into()));
        };
        let leaf = self.new_leaf(leaf_name, consumer);
        let mut elem = leaf;
        for name in intermediate.iter().rev() {
            let node = self.new_node(name);
            self.arena[node].node_mut().children.push(elem);
            self.arena[elem].parent = Some(node);
            elem = node;
        }
        match branch {
            Some(parent) => {
                self.arena[parent].node_mut().children.push(elem);
                self.arena[elem].parent = Some(parent);
            }
            None => {
                let node = self.new_node("[ROOT]");
                self.arena[node].node_mut().children.push(elem);
                self.arena[elem].parent = Some(node);
                self.root = Some(node);
            }
        }
        Ok(LeafHandle(leaf))
    }

    /// Push an incoming value down the tree, starting at the root
    pub fn set_incoming_data(
        &mut self,
        value: Variant,
        reason: ProcessReason,
        status: StatusCode,
        timestamp: u64,
        resolver: &dyn StructureResolver,
    ) {
        self.last_data_timestamp = None;
        if let Some(root) = self.root {
            let time_from = self.time_source_member.clone();
            self.element_incoming(
                root,
                value,
                reason,
                status,
                timestamp,
                time_from.as_deref(),
                resolver,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn element_incoming(
        &mut self,
        idx: usize,
        value: Variant,
        reason: ProcessReason,
        status: StatusCode,
        timestamp: u64,
        time_from: Option<&str>,
        resolver: &dyn StructureResolver,
    ) {
        match &mut self.arena[idx].kind {
            ElementKind::Leaf(leaf) => {
                let was_first = leaf
                    .queue
                    .push(Update::with_data(timestamp, reason, value, status));
                if was_first {
                    leaf.consumer.notify(reason);
                }
            }
            ElementKind::Node(node) => {
                node.template = Some(value.clone());
                match value {
                    Variant::Structure { type_id, fields } => {
                        let Some(definition) = resolver.structure_definition(&type_id) else {
                            log::error!(
                                "cannot get a structure definition for element '{}' (type id {}) - check access to type dictionary",
                                self.arena[idx].name,
                                type_id
                            );
                            return;
                        };
                        if !self.arena[idx].node().mapped {
                            self.create_map(idx, &definition, time_from);
                        }
                        if let Some(ts_member) = self.arena[idx].node().time_source {
                            match fields.get(ts_member) {
                                Some(Some(Variant::DateTime(ts))) => {
                                    self.last_data_timestamp = Some(*ts);
                                }
                                _ => {
                                    log::warn!(
                                        "timestamp element of '{}' is missing or no DateTime - using source timestamp",
                                        self.arena[idx].name
                                    );
                                }
                            }
                        }
                        let map = self.member_map_entries(idx);
                        for (member, child) in map {
                            match fields.get(member) {
                                Some(Some(member_value)) => {
                                    self.element_incoming(
                                        child,
                                        member_value.clone(),
                                        reason,
                                        status,
                                        timestamp,
                                        None,
                                        resolver,
                                    );
                                }
                                _ => {
                                    // Absent optional (or unselected arm of
                                    // a union-encoded structure): deliver a
                                    // failure instead of letting stale leaf
                                    // data linger.
                                    self.element_incoming(
                                        child,
                                        Variant::Null,
                                        ProcessReason::ReadFailure,
                                        StatusCode::BAD_NO_DATA,
                                        timestamp,
                                        None,
                                        resolver,
                                    );
                                }
                            }
                        }
                    }
                    Variant::Union {
                        type_id,
                        selector,
                        value,
                    } => {
                        let Some(definition) = resolver.structure_definition(&type_id) else {
                            log::error!(
                                "cannot get a union definition for element '{}' (type id {}) - check access to type dictionary",
                                self.arena[idx].name,
                                type_id
                            );
                            return;
                        };
                        if !self.arena[idx].node().mapped {
                            self.create_map(idx, &definition, time_from);
                        }
                        // At most one member is populated; route only the
                        // selected arm's mapped child.
                        if selector > 0 {
                            if let Some(arm_value) = value {
                                let member = (selector - 1) as usize;
                                if let Some(&child) =
                                    self.arena[idx].node().member_map.get(&member)
                                {
                                    self.element_incoming(
                                        child,
                                        *arm_value,
                                        reason,
                                        status,
                                        timestamp,
                                        None,
                                        resolver,
                                    );
                                }
                            }
                        }
                    }
                    Variant::LocalizedText { locale, text } => {
                        if !self.arena[idx].node().mapped {
                            self.create_static_map(idx, &["locale", "text"]);
                        }
                        for (member, child) in self.member_map_entries(idx) {
                            let member_value = match member {
                                0 => Variant::String(locale.clone()),
                                _ => Variant::String(text.clone()),
                            };
                            self.element_incoming(
                                child,
                                member_value,
                                reason,
                                status,
                                timestamp,
                                None,
                                resolver,
                            );
                        }
                    }
                    Variant::QualifiedName {
                        namespace_index,
                        name,
                    } => {
                        if !self.arena[idx].node().mapped {
                            self.create_static_map(idx, &["namespaceIndex", "name"]);
                        }
                        for (member, child) in self.member_map_entries(idx) {
                            let member_value = match member {
                                0 => Variant::UInt16(namespace_index),
                                _ => Variant::String(name.clone()),
                            };
                            self.element_incoming(
                                child,
                                member_value,
                                reason,
                                status,
                                timestamp,
                                None,
                                resolver,
                            );
                        }
                    }
                    other => {
                        log::error!(
                            "element '{}' is no structured data but a {}",
                            self.arena[idx].name,
                            other.kind().as_str()
                        );
                    }
                }
            }
        }
    }

    fn member_map_entries(&self, idx: usize) -> Vec<(usize, usize)> {
        self.arena[idx]
            .node()
            .member_map
            .iter()
            .map(|(&member, &child)| (member, child))
            .collect()
    }

    /// Build the member-index map by name-matching child elements against
    /// the definition's declared member names
    fn create_map(
        &mut self,
        idx: usize,
        definition: &opcbridge_core::StructureDefinition,
        time_from: Option<&str>,
    ) {
        let children = self.arena[idx].node().children.clone();
        let mut member_map = BTreeMap::new();
        for child in children {
            match definition.member_index(&self.arena[child].name) {
                Some(member) => {
                    member_map.insert(member, child);
                }
                None => {
                    // Left unmapped, permanently inert for this epoch.
                    log::warn!(
                        "element '{}' not found in structure definition '{}'",
                        self.arena[child].name,
                        definition.name
                    );
                }
            }
        }
        let time_source = time_from.and_then(|name| {
            let member = definition.member_index(name);
            if member.is_none() {
                log::warn!(
                    "timestamp element '{}' not found - using source timestamp",
                    name
                );
            }
            member
        });
        log::debug!(
            "element '{}': mapped {}/{} child elements to a structure of {} members",
            self.arena[idx].name,
            member_map.len(),
            self.arena[idx].node().children.len(),
            definition.members.len()
        );
        let node = self.arena[idx].node_mut();
        node.member_map = member_map;
        node.time_source = time_source;
        node.mapped = true;
    }

    /// Map children of the well-known two-field composites by fixed name
    fn create_static_map(&mut self, idx: usize, field_names: &[&str]) {
        let children = self.arena[idx].node().children.clone();
        let mut member_map = BTreeMap::new();
        for child in children {
            match field_names
                .iter()
                .position(|&name| name == self.arena[child].name)
            {
                Some(member) => {
                    member_map.insert(member, child);
                }
                None => log::warn!(
                    "element '{}' under '{}' matches no field of the composite",
                    self.arena[child].name,
                    self.arena[idx].name
                ),
            }
        }
        let node = self.arena[idx].node_mut();
        node.member_map = member_map;
        node.mapped = true;
    }

    /// Propagate an out-of-band event (principally connection loss) to
    /// every leaf
    ///
    /// On connection loss every node also drops its member map, so that it
    /// is rebuilt against the next live type definition.
    pub fn set_incoming_event(
        &mut self,
        reason: ProcessReason,
        status: StatusCode,
        timestamp: u64,
    ) {
        if let Some(root) = self.root {
            self.element_event(root, reason, status, timestamp);
        }
    }

    fn element_event(
        &mut self,
        idx: usize,
        reason: ProcessReason,
        status: StatusCode,
        timestamp: u64,
    ) {
        match &mut self.arena[idx].kind {
            ElementKind::Leaf(leaf) => {
                let was_first = leaf.queue.push(Update::event(timestamp, reason, status));
                if was_first {
                    leaf.consumer.notify(reason);
                }
            }
            ElementKind::Node(_) => {
                let children = self.arena[idx].node().children.clone();
                for child in children {
                    self.element_event(child, reason, status, timestamp);
                }
                if reason == ProcessReason::ConnectionLoss {
                    let node = self.arena[idx].node_mut();
                    node.member_map.clear();
                    node.time_source = None;
                    node.mapped = false;
                }
            }
        }
    }

    /// Assemble the outgoing value from the drained dirty write slots
    ///
    /// A node re-reads its last incoming value as a template and
    /// substitutes the outgoing value of every dirty mapped child; a node
    /// with no dirty children returns its template unmodified. Returns
    /// `None` when no template has been received yet (or, for a scalar
    /// root leaf, when its slot is not dirty).
    pub fn assemble_outgoing(&self, dirty: &HashMap<LeafHandle, Variant>) -> Option<Variant> {
        let root = self.root?;
        self.element_assemble(root, dirty)
    }

    fn element_assemble(
        &self,
        idx: usize,
        dirty: &HashMap<LeafHandle, Variant>,
    ) -> Option<Variant> {
        match &self.arena[idx].kind {
            ElementKind::Leaf(_) => dirty.get(&LeafHandle(idx)).cloned(),
            ElementKind::Node(node) => {
                let Some(mut template) = node.template.clone() else {
                    log::warn!(
                        "element '{}' has no incoming template to assemble a write from",
                        self.arena[idx].name
                    );
                    return None;
                };
                for (&member, &child) in &node.member_map {
                    if !self.subtree_dirty(child, dirty) {
                        continue;
                    }
                    let Some(child_value) = self.element_assemble(child, dirty) else {
                        continue;
                    };
                    match &mut template {
                        Variant::Structure { fields, .. } => {
                            if member < fields.len() {
                                fields[member] = Some(child_value);
                            }
                        }
                        Variant::Union {
                            selector, value, ..
                        } => {
                            *selector = (member + 1) as u32;
                            *value = Some(Box::new(child_value));
                        }
                        Variant::LocalizedText { locale, text } => {
                            if let Variant::String(s) = child_value {
                                if member == 0 {
                                    *locale = s;
                                } else {
                                    *text = s;
                                }
                            }
                        }
                        Variant::QualifiedName {
                            namespace_index,
                            name,
                        } => match (member, child_value) {
                            (0, Variant::UInt16(ns)) => *namespace_index = ns,
                            (1, Variant::String(s)) => *name = s,
                            _ => {}
                        },
                        _ => {}
                    }
                }
                Some(template)
            }
        }
    }

    fn subtree_dirty(&self, idx: usize, dirty: &HashMap<LeafHandle, Variant>) -> bool {
        match &self.arena[idx].kind {
            ElementKind::Leaf(_) => dirty.contains_key(&LeafHandle(idx)),
            ElementKind::Node(node) => node
                .member_map
                .values()
                .any(|&child| self.subtree_dirty(child, dirty)),
        }
    }

    /// Remove and return the next queued update of a leaf
    pub fn pop_update(&mut self, handle: LeafHandle) -> Option<(Update, Option<ProcessReason>)> {
        match &mut self.arena[handle.0].kind {
            ElementKind::Leaf(leaf) => leaf.queue.pop(),
            ElementKind::Node(_) => None,
        }
    }

    /// Trigger downstream re-processing on every mapped leaf
    pub fn request_notify(&self, reason: ProcessReason) {
        if let Some(root) = self.root {
            self.element_request_notify(root, reason);
        }
    }

    fn element_request_notify(&self, idx: usize, reason: ProcessReason) {
        match &self.arena[idx].kind {
            ElementKind::Leaf(leaf) => leaf.consumer.notify(reason),
            ElementKind::Node(node) => {
                for &child in node.member_map.values() {
                    self.element_request_notify(child, reason);
                }
            }
        }
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.arena.iter().filter(|e| !e.is_leaf()).count()
    }

    #[cfg(test)]
    fn mapped_flags(&self) -> Vec<bool> {
        self.arena
            .iter()
            .filter_map(|e| match &e.kind {
                ElementKind::Node(n) => Some(n.mapped),
                ElementKind::Leaf(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcbridge_core::{NodeId, StructureDefinition, StructureMember};
    use std::sync::Mutex;

    struct RecordingConsumer {
        notified: Mutex<Vec<ProcessReason>>,
    }

    impl RecordingConsumer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                notified: Mutex::new(Vec::new()),
            })
        }

        fn reasons(&self) -> Vec<ProcessReason> {
            self.notified.lock().unwrap().clone()
        }
    }

    impl ValueConsumer for RecordingConsumer {
        fn notify(&self, reason: ProcessReason) {
            self.notified.lock().unwrap().push(reason);
        }
    }

    struct FixedResolver {
        definition: StructureDefinition,
    }

    impl StructureResolver for FixedResolver {
        fn structure_definition(&self, type_id: &NodeId) -> Option<StructureDefinition> {
            (type_id == &self.definition.type_id).then(|| self.definition.clone())
        }
    }

    struct EmptyResolver;

    impl StructureResolver for EmptyResolver {
        fn structure_definition(&self, _type_id: &NodeId) -> Option<StructureDefinition> {
            None
        }
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn pump_definition() -> StructureDefinition {
        StructureDefinition {
            type_id: NodeId::numeric(2, 100),
            name: "Pump".into(),
            is_union: false,
            members: vec![
                StructureMember {
                    name: "speed".into(),
                    optional: false,
                },
                StructureMember {
                    name: "mode".into(),
                    optional: true,
                },
            ],
        }
    }

    fn pump_value(speed: i32, mode: Option<&str>) -> Variant {
        Variant::Structure {
            type_id: NodeId::numeric(2, 100),
            fields: vec![
                Some(Variant::Int32(speed)),
                mode.map(|m| Variant::String(m.to_string())),
            ],
        }
    }

    #[test]
    fn test_add_leaf_creates_intermediate_nodes() {
        let mut tree = BindingTree::new(3, true, None);
        tree.add_leaf(&path(&["A", "B", "C"]), RecordingConsumer::new())
            .unwrap();
        // [ROOT] plus exactly two intermediate nodes.
        assert_eq!(tree.node_count(), 3);
        let before = tree.len();
        tree.add_leaf(&path(&["A", "B", "D"]), RecordingConsumer::new())
            .unwrap();
        // Zero additional nodes, one leaf.
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.len(), before + 1);
    }

    #[test]
    fn test_add_leaf_under_leaf_is_config_error() {
        let mut tree = BindingTree::new(3, true, None);
        tree.add_leaf(&path(&["A", "B"]), RecordingConsumer::new())
            .unwrap();
        let err = tree
            .add_leaf(&path(&["A", "B", "C"]), RecordingConsumer::new())
            .unwrap_err();
        assert!(matches!(err, OpcError::Config(_)));
    }

    #[test]
    fn test_add_scalar_root_twice_is_config_error() {
        let mut tree = BindingTree::new(3, true, None);
        tree.add_leaf(&[], RecordingConsumer::new()).unwrap();
        assert!(tree.add_leaf(&[], RecordingConsumer::new()).is_err());
        assert!(tree
            .add_leaf(&path(&["A"]), RecordingConsumer::new())
            .is_err());
    }

    #[test]
    fn test_scalar_incoming_notifies_once_per_nonempty_transition() {
        let mut tree = BindingTree::new(3, true, None);
        let consumer = RecordingConsumer::new();
        let leaf = tree.add_leaf(&[], consumer.clone()).unwrap();

        tree.set_incoming_data(
            Variant::Double(1.5),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &EmptyResolver,
        );
        tree.set_incoming_data(
            Variant::Double(2.5),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1001,
            &EmptyResolver,
        );
        // Only the empty -> non-empty transition notifies.
        assert_eq!(consumer.reasons(), vec![ProcessReason::IncomingData]);

        let (first, next) = tree.pop_update(leaf).unwrap();
        assert_eq!(first.data, Some(Variant::Double(1.5)));
        assert_eq!(next, Some(ProcessReason::IncomingData));
        let (second, next) = tree.pop_update(leaf).unwrap();
        assert_eq!(second.data, Some(Variant::Double(2.5)));
        assert_eq!(next, None);

        tree.set_incoming_data(
            Variant::Double(3.5),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1002,
            &EmptyResolver,
        );
        assert_eq!(consumer.reasons().len(), 2);
    }

    #[test]
    fn test_structure_decode_routes_members_by_name() {
        let mut tree = BindingTree::new(3, true, None);
        let speed = RecordingConsumer::new();
        let mode = RecordingConsumer::new();
        let speed_leaf = tree.add_leaf(&path(&["speed"]), speed.clone()).unwrap();
        let mode_leaf = tree.add_leaf(&path(&["mode"]), mode.clone()).unwrap();
        let resolver = FixedResolver {
            definition: pump_definition(),
        };

        tree.set_incoming_data(
            pump_value(1500, Some("auto")),
            ProcessReason::ReadComplete,
            StatusCode::GOOD,
            1000,
            &resolver,
        );
        let (speed_update, _) = tree.pop_update(speed_leaf).unwrap();
        assert_eq!(speed_update.data, Some(Variant::Int32(1500)));
        let (mode_update, _) = tree.pop_update(mode_leaf).unwrap();
        assert_eq!(mode_update.data, Some(Variant::String("auto".into())));
    }

    #[test]
    fn test_absent_optional_member_degrades_to_failure() {
        let mut tree = BindingTree::new(3, true, None);
        let mode = RecordingConsumer::new();
        tree.add_leaf(&path(&["speed"]), RecordingConsumer::new())
            .unwrap();
        let mode_leaf = tree.add_leaf(&path(&["mode"]), mode.clone()).unwrap();
        let resolver = FixedResolver {
            definition: pump_definition(),
        };

        tree.set_incoming_data(
            pump_value(1500, None),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &resolver,
        );
        let (update, _) = tree.pop_update(mode_leaf).unwrap();
        assert_eq!(update.reason, ProcessReason::ReadFailure);
        assert_eq!(update.status, StatusCode::BAD_NO_DATA);
    }

    #[test]
    fn test_unmatched_child_is_inert() {
        let mut tree = BindingTree::new(3, true, None);
        let stray = RecordingConsumer::new();
        tree.add_leaf(&path(&["speed"]), RecordingConsumer::new())
            .unwrap();
        let stray_leaf = tree
            .add_leaf(&path(&["notamember"]), stray.clone())
            .unwrap();
        let resolver = FixedResolver {
            definition: pump_definition(),
        };
        tree.set_incoming_data(
            pump_value(1, Some("x")),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &resolver,
        );
        assert!(tree.pop_update(stray_leaf).is_none());
        assert!(stray.reasons().is_empty());
    }

    #[test]
    fn test_connection_loss_clears_member_maps() {
        let mut tree = BindingTree::new(3, true, None);
        let speed = RecordingConsumer::new();
        let speed_leaf = tree.add_leaf(&path(&["speed"]), speed.clone()).unwrap();
        let resolver = FixedResolver {
            definition: pump_definition(),
        };
        tree.set_incoming_data(
            pump_value(1, None),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &resolver,
        );
        assert!(tree.mapped_flags().iter().all(|&m| m));

        tree.set_incoming_event(
            ProcessReason::ConnectionLoss,
            StatusCode::BAD_CONNECTION_LOST,
            2000,
        );
        assert!(tree.mapped_flags().iter().all(|&m| !m));
        // Leaf got the connection-loss event after the data update.
        let _ = tree.pop_update(speed_leaf).unwrap();
        let (event, _) = tree.pop_update(speed_leaf).unwrap();
        assert_eq!(event.reason, ProcessReason::ConnectionLoss);
        assert!(!event.has_data());

        // Next structured update rebuilds the map from scratch.
        tree.set_incoming_data(
            pump_value(2, None),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            3000,
            &resolver,
        );
        assert!(tree.mapped_flags().iter().all(|&m| m));
        let (update, _) = tree.pop_update(speed_leaf).unwrap();
        assert_eq!(update.data, Some(Variant::Int32(2)));
    }

    #[test]
    fn test_outgoing_without_dirty_children_is_template() {
        let mut tree = BindingTree::new(3, true, None);
        tree.add_leaf(&path(&["speed"]), RecordingConsumer::new())
            .unwrap();
        let resolver = FixedResolver {
            definition: pump_definition(),
        };
        let incoming = pump_value(1500, Some("auto"));
        tree.set_incoming_data(
            incoming.clone(),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &resolver,
        );
        let outgoing = tree.assemble_outgoing(&HashMap::new()).unwrap();
        assert_eq!(outgoing, incoming);
    }

    #[test]
    fn test_outgoing_substitutes_dirty_children() {
        let mut tree = BindingTree::new(3, true, None);
        let speed_leaf = tree
            .add_leaf(&path(&["speed"]), RecordingConsumer::new())
            .unwrap();
        tree.add_leaf(&path(&["mode"]), RecordingConsumer::new())
            .unwrap();
        let resolver = FixedResolver {
            definition: pump_definition(),
        };
        tree.set_incoming_data(
            pump_value(1500, Some("auto")),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &resolver,
        );

        let mut outgoing = OutgoingBuffer::new();
        outgoing.set(speed_leaf, Variant::Int32(1800));
        assert!(outgoing.is_dirty());
        let assembled = tree.assemble_outgoing(&outgoing.take_dirty()).unwrap();
        assert_eq!(
            assembled,
            Variant::Structure {
                type_id: NodeId::numeric(2, 100),
                fields: vec![
                    Some(Variant::Int32(1800)),
                    Some(Variant::String("auto".into()))
                ],
            }
        );
        // Slots were consumed: the next assembly is the plain template.
        assert!(!outgoing.is_dirty());
        let again = tree.assemble_outgoing(&outgoing.take_dirty()).unwrap();
        assert_eq!(
            again,
            Variant::Structure {
                type_id: NodeId::numeric(2, 100),
                fields: vec![
                    Some(Variant::Int32(1500)),
                    Some(Variant::String("auto".into()))
                ],
            }
        );
    }

    #[test]
    fn test_union_routes_only_selected_arm() {
        let mut tree = BindingTree::new(3, true, None);
        let a = RecordingConsumer::new();
        let b = RecordingConsumer::new();
        let a_leaf = tree.add_leaf(&path(&["asInt"]), a.clone()).unwrap();
        let b_leaf = tree.add_leaf(&path(&["asString"]), b.clone()).unwrap();
        let definition = StructureDefinition {
            type_id: NodeId::numeric(2, 200),
            name: "IntOrString".into(),
            is_union: true,
            members: vec![
                StructureMember {
                    name: "asInt".into(),
                    optional: false,
                },
                StructureMember {
                    name: "asString".into(),
                    optional: false,
                },
            ],
        };
        let resolver = FixedResolver { definition };

        tree.set_incoming_data(
            Variant::Union {
                type_id: NodeId::numeric(2, 200),
                selector: 1,
                value: Some(Box::new(Variant::Int32(7))),
            },
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &resolver,
        );
        let (update, _) = tree.pop_update(a_leaf).unwrap();
        assert_eq!(update.data, Some(Variant::Int32(7)));
        assert!(tree.pop_update(b_leaf).is_none());
        assert!(b.reasons().is_empty());
    }

    #[test]
    fn test_union_outgoing_sets_selector() {
        let mut tree = BindingTree::new(3, true, None);
        tree.add_leaf(&path(&["asInt"]), RecordingConsumer::new())
            .unwrap();
        let b_leaf = tree
            .add_leaf(&path(&["asString"]), RecordingConsumer::new())
            .unwrap();
        let definition = StructureDefinition {
            type_id: NodeId::numeric(2, 200),
            name: "IntOrString".into(),
            is_union: true,
            members: vec![
                StructureMember {
                    name: "asInt".into(),
                    optional: false,
                },
                StructureMember {
                    name: "asString".into(),
                    optional: false,
                },
            ],
        };
        let resolver = FixedResolver { definition };
        tree.set_incoming_data(
            Variant::Union {
                type_id: NodeId::numeric(2, 200),
                selector: 1,
                value: Some(Box::new(Variant::Int32(7))),
            },
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &resolver,
        );

        let mut outgoing = OutgoingBuffer::new();
        outgoing.set(b_leaf, Variant::String("manual".into()));
        let assembled = tree.assemble_outgoing(&outgoing.take_dirty()).unwrap();
        assert_eq!(
            assembled,
            Variant::Union {
                type_id: NodeId::numeric(2, 200),
                selector: 2,
                value: Some(Box::new(Variant::String("manual".into()))),
            }
        );
    }

    #[test]
    fn test_localized_text_static_map() {
        let mut tree = BindingTree::new(3, true, None);
        let locale = RecordingConsumer::new();
        let text = RecordingConsumer::new();
        let locale_leaf = tree.add_leaf(&path(&["locale"]), locale.clone()).unwrap();
        let text_leaf = tree.add_leaf(&path(&["text"]), text.clone()).unwrap();

        tree.set_incoming_data(
            Variant::LocalizedText {
                locale: "en".into(),
                text: "running".into(),
            },
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &EmptyResolver,
        );
        let (u, _) = tree.pop_update(locale_leaf).unwrap();
        assert_eq!(u.data, Some(Variant::String("en".into())));
        let (u, _) = tree.pop_update(text_leaf).unwrap();
        assert_eq!(u.data, Some(Variant::String("running".into())));
    }

    #[test]
    fn test_data_timestamp_extracted_from_member() {
        let definition = StructureDefinition {
            type_id: NodeId::numeric(2, 300),
            name: "Sample".into(),
            is_union: false,
            members: vec![
                StructureMember {
                    name: "value".into(),
                    optional: false,
                },
                StructureMember {
                    name: "acquired".into(),
                    optional: false,
                },
            ],
        };
        let mut tree = BindingTree::new(3, true, Some("acquired".into()));
        tree.add_leaf(&path(&["value"]), RecordingConsumer::new())
            .unwrap();
        let resolver = FixedResolver { definition };
        tree.set_incoming_data(
            Variant::Structure {
                type_id: NodeId::numeric(2, 300),
                fields: vec![Some(Variant::Double(4.2)), Some(Variant::DateTime(777))],
            },
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &resolver,
        );
        assert_eq!(tree.last_data_timestamp(), Some(777));
    }

    #[test]
    fn test_missing_definition_keeps_previous_leaf_value() {
        let mut tree = BindingTree::new(3, true, None);
        let speed = RecordingConsumer::new();
        let speed_leaf = tree.add_leaf(&path(&["speed"]), speed.clone()).unwrap();
        tree.set_incoming_data(
            pump_value(9, None),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &EmptyResolver,
        );
        // No definition: decode skipped, no update delivered.
        assert!(tree.pop_update(speed_leaf).is_none());
        assert!(speed.reasons().is_empty());
    }

    #[test]
    fn test_request_notify_reaches_only_mapped_leaves() {
        let mut tree = BindingTree::new(3, true, None);
        let speed = RecordingConsumer::new();
        let stray = RecordingConsumer::new();
        tree.add_leaf(&path(&["speed"]), speed.clone()).unwrap();
        tree.add_leaf(&path(&["notamember"]), stray.clone()).unwrap();
        let resolver = FixedResolver {
            definition: pump_definition(),
        };
        tree.set_incoming_data(
            pump_value(1, Some("x")),
            ProcessReason::IncomingData,
            StatusCode::GOOD,
            1000,
            &resolver,
        );
        speed.notified.lock().unwrap().clear();

        tree.request_notify(ProcessReason::WriteRequest);
        assert_eq!(speed.reasons(), vec![ProcessReason::WriteRequest]);
        assert!(stray.reasons().is_empty());
    }
}
