//! Runtime configuration for sessions and items
//!
//! All defaults live in explicit `Default` implementations on the
//! configuration structs and are injected at construction time; there is no
//! module-global mutable state.

use crate::node_id::Identifier;
use crate::reason::Priority;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which timestamp an item's consumers should see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampSource {
    /// Server timestamp of the delivered value
    Server,
    /// Source timestamp of the delivered value
    Source,
    /// A DateTime member of the structured value, selected by name
    Data(String),
}

impl Default for TimestampSource {
    fn default() -> Self {
        TimestampSource::Server
    }
}

/// Initial-value policy applied once per (re)connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialPolicy {
    /// Take the initial read result as the resting value
    Read,
    /// Take the initial read result, never write back
    Ignore,
    /// After the initial read, push the configured resting output value
    /// to the server exactly once
    Write,
}

impl InitialPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitialPolicy::Read => "read",
            InitialPolicy::Ignore => "ignore",
            InitialPolicy::Write => "write",
        }
    }
}

impl Default for InitialPolicy {
    fn default() -> Self {
        InitialPolicy::Read
    }
}

/// Configuration for a single item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfig {
    /// Local namespace index (mapped to the server's index per connect)
    pub namespace_index: u16,
    /// Node identifier on the server
    pub identifier: Identifier,
    /// Name of the subscription this item is monitored on, if any
    pub subscription: Option<String>,
    /// Requested sampling interval
    pub sampling_interval: Duration,
    /// Requested server-side queue size
    pub queue_size: u32,
    /// Client-side update queue depth
    pub client_queue_size: usize,
    /// Discard the oldest (instead of the newest) update on overrun
    pub discard_oldest: bool,
    /// Create a server-side monitored item for this item
    pub monitored: bool,
    /// Register the node handle on the server after connecting
    pub register_node: bool,
    /// Request priority for reads and writes of this item
    pub priority: Priority,
    /// Element path within the structured type; empty for scalar items
    pub element_path: Vec<String>,
    /// Timestamp the consumers should see
    pub timestamp_source: TimestampSource,
    /// Initial-value policy applied after every (re)connect
    pub initial_policy: InitialPolicy,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            namespace_index: 0,
            identifier: Identifier::Numeric(0),
            subscription: None,
            sampling_interval: Duration::from_millis(250),
            queue_size: 1,
            client_queue_size: 3,
            discard_oldest: true,
            monitored: true,
            register_node: false,
            priority: Priority::Low,
            element_path: Vec::new(),
            timestamp_source: TimestampSource::Server,
            initial_policy: InitialPolicy::Read,
        }
    }
}

/// Configuration for a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// URL of the server endpoint
    pub server_url: String,
    /// Connect at startup and keep reconnecting after connection loss
    pub auto_connect: bool,
    /// Maximum nodes per service call (0 = unbounded)
    pub max_nodes_per_service_call: usize,
    /// Lower bound of the batcher pacing interpolation
    pub min_hold_off: Duration,
    /// Upper bound of the batcher pacing interpolation
    pub max_hold_off: Duration,
    /// Delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Configured local namespace mappings: local index -> namespace URI
    pub namespace_uris: Vec<(u16, String)>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            auto_connect: true,
            max_nodes_per_service_call: 0,
            min_hold_off: Duration::ZERO,
            max_hold_off: Duration::ZERO,
            reconnect_delay: Duration::from_secs(10),
            namespace_uris: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_defaults() {
        let config = ItemConfig::default();
        assert!(config.monitored);
        assert!(config.discard_oldest);
        assert_eq!(config.priority, Priority::Low);
        assert_eq!(config.initial_policy, InitialPolicy::Read);
    }
}
