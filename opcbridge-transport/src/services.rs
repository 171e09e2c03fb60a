//! Request and response types of the driver service calls

use opcbridge_core::{NodeId, StatusCode, Variant};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One node in a read service call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadValueId {
    pub node_id: NodeId,
}

/// One node/value pair in a write service call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteValue {
    pub node_id: NodeId,
    pub value: Variant,
}

/// Requested subscription parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParameters {
    pub publishing_interval: Duration,
    pub lifetime_count: u32,
    pub priority: u8,
}

/// Server-revised subscription parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisedSubscriptionParameters {
    /// Server-assigned subscription id
    pub subscription_id: u32,
    pub revised_publishing_interval: Duration,
    pub revised_lifetime_count: u32,
}

/// One entry in a bulk monitored-item creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemRequest {
    pub node_id: NodeId,
    /// Locally assigned stable handle used to dispatch notifications
    pub client_handle: u32,
    pub sampling_interval: Duration,
    pub queue_size: u32,
    pub discard_oldest: bool,
}

/// Per-entry result of a bulk monitored-item creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemResult {
    pub status: StatusCode,
    pub monitored_item_id: u32,
    /// Server-revised sampling interval; the last revision is authoritative
    pub revised_sampling_interval: Duration,
    pub revised_queue_size: u32,
}
