//! Process reasons, per-item connection states and request priorities

use serde::{Deserialize, Serialize};

/// Reason an update is delivered to a bound consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessReason {
    /// No reason (queue is empty)
    None,
    /// Data arrived through a subscription notification
    IncomingData,
    /// Connection to the server was lost
    ConnectionLoss,
    /// A read service completed
    ReadComplete,
    /// A read service failed
    ReadFailure,
    /// A write service completed
    WriteComplete,
    /// A write service failed
    WriteFailure,
    /// A read was requested
    ReadRequest,
    /// A write was requested
    WriteRequest,
}

impl ProcessReason {
    /// Get human-readable reason name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessReason::None => "none",
            ProcessReason::IncomingData => "incomingData",
            ProcessReason::ConnectionLoss => "connectionLoss",
            ProcessReason::ReadComplete => "readComplete",
            ProcessReason::ReadFailure => "readFailure",
            ProcessReason::WriteComplete => "writeComplete",
            ProcessReason::WriteFailure => "writeFailure",
            ProcessReason::ReadRequest => "readRequest",
            ProcessReason::WriteRequest => "writeRequest",
        }
    }
}

impl Default for ProcessReason {
    fn default() -> Self {
        ProcessReason::None
    }
}

/// Per-item connection state
///
/// Tracks where a single item is in the post-connect initialization ladder.
/// `InitialRead` gates whether a completed read triggers the one-shot
/// forced initial write configured through the item's initial-value policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Session is down, value is stale
    Down,
    /// Waiting for the initial read after (re)connect
    InitialRead,
    /// Initial read done, waiting for the forced initial write
    InitialWrite,
    /// Fully initialized
    Up,
}

impl ConnectionStatus {
    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Down => "down",
            ConnectionStatus::InitialRead => "initialRead",
            ConnectionStatus::InitialWrite => "initialWrite",
            ConnectionStatus::Up => "up",
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Down
    }
}

/// Three-level request priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Priority {
    /// Number of priority levels
    pub const LEVELS: usize = 3;

    /// Queue index for this priority
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Priorities in drain order (high first)
    pub fn drain_order() -> [Priority; 3] {
        [Priority::High, Priority::Medium, Priority::Low]
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_names() {
        assert_eq!(ProcessReason::IncomingData.as_str(), "incomingData");
        assert_eq!(ProcessReason::ConnectionLoss.as_str(), "connectionLoss");
    }

    #[test]
    fn test_drain_order() {
        let order = Priority::drain_order();
        assert_eq!(order[0], Priority::High);
        assert_eq!(order[2], Priority::Low);
    }
}
