//! OPC UA style status codes
//!
//! A status code is a 32-bit value whose top two bits encode the severity
//! (00 = good, 01 = uncertain, 10 = bad). Only the subset of well-known
//! codes used by the bridge runtime is defined here; a transport driver is
//! free to deliver any other code it receives from the server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status code attached to values, updates and service results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Operation succeeded
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// Generic failure
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    /// No data available (absent optional member, unselected union arm)
    pub const BAD_NO_DATA: StatusCode = StatusCode(0x809B_0000);
    /// Connection to the server was lost
    pub const BAD_CONNECTION_LOST: StatusCode = StatusCode(0x80AC_0000);
    /// The node id is unknown on the server
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// Value type does not match the expected type
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);

    /// Check if the severity is good
    pub fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Check if the severity is bad
    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::GOOD
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StatusCode::GOOD => write!(f, "Good"),
            StatusCode::BAD => write!(f, "Bad"),
            StatusCode::BAD_NO_DATA => write!(f, "BadNoData"),
            StatusCode::BAD_CONNECTION_LOST => write!(f, "BadConnectionLost"),
            StatusCode::BAD_NODE_ID_UNKNOWN => write!(f, "BadNodeIdUnknown"),
            StatusCode::BAD_TYPE_MISMATCH => write!(f, "BadTypeMismatch"),
            StatusCode(code) => write!(f, "0x{:08X}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());
        assert!(StatusCode::BAD_NO_DATA.is_bad());
        assert!(StatusCode::BAD_CONNECTION_LOST.is_bad());
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::GOOD.to_string(), "Good");
        assert_eq!(StatusCode(0x8123_0000).to_string(), "0x81230000");
    }
}
