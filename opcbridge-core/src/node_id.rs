use crate::error::{OpcError, OpcResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Node identifier within a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    /// Numeric identifier
    Numeric(u32),
    /// String identifier
    String(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "i={}", n),
            Identifier::String(s) => write!(f, "s={}", s),
        }
    }
}

/// Server-side node address: namespace index plus identifier
///
/// The namespace index in an item configuration is a *local* index; the
/// session maps it to the server's index against the namespace table read
/// on every (re)connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub namespace_index: u16,
    pub identifier: Identifier,
}

impl NodeId {
    /// Create a node id with a numeric identifier
    pub fn numeric(namespace_index: u16, identifier: u32) -> Self {
        Self {
            namespace_index,
            identifier: Identifier::Numeric(identifier),
        }
    }

    /// Create a node id with a string identifier
    pub fn string(namespace_index: u16, identifier: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: Identifier::String(identifier.into()),
        }
    }

    /// Return a copy with the namespace index replaced
    pub fn with_namespace(&self, namespace_index: u16) -> Self {
        Self {
            namespace_index,
            identifier: self.identifier.clone(),
        }
    }
}

fn node_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^ns=(\d+);(i|s)=(.+)$").unwrap())
}

impl FromStr for NodeId {
    type Err = OpcError;

    /// Parse the textual form `ns=<n>;i=<number>` or `ns=<n>;s=<string>`
    ///
    /// A malformed identifier is a configuration error, surfaced as a hard
    /// failure at setup time.
    fn from_str(s: &str) -> OpcResult<Self> {
        let caps = node_id_pattern()
            .captures(s.trim())
            .ok_or_else(|| OpcError::Config(format!("invalid node id '{}'", s)))?;
        let namespace_index: u16 = caps[1]
            .parse()
            .map_err(|_| OpcError::Config(format!("invalid namespace index in '{}'", s)))?;
        let identifier = match &caps[2] {
            "i" => Identifier::Numeric(
                caps[3]
                    .parse()
                    .map_err(|_| OpcError::Config(format!("invalid numeric identifier in '{}'", s)))?,
            ),
            _ => Identifier::String(caps[3].to_string()),
        };
        Ok(NodeId {
            namespace_index,
            identifier,
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};{}", self.namespace_index, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric() {
        let id: NodeId = "ns=2;i=42".parse().unwrap();
        assert_eq!(id, NodeId::numeric(2, 42));
    }

    #[test]
    fn test_parse_string() {
        let id: NodeId = "ns=3;s=Motor.Speed".parse().unwrap();
        assert_eq!(id, NodeId::string(3, "Motor.Speed"));
    }

    #[test]
    fn test_parse_invalid() {
        assert!("i=42".parse::<NodeId>().is_err());
        assert!("ns=x;i=42".parse::<NodeId>().is_err());
        assert!("ns=2;i=notanumber".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_roundtrip_display() {
        let id = NodeId::string(1, "a;b=c");
        assert_eq!(id.to_string().parse::<NodeId>().unwrap(), id);
    }
}
