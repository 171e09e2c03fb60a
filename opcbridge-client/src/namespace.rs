//! Sticky local-to-remote namespace index mapping
//!
//! Item configurations address nodes with *local* namespace indices. A
//! local index explicitly mapped to a namespace URI survives reconnects:
//! on every transition to active the mapping is re-resolved against the
//! freshly read server namespace table, never discarded. Local indices
//! without a configured URI pass through unchanged.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct NamespaceMap {
    /// Configured local index -> namespace URI (sticky)
    uris: HashMap<u16, String>,
    /// Resolved local index -> server index, rebuilt per connect
    resolved: HashMap<u16, u16>,
}

impl NamespaceMap {
    pub fn new(mappings: impl IntoIterator<Item = (u16, String)>) -> Self {
        Self {
            uris: mappings.into_iter().collect(),
            resolved: HashMap::new(),
        }
    }

    /// Re-resolve all configured mappings against a server namespace table
    ///
    /// The position of a URI in the table is its index on the server.
    /// Configured URIs not present on the server are reported, not fatal:
    /// the local index then passes through unmapped.
    pub fn resolve(&mut self, server_table: &[String]) {
        self.resolved.clear();
        for (&local, uri) in &self.uris {
            match server_table.iter().position(|entry| entry == uri) {
                Some(remote) => {
                    self.resolved.insert(local, remote as u16);
                }
                None => {
                    log::warn!(
                        "namespace URI '{}' (local index {}) not found in server namespace table",
                        uri,
                        local
                    );
                }
            }
        }
    }

    /// Map a local namespace index to the server's index
    pub fn map(&self, local: u16) -> u16 {
        self.resolved.get(&local).copied().unwrap_or(local)
    }
}
