//! Registries for managing named sessions and subscriptions
//!
//! Names are kept unique across a whole key namespace (session and
//! subscription names share one), while lookups stay concurrent. The key
//! namespace is an explicit object passed into each registry, so tests run
//! with isolated namespaces instead of a file-scope singleton.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// Union set of keys from multiple registries, keeping names unique
/// across all of them
#[derive(Default)]
pub struct RegistryKeyNamespace {
    names: Mutex<HashSet<String>>,
}

impl RegistryKeyNamespace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Try to claim a name; `false` if it is already taken
    fn claim(&self, name: &str) -> bool {
        self.names.lock().unwrap().insert(name.to_string())
    }

    fn release(&self, name: &str) {
        self.names.lock().unwrap().remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().unwrap().contains(name)
    }
}

/// A registry for named objects of one kind
///
/// Supports concurrent lookup plus exclusive insert/remove.
pub struct Registry<T> {
    keys: Arc<RegistryKeyNamespace>,
    objects: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Registry<T> {
    pub fn new(keys: Arc<RegistryKeyNamespace>) -> Self {
        Self {
            keys,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Insert an object under a name unique across the key namespace
    ///
    /// Returns `false` (and leaves the registry unchanged) when the name
    /// is already taken by any registry sharing the namespace.
    pub fn insert(&self, name: &str, object: Arc<T>) -> bool {
        if !self.keys.claim(name) {
            return false;
        }
        self.objects
            .write()
            .unwrap()
            .insert(name.to_string(), object);
        true
    }

    /// Find an object by name
    pub fn find(&self, name: &str) -> Option<Arc<T>> {
        self.objects.read().unwrap().get(name).cloned()
    }

    /// Check for the presence of a name
    pub fn contains(&self, name: &str) -> bool {
        self.objects.read().unwrap().contains_key(name)
    }

    /// Remove an object, releasing its name
    pub fn remove(&self, name: &str) -> Option<Arc<T>> {
        let removed = self.objects.write().unwrap().remove(name);
        if removed.is_some() {
            self.keys.release(name);
        }
        removed
    }

    /// Number of registered objects
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find() {
        let keys = RegistryKeyNamespace::new();
        let registry: Registry<String> = Registry::new(keys);
        assert!(registry.insert("plc1", Arc::new("session".into())));
        assert!(registry.contains("plc1"));
        assert_eq!(registry.find("plc1").unwrap().as_str(), "session");
        assert!(registry.find("plc2").is_none());
    }

    #[test]
    fn test_names_unique_across_registries() {
        let keys = RegistryKeyNamespace::new();
        let sessions: Registry<String> = Registry::new(keys.clone());
        let subscriptions: Registry<u32> = Registry::new(keys);
        assert!(sessions.insert("shared", Arc::new("a".into())));
        // Same name in a sibling registry is rejected.
        assert!(!subscriptions.insert("shared", Arc::new(1)));
        assert!(subscriptions.insert("other", Arc::new(2)));
    }

    #[test]
    fn test_remove_releases_name() {
        let keys = RegistryKeyNamespace::new();
        let registry: Registry<u32> = Registry::new(keys);
        assert!(registry.insert("x", Arc::new(1)));
        registry.remove("x");
        assert!(registry.insert("x", Arc::new(2)));
    }
}
