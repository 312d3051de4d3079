//! In-memory map of device IDs to their last announced IP address.

use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared, clonable address book filled by broadcast announcements.
///
/// Clones share the same underlying map, so one cache can be handed to every
/// scanner and status cache in the process, or a fresh one per test.
#[derive(Clone, Default)]
pub struct AddressCache {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str) -> Option<String> {
        self.inner.read().get(device_id).cloned()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.inner.read().contains_key(device_id)
    }

    /// Records an address. Returns `true` if the entry was new or changed.
    pub fn insert(&self, device_id: &str, ip: &str) -> bool {
        let mut guard = self.inner.write();
        match guard.get(device_id) {
            Some(current) if current == ip => false,
            previous => {
                debug!(
                    "Address for {} learned: {} (was {:?})",
                    device_id, ip, previous
                );
                guard.insert(device_id.to_string(), ip.to_string());
                true
            }
        }
    }

    pub fn remove(&self, device_id: &str) -> Option<String> {
        self.inner.write().remove(device_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of every known `(device_id, ip)` pair.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().clone()
    }
}
