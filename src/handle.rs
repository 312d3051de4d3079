//! The low-level device client the status cache drives.
//!
//! Framing, encryption and the TCP session to the device are not handled in
//! this crate; any client able to query and set data points can be plugged in
//! by implementing [`DeviceHandle`].

use crate::error::Result;
use serde_json::Value;
use std::future::Future;

/// Address value meaning "not resolved yet".
pub const ADDR_UNRESOLVED: &str = "0.0.0.0";

/// Returns `true` if `address` names a concrete host.
pub fn is_resolved(address: &str) -> bool {
    !address.is_empty() && address != ADDR_UNRESOLVED
}

/// An already-configured protocol client for one physical device.
///
/// The address is mutable through a shared reference: implementors keep it
/// behind interior mutability, so the status cache can re-point the client
/// after rediscovery while other callers hold it.
pub trait DeviceHandle: Send + Sync {
    /// Device ID, used both on the wire and to match broadcast announcements.
    fn id(&self) -> &str;

    /// Current target address, [`ADDR_UNRESOLVED`] when unknown.
    fn address(&self) -> String;

    fn set_address(&self, address: &str);

    /// Queries the device. The payload carries a `dps` object keyed by channel id.
    fn status(&self) -> impl Future<Output = Result<Value>> + Send;

    /// Switches one channel on or off, returning the device acknowledgement.
    fn set_status(&self, on: bool, channel: &str) -> impl Future<Output = Result<Value>> + Send;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::error::SwitchError;
    use parking_lot::{Mutex, RwLock};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::Duration;

    /// Scriptable in-memory device.
    pub(crate) struct MockHandle {
        id: String,
        address: RwLock<String>,
        pub dps: Mutex<Value>,
        pub status_calls: AtomicUsize,
        pub set_calls: Mutex<Vec<(bool, String)>>,
        /// Number of upcoming status queries that fail.
        pub failures: AtomicUsize,
        pub failure: Mutex<SwitchError>,
        pub set_fails: AtomicBool,
        pub delay: Mutex<Duration>,
    }

    impl MockHandle {
        pub(crate) fn new(id: &str, address: &str) -> Self {
            Self {
                id: id.to_string(),
                address: RwLock::new(address.to_string()),
                dps: Mutex::new(json!({"1": true, "2": false})),
                status_calls: AtomicUsize::new(0),
                set_calls: Mutex::new(Vec::new()),
                failures: AtomicUsize::new(0),
                failure: Mutex::new(SwitchError::Timeout),
                set_fails: AtomicBool::new(false),
                delay: Mutex::new(Duration::ZERO),
            }
        }

        pub(crate) fn fail_next(&self, count: usize) {
            self.failures.store(count, Ordering::SeqCst);
        }

        pub(crate) fn status_calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    impl DeviceHandle for MockHandle {
        fn id(&self) -> &str {
            &self.id
        }

        fn address(&self) -> String {
            self.address.read().clone()
        }

        fn set_address(&self, address: &str) {
            *self.address.write() = address.to_string();
        }

        async fn status(&self) -> Result<Value> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(self.failure.lock().clone());
            }
            Ok(json!({ "devId": self.id, "dps": self.dps.lock().clone() }))
        }

        async fn set_status(&self, on: bool, channel: &str) -> Result<Value> {
            self.set_calls.lock().push((on, channel.to_string()));
            if self.set_fails.load(Ordering::SeqCst) {
                return Err(SwitchError::Offline);
            }
            self.dps.lock()[channel] = Value::Bool(on);
            Ok(json!({ "devId": self.id, "dps": { channel: on } }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_unresolved() {
        assert!(!is_resolved(ADDR_UNRESOLVED));
        assert!(!is_resolved(""));
        assert!(is_resolved("192.168.1.40"));
    }
}
