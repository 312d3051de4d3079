//! Per-channel switch entity on top of a shared [`StatusCache`].

use crate::cache::StatusCache;
use crate::error::Result;
use crate::handle::DeviceHandle;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const KEY_DPS: &str = "dps";

/// One relay/outlet of a device.
///
/// State is only refreshed by [`update`](Self::update), which the host is
/// expected to call periodically; `turn_on`/`turn_off` do not touch it.
pub struct SwitchController<H> {
    cache: Arc<StatusCache<H>>,
    name: String,
    channel: String,
    state: AtomicBool,
}

impl<H: DeviceHandle> SwitchController<H> {
    pub fn new<N, C>(cache: Arc<StatusCache<H>>, name: N, channel: C) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        Self {
            cache,
            name: name.into(),
            channel: channel.into(),
            state: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn cache(&self) -> &Arc<StatusCache<H>> {
        &self.cache
    }

    /// Last known state, without any I/O.
    pub fn is_on(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    pub async fn turn_on(&self) -> Result<Value> {
        self.cache.set_status(true, &self.channel).await
    }

    pub async fn turn_off(&self) -> Result<Value> {
        self.cache.set_status(false, &self.channel).await
    }

    /// Refreshes the channel state from the device.
    ///
    /// Never fails: a device that cannot be read is logged and queued for
    /// rediscovery, and the previous state is kept.
    pub async fn update(&self) {
        if !self.cache.adopt_cached_address() {
            debug!(
                "Skipping update of {}: device {} has no address",
                self.name,
                self.cache.device_id()
            );
            return;
        }

        match self.cache.status().await {
            Ok(status) => self.apply(&status),
            Err(e) => {
                warn!(
                    "Failed to get status for {} (device {}): {}",
                    self.name,
                    self.cache.device_id(),
                    e
                );
                if let Err(e) = self.cache.ensure_address(true).await {
                    debug!(
                        "Rediscovery of {} failed: {}",
                        self.cache.device_id(),
                        e
                    );
                }
            }
        }
    }

    fn apply(&self, status: &Value) {
        let Some(dps) = status.get(KEY_DPS) else {
            debug!("Status of {} carries no dps: {}", self.name, status);
            return;
        };
        match dps.get(&self.channel) {
            Some(Value::Bool(on)) => self.state.store(*on, Ordering::SeqCst),
            Some(other) => debug!(
                "Channel {} of {} reported non-boolean value {}",
                self.channel, self.name, other
            ),
            None => debug!("Channel {} missing from status of {}", self.channel, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressCache;
    use crate::cache::tests::silent_scanner;
    use crate::handle::ADDR_UNRESOLVED;
    use crate::handle::mock::MockHandle;
    use serde_json::json;

    fn shared_cache(address: &str) -> Arc<StatusCache<MockHandle>> {
        Arc::new(StatusCache::new(
            MockHandle::new("dev1", address),
            silent_scanner(AddressCache::new()),
        ))
    }

    #[tokio::test]
    async fn update_reads_channel_state() {
        let cache = shared_cache("10.0.0.5");
        let first = SwitchController::new(cache.clone(), "Lamp", "1");
        let second = SwitchController::new(cache.clone(), "Fan", "2");

        first.update().await;
        second.update().await;

        assert!(first.is_on());
        assert!(!second.is_on());
        // Both channels were served by a single device query.
        assert_eq!(cache.handle().status_calls(), 1);
    }

    #[tokio::test]
    async fn turning_on_defers_state_to_next_update() {
        let cache = shared_cache("10.0.0.5");
        let fan = SwitchController::new(cache.clone(), "Fan", "2");
        fan.update().await;
        assert!(!fan.is_on());

        fan.turn_on().await.unwrap();
        assert!(!fan.is_on());
        assert_eq!(
            cache.handle().set_calls.lock().as_slice(),
            &[(true, "2".to_string())]
        );

        fan.update().await;
        assert!(fan.is_on());
        assert_eq!(cache.handle().status_calls(), 2);

        fan.turn_off().await.unwrap();
        fan.update().await;
        assert!(!fan.is_on());
    }

    #[tokio::test]
    async fn unresolved_device_is_not_polled() {
        let cache = shared_cache(ADDR_UNRESOLVED);
        let lamp = SwitchController::new(cache.clone(), "Lamp", "1");
        lamp.update().await;
        assert!(!lamp.is_on());
        assert_eq!(cache.handle().status_calls(), 0);
    }

    #[tokio::test]
    async fn failed_update_keeps_state_and_requests_rediscovery() {
        let cache = shared_cache("10.0.0.5");
        let lamp = SwitchController::new(cache.clone(), "Lamp", "1");
        lamp.update().await;
        assert!(lamp.is_on());

        // Let the cached payload go stale before the device drops off.
        cache.invalidate();
        cache.handle().fail_next(3);
        lamp.update().await;

        assert!(lamp.is_on());
        assert!(!cache.has_address());
        assert_eq!(cache.handle().status_calls(), 4);
    }

    #[tokio::test]
    async fn update_recovers_address_learned_elsewhere() {
        let addresses = AddressCache::new();
        let cache = Arc::new(StatusCache::new(
            MockHandle::new("dev1", "10.0.0.5"),
            silent_scanner(addresses.clone()),
        ));
        let lamp = SwitchController::new(cache.clone(), "Lamp", "1");

        // Device drops off and rediscovery finds nothing.
        cache.handle().fail_next(3);
        lamp.update().await;
        assert!(!cache.has_address());
        lamp.update().await;
        assert_eq!(cache.handle().status_calls(), 3);

        // Another scan hears the device again at a new address.
        addresses.insert("dev1", "10.0.0.8");
        lamp.update().await;

        assert_eq!(cache.handle().address(), "10.0.0.8");
        assert_eq!(cache.handle().status_calls(), 4);
        assert!(lamp.is_on());
    }

    #[tokio::test]
    async fn non_boolean_values_are_ignored() {
        let cache = shared_cache("10.0.0.5");
        *cache.handle().dps.lock() = json!({"1": "on"});
        let lamp = SwitchController::new(cache.clone(), "Lamp", "1");
        let other = SwitchController::new(cache, "Other", "7");
        lamp.update().await;
        other.update().await;
        assert!(!lamp.is_on());
        assert!(!other.is_on());
    }
}
