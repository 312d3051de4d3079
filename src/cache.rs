//! Shared, rate-limited view of one device's status.
//! Serializes status queries, caches the last payload for a freshness window
//! and re-discovers the device address when it stops answering.

use crate::error::{Result, SwitchError};
use crate::handle::{ADDR_UNRESOLVED, DeviceHandle, is_resolved};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::scanner::Scanner;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Default maximum age of a cached status.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(20);

struct CachedStatus {
    payload: Value,
    captured_at: Instant,
    /// Invalidation epoch the payload was fetched under.
    epoch: u64,
}

/// Wraps a [`DeviceHandle`] shared by every channel of one physical device.
pub struct StatusCache<H> {
    handle: H,
    scanner: Arc<Scanner>,
    freshness: Duration,
    retry: RetryPolicy,
    cached: Mutex<Option<CachedStatus>>,
    // Bumped by every write; payloads from an older epoch are stale.
    epoch: AtomicU64,
}

impl<H: DeviceHandle> StatusCache<H> {
    pub fn new(handle: H, scanner: Arc<Scanner>) -> Self {
        Self {
            handle,
            scanner,
            freshness: DEFAULT_FRESHNESS,
            retry: RetryPolicy::default(),
            cached: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn device_id(&self) -> &str {
        self.handle.id()
    }

    /// Checks if the handle currently points at a concrete address.
    pub fn has_address(&self) -> bool {
        is_resolved(&self.handle.address())
    }

    /// Points an unresolved handle at the address cache entry for the device,
    /// if one exists. Never touches the network.
    pub fn adopt_cached_address(&self) -> bool {
        if self.has_address() {
            return true;
        }
        match self.scanner.cache().get(self.handle.id()) {
            Some(ip) => {
                debug!("device_id=({}), host=({}) from address cache", self.handle.id(), ip);
                self.handle.set_address(&ip);
                true
            }
            None => false,
        }
    }

    /// Makes sure the handle has an address, resolving it if missing or if
    /// `refresh` is set. A device that is not heard on the network leaves the
    /// handle unresolved and yields [`SwitchError::NotFound`].
    pub async fn ensure_address(&self, refresh: bool) -> Result<()> {
        if !refresh && self.has_address() {
            return Ok(());
        }

        let id = self.handle.id();
        match self.scanner.resolve(id, refresh).await? {
            Some(ip) => {
                self.handle.set_address(&ip);
                debug!("device_id=({}), host=({})", id, ip);
                Ok(())
            }
            None => {
                self.handle.set_address(ADDR_UNRESOLVED);
                debug!("device_id=({}), host unresolved", id);
                Err(SwitchError::NotFound(id.to_string()))
            }
        }
    }

    /// Forces the next [`status`](Self::status) call to query the device.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Switches a channel and drops the cached status.
    ///
    /// The cache is dropped before the write is attempted, so even a failed
    /// write makes the next read go to the device.
    pub async fn set_status(&self, on: bool, channel: &str) -> Result<Value> {
        self.invalidate();
        self.ensure_address(false).await?;
        debug!(
            "Setting channel {} of {} to {}",
            channel,
            self.handle.id(),
            on
        );
        self.handle.set_status(on, channel).await
    }

    /// Returns the device status, from cache while it is fresh.
    ///
    /// Only one query runs at a time; callers arriving meanwhile wait for it
    /// and then reuse its result.
    pub async fn status(&self) -> Result<Value> {
        let mut cached = self.cached.lock().await;
        let epoch = self.epoch.load(Ordering::SeqCst);

        if let Some(entry) = cached.as_ref()
            && entry.epoch == epoch
            && entry.captured_at.elapsed() <= self.freshness
            && !is_empty_payload(&entry.payload)
        {
            debug!("Serving cached status for {}", self.handle.id());
            return Ok(entry.payload.clone());
        }

        let payload = self.fetch_status().await?;
        *cached = Some(CachedStatus {
            payload: payload.clone(),
            captured_at: Instant::now(),
            epoch,
        });
        Ok(payload)
    }

    async fn fetch_status(&self) -> Result<Value> {
        let id = self.handle.id();
        let outcome = self
            .retry
            .run(|attempt| async move {
                self.ensure_address(false).await?;
                debug!("Querying status of {} (attempt {})", id, attempt);
                self.handle.status().await
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                if attempts > 1 {
                    debug!("Status of {} received after {} attempts", id, attempts);
                }
                Ok(value)
            }
            RetryOutcome::Failed(e) => Err(e),
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                warn!(
                    "Failed to update status of {} after {} attempts: {}",
                    id, attempts, last_error
                );
                self.handle.set_address(ADDR_UNRESOLVED);
                self.scanner.invalidate(id);
                Err(SwitchError::ConnectionFailed(id.to_string()))
            }
        }
    }
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
