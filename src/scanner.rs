//! UDP-based device address resolution.
//! Listens for Tuya broadcast announcements and maps device IDs to IP addresses.

use crate::address::AddressCache;
use crate::error::Result;
use log::{debug, error, info, warn};
use serde_json::Value;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::time::{Duration, timeout};

/// Port devices broadcast their announcements on.
pub const DISCOVERY_PORT: u16 = 6666;

/// Largest announcement datagram that is read.
const MAX_DATAGRAM_LEN: usize = 512;
/// Bytes of framing in front of the JSON body.
const HEADER_LEN: usize = 20;
/// Bytes of framing (CRC + suffix) after the JSON body.
const TRAILER_LEN: usize = 8;

const DEFAULT_MAX_ATTEMPTS: usize = 10;
const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(5);

const KEY_GW_ID: &str = "gwId";
const KEY_IP: &str = "ip";
const KEY_VERSION: &str = "version";
const KEY_PRODUCT_KEY: &str = "productKey";

/// A device announcement decoded from a broadcast datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Device ID (`gwId`)
    pub id: String,
    /// Device IP address
    pub ip: String,
    /// Protocol version, when announced
    pub version: Option<String>,
    /// Product Key, when announced
    pub product_key: Option<String>,
}

/// Scanner resolves device addresses from unsolicited UDP broadcasts.
///
/// Every announcement it hears is recorded in its [`AddressCache`], not only
/// the one it was asked about, so later lookups for other devices can be
/// answered without touching the network.
pub struct Scanner {
    cache: AddressCache,
    /// Local address to bind to
    pub bind_addr: String,
    /// UDP port to listen on (default: 6666)
    pub port: u16,
    /// Number of datagrams (or receive timeouts) before giving up
    pub max_attempts: usize,
    /// Maximum wait for a single datagram
    pub recv_timeout: Duration,
}

impl Scanner {
    /// Create a new Scanner recording into the given cache.
    pub fn new(cache: AddressCache) -> Self {
        Self {
            cache,
            bind_addr: "0.0.0.0".to_string(),
            port: DISCOVERY_PORT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }

    pub fn with_bind_addr<S: Into<String>>(mut self, bind_addr: S) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_recv_timeout(mut self, recv_timeout: Duration) -> Self {
        self.recv_timeout = recv_timeout;
        self
    }

    /// The address cache this scanner records into.
    pub fn cache(&self) -> &AddressCache {
        &self.cache
    }

    /// Evicts a device from the address cache.
    pub fn invalidate(&self, device_id: &str) -> bool {
        self.cache.remove(device_id).is_some()
    }

    /// Resolves the IP address of a device.
    ///
    /// Unless `refresh` is set, a cached address is returned without any
    /// network I/O. Otherwise up to `max_attempts` datagrams are read from the
    /// broadcast port. `Ok(None)` means the device never announced itself.
    pub async fn resolve(&self, device_id: &str, refresh: bool) -> Result<Option<String>> {
        if !refresh && let Some(ip) = self.cache.get(device_id) {
            debug!("Found device {} in address cache: {}", device_id, ip);
            return Ok(Some(ip));
        }

        info!(
            "Listening for device {} on {}:{} (refresh: {})...",
            device_id, self.bind_addr, self.port, refresh
        );
        let socket = self.create_socket()?;
        let found = self.listen(&socket, Some(device_id), |_| {}).await?;
        Ok(found.map(|ann| ann.ip))
    }

    /// Listens for the whole attempt bound and returns every device heard.
    pub async fn scan(&self) -> Result<Vec<Announcement>> {
        info!(
            "Starting Tuya announcement scan on {}:{}...",
            self.bind_addr, self.port
        );
        let socket = self.create_socket()?;
        let mut seen: Vec<Announcement> = Vec::new();
        self.listen(&socket, None, |ann| {
            match seen.iter_mut().find(|s| s.id == ann.id) {
                Some(existing) => *existing = ann.clone(),
                None => seen.push(ann.clone()),
            }
        })
        .await?;
        info!("Scan finished. Found {} devices.", seen.len());
        Ok(seen)
    }

    /// Create and configure the broadcast listening socket.
    fn create_socket(&self) -> Result<UdpSocket> {
        let addr: SocketAddr = format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        debug!("Creating UDP socket for port {}...", self.port);
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

        if let Err(e) = socket.set_reuse_address(true) {
            warn!("Failed to set reuse_address on port {}: {}", self.port, e);
        }

        if let Err(e) = socket.set_broadcast(true) {
            warn!("Failed to set broadcast on port {}: {}", self.port, e);
        }

        match socket.bind(&SockAddr::from(addr)) {
            Ok(_) => debug!("Successfully bound to {}", addr),
            Err(e) => {
                error!("Failed to bind to {}: {}", addr, e);
                return Err(e.into());
            }
        }

        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        Ok(UdpSocket::from_std(std_socket)?)
    }

    /// Reads up to `max_attempts` datagrams, caching every announcement and
    /// stopping early once `target_id` is heard.
    async fn listen<F>(
        &self,
        socket: &UdpSocket,
        target_id: Option<&str>,
        mut on_announcement: F,
    ) -> Result<Option<Announcement>>
    where
        F: FnMut(&Announcement),
    {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];

        for attempt in 1..=self.max_attempts {
            let len = match timeout(self.recv_timeout, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, addr))) => {
                    debug!(
                        "Received UDP packet from {}: {} bytes (attempt {}/{})",
                        addr, len, attempt, self.max_attempts
                    );
                    len
                }
                Ok(Err(e)) => {
                    debug!("Receive failed (attempt {}/{}): {}", attempt, self.max_attempts, e);
                    continue;
                }
                Err(_) => {
                    debug!(
                        "No announcement within {:?} (attempt {}/{})",
                        self.recv_timeout, attempt, self.max_attempts
                    );
                    continue;
                }
            };

            let Some(ann) = parse_announcement(&buf[..len]) else {
                debug!("Ignoring undecodable datagram of {} bytes", len);
                continue;
            };

            self.cache.insert(&ann.id, &ann.ip);
            on_announcement(&ann);

            if target_id == Some(ann.id.as_str()) {
                info!("Found target device: ID={}, IP={}", ann.id, ann.ip);
                return Ok(Some(ann));
            }
        }

        if let Some(tid) = target_id {
            warn!(
                "Device ID {} not announced within {} attempts",
                tid, self.max_attempts
            );
        }
        Ok(None)
    }
}

/// Decodes a broadcast datagram into an [`Announcement`].
///
/// The framed layout is a 20-byte header, a JSON body and an 8-byte trailer.
/// Datagrams that are plain JSON are accepted as well.
pub fn parse_announcement(data: &[u8]) -> Option<Announcement> {
    if data.len() > HEADER_LEN + TRAILER_LEN
        && let Ok(val) = serde_json::from_slice::<Value>(&data[HEADER_LEN..data.len() - TRAILER_LEN])
    {
        return parse_json(&val);
    }

    serde_json::from_slice::<Value>(data)
        .ok()
        .and_then(|val| parse_json(&val))
}

/// Extract announcement fields from JSON.
fn parse_json(val: &Value) -> Option<Announcement> {
    let id = val.get(KEY_GW_ID).and_then(|v| v.as_str())?;
    let ip = val.get(KEY_IP).and_then(|v| v.as_str())?;

    Some(Announcement {
        id: id.to_string(),
        ip: ip.to_string(),
        version: val
            .get(KEY_VERSION)
            .and_then(|v| v.as_str())
            .map(str::to_string),
        product_key: val
            .get(KEY_PRODUCT_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}
