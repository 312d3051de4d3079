//! # tuya-switch
//!
//! Local-network control of Tuya smart switches: resolves device addresses
//! from UDP broadcast announcements, caches device status shared by every
//! channel of a device, and recovers from unreachable devices by
//! rediscovering them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tuya_switch::{AddressCache, Scanner};
//!
//! # async fn run() -> tuya_switch::Result<()> {
//! let scanner = Arc::new(Scanner::new(AddressCache::new()));
//! let ip = scanner.resolve("DEVICE_ID", false).await?;
//! println!("{:?}", ip);
//! # Ok(())
//! # }
//! ```
//!
#[macro_use]
mod macros;
pub mod address;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod handle;
pub mod retry;
pub mod scanner;

pub use address::AddressCache;
pub use cache::StatusCache;
pub use config::{PlatformConfig, SwitchConfig, setup};
pub use controller::SwitchController;
pub use error::{Result, SwitchError};
pub use handle::{ADDR_UNRESOLVED, DeviceHandle};
pub use retry::{RetryOutcome, RetryPolicy};
pub use scanner::{Announcement, Scanner};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
