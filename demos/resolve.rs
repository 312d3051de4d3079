/**
 * Address Resolution Example
 *
 * Listens for Tuya broadcast announcements on the local network.
 * With a device ID argument, resolves that device's IP address;
 * without one, lists every device heard.
 *
 * Run with RUST_LOG=debug to follow each received datagram.
 */
use tuya_switch::{AddressCache, Scanner};

#[tokio::main]
async fn main() {
    env_logger::init();
    println!("--- tuya-switch - Address Resolution ---");

    let scanner = Scanner::new(AddressCache::new()).with_max_attempts(20);

    match std::env::args().nth(1) {
        Some(device_id) => {
            println!("[INFO] Waiting for an announcement from {device_id}...");
            match scanner.resolve(&device_id, false).await {
                Ok(Some(ip)) => println!("[SUCCESS] {device_id} is at {ip}"),
                Ok(None) => println!("[INFO] {device_id} did not announce itself"),
                Err(e) => eprintln!("[ERROR] Resolution failed: {e} (code {})", e.code()),
            }
        }
        None => {
            println!("[INFO] Scanning the network for Tuya devices...");
            match scanner.scan().await {
                Ok(devices) => {
                    for (i, device) in devices.iter().enumerate() {
                        println!(
                            "[{}] Found Device: ID={}, IP={}, Version={:?}",
                            i + 1,
                            device.id,
                            device.ip,
                            device.version
                        );
                    }
                    println!("[INFO] Scan finished. Total devices found: {}", devices.len());
                }
                Err(e) => eprintln!("[ERROR] Scan failed: {e}"),
            }
        }
    }

    let known = scanner.cache().snapshot();
    println!("[INFO] Address cache holds {} entries", known.len());
}
