//! Constants used throughout the application
//! This module contains the protocol constants of the courtesy-seat notifier,
//! such as UUIDs, timeouts, and the advertised name convention.

use uuid::Uuid;

/// The UUID of the courtesy-seat notifier service
pub const UUID_NOTIFIER_SERVICE: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_123456789abc);

/// The UUID of the notifier write (RX) characteristic
pub const UUID_NOTIFIER_WRITE_CHAR: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_123456789abd);

/// Prefix of the advertised name; the bus route number follows it
pub const DEVICE_NAME_PREFIX: &str = "BF_DREAM_";

/// Scan duration in milliseconds
pub const DEFAULT_SCAN_DURATION_MS: u64 = 5000;

/// Timeout for establishing the link in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Timeout for service and characteristic discovery in seconds
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 10;

/// Timeout for the acknowledged characteristic write in seconds
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 5;

/// Timeout for the disconnect request during teardown in seconds
pub const DEFAULT_DISCONNECT_TIMEOUT_SECS: u64 = 5;

/// Capacity of the channel carrying scan results out of the adapter task
pub const SCAN_EVENT_CHANNEL_CAPACITY: usize = 32;
