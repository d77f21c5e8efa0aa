//! Bluetooth functionality for the courtesy-seat notifier
//! This module handles all bluetooth operations including scanning for the
//! bus notifier, connecting, and writing the notification command.

mod bluest_transport;
mod commands;
pub(crate) mod connection;
pub(crate) mod constants;
mod error;
mod manager;
mod scanner;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use bluest_transport::BluestTransport;
pub use commands::NotificationCommand;
pub use connection::PhaseTimeouts;
pub use constants::*; // Re-export all constants
pub use error::{BleError, TransportError};
pub use manager::BluetoothManager;
pub use transport::{BleTransport, ScanStream};
pub use types::{Advertisement, ConnectionState, GattService, MatchPolicy, ScanEvent, TargetIdentity};
