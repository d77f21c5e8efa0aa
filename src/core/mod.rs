//! Core functionality for the courtesy-seat notifier
//! This module contains the Bluetooth flow and the permission checks guarding it.

pub mod bluetooth;
pub mod permissions;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, ConnectionState};
pub use permissions::{HostPermissions, PermissionGate, PermissionGrants};
