//! Comfortable Move courtesy-seat notifier library
//! This is the main library for the notifier: it finds the notifier on the
//! selected bus over Bluetooth Low Energy and asks it for a courtesy seat.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;

pub use crate::core::bluetooth::{BleError, BluetoothManager, ConnectionState};
pub use crate::state::AppState;
