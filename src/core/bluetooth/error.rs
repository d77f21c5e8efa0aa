//! Error types for the Bluetooth module.
//!
//! `TransportError` is what the radio layer reports. `BleError` is the failure
//! taxonomy of a send attempt; its `Display` text is what the UI shows.

use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a [`BleTransport`](super::transport::BleTransport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer or the local stack dropped the link.
    #[error("link disconnected")]
    Disconnected,

    /// The platform returned a numeric status code.
    #[error("code: {code}")]
    Status { code: i32 },

    /// The platform failed without a numeric code.
    #[error("{0}")]
    Platform(String),

    /// No usable adapter is present.
    #[error("bluetooth adapter unavailable")]
    AdapterUnavailable,
}

impl TransportError {
    /// True when the failure means the link went away rather than an operation failing.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Every way a courtesy-seat notification attempt can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    #[error("select a bus first")]
    NoBusSelected,

    #[error("missing permission: bluetooth or location")]
    PermissionDenied,

    #[error("missing permission: bluetooth connect")]
    ConnectPermissionDenied,

    #[error("bluetooth adapter is disabled")]
    AdapterDisabled,

    #[error("scan failed ({0})")]
    ScanFailed(TransportError),

    #[error("bus {0} not found nearby")]
    DeviceNotFound(String),

    #[error("connection failed ({0})")]
    LinkFailure(TransportError),

    #[error("connection timed out")]
    LinkTimeout,

    #[error("service discovery failed ({0})")]
    ServiceDiscoveryFailed(TransportError),

    #[error("service discovery timed out")]
    DiscoveryTimeout,

    #[error("service {0} not found on device")]
    ServiceMissing(Uuid),

    #[error("characteristic {0} not found on device")]
    CharacteristicMissing(Uuid),

    #[error("write failed ({0})")]
    WriteRejected(TransportError),

    #[error("write timed out")]
    WriteTimeout,
}
