//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::error::TransportError;

/// Observable state of the courtesy-seat notification flow.
///
/// Exactly one value is current at any time. `Success` and `Error` are terminal
/// until the UI resets; `Idle` is both the initial state and the "no verdict"
/// outcome of a dropped link or an inconclusive scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "message")]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Success,
    Error(String),
}

impl ConnectionState {
    /// True while a link to the notifier is being set up or used.
    pub fn is_link_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// True for `Success` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error(_))
    }

    /// Progress text for the transient states and the confirmation for `Success`.
    pub fn progress_message(&self) -> Option<&'static str> {
        match self {
            Self::Scanning => Some("Looking for your bus nearby..."),
            Self::Connecting => Some("Connecting to the bus..."),
            Self::Connected => Some("Connected, sending the notification..."),
            Self::Success => Some("Notification sent!"),
            Self::Idle | Self::Error(_) => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.progress_message()) {
            (Self::Error(message), _) => write!(f, "Error: {}", message),
            (_, Some(message)) => f.write_str(message),
            _ => f.write_str("Idle"),
        }
    }
}

/// A single advertisement seen during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advertisement {
    /// Platform-specific unique identifier, used to connect afterwards
    pub id: String,
    /// The advertised local name, if any
    pub name: Option<String>,
    /// The address of the device (may be unavailable on macOS)
    pub address: Option<String>,
    /// Service UUIDs listed in the advertisement
    pub services: Vec<Uuid>,
    /// The signal strength (RSSI) of the device
    pub rssi: Option<i16>,
}

impl Advertisement {
    pub fn new(id: impl Into<String>, name: Option<String>, services: Vec<Uuid>) -> Self {
        Self {
            id: id.into(),
            name,
            address: None,
            services,
            rssi: None,
        }
    }

    pub fn advertises(&self, service: Uuid) -> bool {
        self.services.contains(&service)
    }
}

/// What the scan stream yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Discovered(Advertisement),
    /// The scanning subsystem gave up; no further events follow.
    Failed(TransportError),
}

/// A service from the discovered GATT table and the characteristics under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// How strictly an advertisement must match before the scan accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPolicy {
    /// Service UUID and advertised name must both match. A scan that times out
    /// is a definitive "not found".
    #[default]
    ServiceAndName,
    /// The service UUID alone is enough. A scan that times out is inconclusive
    /// and ends in `Idle`.
    ServiceOnly,
}

/// The device a single send attempt is looking for. Built fresh per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetIdentity {
    pub service_uuid: Uuid,
    pub device_name: Option<String>,
}

impl TargetIdentity {
    /// Builds the identity of the notifier installed on `bus_number`.
    pub fn for_bus(service_uuid: Uuid, name_prefix: &str, bus_number: &str, policy: MatchPolicy) -> Self {
        let device_name = match policy {
            MatchPolicy::ServiceAndName => Some(format!("{}{}", name_prefix, bus_number.trim())),
            MatchPolicy::ServiceOnly => None,
        };
        Self { service_uuid, device_name }
    }

    pub fn requires_name(&self) -> bool {
        self.device_name.is_some()
    }

    /// Name shown to the user when the target cannot be found.
    pub fn display_name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| self.service_uuid.to_string())
    }

    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        if !advertisement.advertises(self.service_uuid) {
            return false;
        }
        match &self.device_name {
            Some(expected) => advertisement.name.as_deref() == Some(expected.as_str()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{DEVICE_NAME_PREFIX, UUID_NOTIFIER_SERVICE};

    fn advert(name: Option<&str>, services: Vec<Uuid>) -> Advertisement {
        Advertisement::new("dev-1", name.map(str::to_string), services)
    }

    #[test]
    fn state_text_shows_progress_or_error() {
        assert_eq!(ConnectionState::Idle.to_string(), "Idle");
        assert_eq!(ConnectionState::Scanning.to_string(), "Looking for your bus nearby...");
        assert_eq!(ConnectionState::Success.to_string(), "Notification sent!");
        assert_eq!(
            ConnectionState::Error("select a bus first".into()).to_string(),
            "Error: select a bus first"
        );
    }

    #[test]
    fn strict_target_needs_service_and_name() {
        let target = TargetIdentity::for_bus(
            UUID_NOTIFIER_SERVICE,
            DEVICE_NAME_PREFIX,
            "2221",
            MatchPolicy::ServiceAndName,
        );
        assert_eq!(target.device_name.as_deref(), Some("BF_DREAM_2221"));

        assert!(target.matches(&advert(Some("BF_DREAM_2221"), vec![UUID_NOTIFIER_SERVICE])));
        assert!(!target.matches(&advert(Some("BF_DREAM_1000"), vec![UUID_NOTIFIER_SERVICE])));
        assert!(!target.matches(&advert(None, vec![UUID_NOTIFIER_SERVICE])));
        assert!(!target.matches(&advert(Some("BF_DREAM_2221"), vec![Uuid::nil()])));
    }

    #[test]
    fn service_only_target_ignores_name() {
        let target = TargetIdentity::for_bus(
            UUID_NOTIFIER_SERVICE,
            DEVICE_NAME_PREFIX,
            "2221",
            MatchPolicy::ServiceOnly,
        );
        assert!(!target.requires_name());
        assert!(target.matches(&advert(None, vec![Uuid::nil(), UUID_NOTIFIER_SERVICE])));
        assert!(!target.matches(&advert(Some("BF_DREAM_2221"), vec![])));
    }

    #[test]
    fn state_classification() {
        assert!(ConnectionState::Connecting.is_link_active());
        assert!(ConnectionState::Connected.is_link_active());
        assert!(!ConnectionState::Scanning.is_link_active());
        assert!(ConnectionState::Error("x".into()).is_terminal());
        assert!(ConnectionState::Success.is_terminal());
        assert!(!ConnectionState::Idle.is_terminal());
        assert_eq!(ConnectionState::Idle.progress_message(), None);
        assert!(ConnectionState::Scanning.progress_message().is_some());
    }

    #[test]
    fn state_serializes_with_message() {
        let json = serde_json::to_value(ConnectionState::Error("bus gone".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "Error", "message": "bus gone" }));
    }
}
