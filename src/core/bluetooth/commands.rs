//! Courtesy-seat notifier commands
//! This module contains the payloads that can be written to the notifier

/// Notifier commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCommand {
    /// Announce the request with the notifier's chime ("DEFAULT")
    Default,
    /// Announce the request without sound ("SILENT")
    Silent,
}

impl NotificationCommand {
    /// Picks the command matching the user's sound preference
    pub fn for_sound(sound_on: bool) -> Self {
        if sound_on { Self::Default } else { Self::Silent }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Silent => "SILENT",
        }
    }

    /// Convert the command to its byte representation (UTF-8)
    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }
}
