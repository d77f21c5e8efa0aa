//! Permission gate for Bluetooth operations.
//!
//! Nothing is scanned or connected unless the host has granted location access
//! (fine or coarse) and, where the platform asks for them at runtime, the
//! Bluetooth scan and connect permissions.

use serde::Serialize;

/// Snapshot of what the host has granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PermissionGrants {
    pub fine_location: bool,
    pub coarse_location: bool,
    pub bluetooth_scan: bool,
    pub bluetooth_connect: bool,
    /// Whether the platform grants scan/connect at runtime. When it does not,
    /// both count as granted.
    pub runtime_bluetooth_grants: bool,
}

impl PermissionGrants {
    /// Everything granted, no runtime Bluetooth grants needed.
    pub fn all() -> Self {
        Self {
            fine_location: true,
            coarse_location: true,
            bluetooth_scan: true,
            bluetooth_connect: true,
            runtime_bluetooth_grants: false,
        }
    }

    pub fn can_scan(&self) -> bool {
        !self.runtime_bluetooth_grants || self.bluetooth_scan
    }

    pub fn can_connect(&self) -> bool {
        !self.runtime_bluetooth_grants || self.bluetooth_connect
    }

    pub fn has_required_permissions(&self) -> bool {
        (self.fine_location || self.coarse_location) && self.can_scan() && self.can_connect()
    }
}

/// Source of the current grants. Read on every check, never cached.
pub trait PermissionGate: Send + Sync + 'static {
    fn grants(&self) -> PermissionGrants;

    fn has_required_permissions(&self) -> bool {
        self.grants().has_required_permissions()
    }

    fn can_connect(&self) -> bool {
        self.grants().can_connect()
    }
}

/// Desktop hosts authorize Bluetooth at the adapter level (BlueZ policy,
/// CoreBluetooth prompt), so the process itself always holds every grant.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPermissions;

impl PermissionGate for HostPermissions {
    fn grants(&self) -> PermissionGrants {
        PermissionGrants::all()
    }
}
