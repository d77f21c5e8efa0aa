//! The radio capability the notification flow is written against.
//! A real adapter implements it in `bluest_transport`; tests substitute mocks.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use uuid::Uuid;

use crate::core::bluetooth::error::TransportError;
use crate::core::bluetooth::types::{GattService, ScanEvent};

#[cfg(test)]
use mockall::automock;

/// Stream of scan results. Dropping it stops the scan.
pub type ScanStream = BoxStream<'static, ScanEvent>;

/// Scan, connect, discover, write and release primitives of a BLE central.
///
/// Devices are addressed by the `id` carried in the advertisements a scan
/// produced.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    /// Whether an adapter is present and powered on.
    async fn adapter_enabled(&self) -> bool;

    /// Starts an unfiltered scan.
    async fn start_scan(&self) -> Result<ScanStream, TransportError>;

    /// Establishes the link to `id`.
    async fn connect(&self, id: &str) -> Result<(), TransportError>;

    /// Reads the GATT table of a connected device.
    async fn discover_services(&self, id: &str) -> Result<Vec<GattService>, TransportError>;

    /// Acknowledged write of `payload` to `characteristic` under `service`.
    async fn write_characteristic(
        &self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Drops the link to `id`.
    async fn disconnect(&self, id: &str) -> Result<(), TransportError>;

    /// Releases everything held for `id`. Called after `disconnect`.
    async fn close(&self, id: &str);
}
