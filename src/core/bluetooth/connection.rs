//! Bluetooth connection handling for the courtesy-seat notifier
//! This module handles connecting, locating the write characteristic,
//! writing the command, and tearing the link down again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

use crate::core::bluetooth::commands::NotificationCommand;
use crate::core::bluetooth::error::BleError;
use crate::core::bluetooth::transport::BleTransport;

/// Result of a phase that talks to a connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResult<T> {
    Done(T),
    Failed(BleError),
    /// The link dropped before the phase could reach a verdict.
    Dropped,
}

/// Per-phase time bounds
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimeouts {
    pub connect: Duration,
    pub discovery: Duration,
    pub write: Duration,
    /// Bounds the disconnect request during teardown.
    pub disconnect: Duration,
}

/// The connection a single send attempt holds.
///
/// `teardown` disconnects and releases the device at most once, however many
/// exit paths reach it.
pub struct LinkGuard<T: BleTransport> {
    transport: Arc<T>,
    disconnect_timeout: Duration,
    device_id: Mutex<Option<String>>,
    torn_down: AtomicBool,
}

impl<T: BleTransport> LinkGuard<T> {
    pub fn new(transport: Arc<T>, disconnect_timeout: Duration) -> Self {
        Self {
            transport,
            disconnect_timeout,
            device_id: Mutex::new(None),
            torn_down: AtomicBool::new(false),
        }
    }

    async fn attach(&self, id: &str) {
        *self.device_id.lock().await = Some(id.to_string());
    }

    #[cfg(test)]
    async fn is_attached(&self) -> bool {
        self.device_id.lock().await.is_some()
    }

    /// Disconnects and closes the device, if one was ever attached.
    pub async fn teardown(&self) {
        let Some(id) = self.device_id.lock().await.clone() else {
            return;
        };
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Tearing down link to {}", id);
        match timeout(self.disconnect_timeout, self.transport.disconnect(&id)).await {
            Ok(Ok(())) => {}
            // The link may already be gone; the device is still closed below.
            Ok(Err(e)) => warn!("Disconnect from {} failed: {}", id, e),
            Err(_) => warn!("Disconnect from {} timed out after {:?}", id, self.disconnect_timeout),
        }
        self.transport.close(&id).await;
    }
}

/// Connection/write controller
pub struct ConnectionManager<T: BleTransport> {
    transport: Arc<T>,
    timeouts: PhaseTimeouts,
    service_uuid: Uuid,
    write_char_uuid: Uuid,
}

impl<T: BleTransport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>, timeouts: PhaseTimeouts, service_uuid: Uuid, write_char_uuid: Uuid) -> Self {
        Self {
            transport,
            timeouts,
            service_uuid,
            write_char_uuid,
        }
    }

    /// Establishes the link. The guard is attached first so a connect that
    /// half-succeeds before failing still gets torn down.
    pub async fn connect(&self, link: &LinkGuard<T>, device_id: &str) -> LinkResult<()> {
        link.attach(device_id).await;
        info!("Initiating connection to {}...", device_id);

        match timeout(self.timeouts.connect, self.transport.connect(device_id)).await {
            Ok(Ok(())) => {
                info!("Connection successful");
                LinkResult::Done(())
            }
            Ok(Err(e)) if e.is_disconnect() => LinkResult::Dropped,
            Ok(Err(e)) => LinkResult::Failed(BleError::LinkFailure(e)),
            Err(_) => LinkResult::Failed(BleError::LinkTimeout),
        }
    }

    /// Checks that the notifier service and its write characteristic exist.
    pub async fn discover_write_target(&self, device_id: &str) -> LinkResult<()> {
        info!("Discovering services...");
        let services = match timeout(self.timeouts.discovery, self.transport.discover_services(device_id)).await {
            Ok(Ok(services)) => services,
            Ok(Err(e)) if e.is_disconnect() => return LinkResult::Dropped,
            Ok(Err(e)) => return LinkResult::Failed(BleError::ServiceDiscoveryFailed(e)),
            Err(_) => return LinkResult::Failed(BleError::DiscoveryTimeout),
        };

        let Some(service) = services.iter().find(|s| s.uuid == self.service_uuid) else {
            for service in &services {
                info!("Available service: {}", service.uuid);
            }
            return LinkResult::Failed(BleError::ServiceMissing(self.service_uuid));
        };
        info!("Found notifier service: {}", service.uuid);

        if !service.characteristics.contains(&self.write_char_uuid) {
            return LinkResult::Failed(BleError::CharacteristicMissing(self.write_char_uuid));
        }
        info!("Found write characteristic: {}", self.write_char_uuid);
        LinkResult::Done(())
    }

    /// Writes `command` and waits for the acknowledgement.
    pub async fn write_command(&self, device_id: &str, command: NotificationCommand) -> LinkResult<()> {
        info!("Sending command to notifier: {}", command.as_str());
        let data = command.to_bytes();
        let write = self
            .transport
            .write_characteristic(device_id, self.service_uuid, self.write_char_uuid, &data);

        match timeout(self.timeouts.write, write).await {
            Ok(Ok(())) => LinkResult::Done(()),
            Ok(Err(e)) if e.is_disconnect() => LinkResult::Dropped,
            Ok(Err(e)) => LinkResult::Failed(BleError::WriteRejected(e)),
            Err(_) => LinkResult::Failed(BleError::WriteTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{UUID_NOTIFIER_SERVICE, UUID_NOTIFIER_WRITE_CHAR};
    use crate::core::bluetooth::error::TransportError;
    use crate::core::bluetooth::transport::MockBleTransport;
    use crate::core::bluetooth::types::GattService;

    fn timeouts() -> PhaseTimeouts {
        PhaseTimeouts {
            connect: Duration::from_secs(10),
            discovery: Duration::from_secs(10),
            write: Duration::from_secs(5),
            disconnect: Duration::from_secs(5),
        }
    }

    fn manager(transport: MockBleTransport) -> ConnectionManager<MockBleTransport> {
        ConnectionManager::new(Arc::new(transport), timeouts(), UUID_NOTIFIER_SERVICE, UUID_NOTIFIER_WRITE_CHAR)
    }

    #[tokio::test]
    async fn teardown_runs_exactly_once() {
        let mut transport = MockBleTransport::new();
        transport.expect_disconnect().times(1).returning(|_| Ok(()));
        transport.expect_close().times(1).returning(|_| ());
        let link = LinkGuard::new(Arc::new(transport), timeouts().disconnect);

        link.attach("dev-1").await;
        link.teardown().await;
        link.teardown().await;
    }

    #[tokio::test]
    async fn teardown_without_connection_is_noop() {
        let transport = MockBleTransport::new();
        let link = LinkGuard::new(Arc::new(transport), timeouts().disconnect);
        link.teardown().await;
        assert!(!link.is_attached().await);
    }

    #[tokio::test]
    async fn teardown_closes_even_if_disconnect_fails() {
        let mut transport = MockBleTransport::new();
        transport
            .expect_disconnect()
            .times(1)
            .returning(|_| Err(TransportError::Status { code: 19 }));
        transport.expect_close().times(1).returning(|_| ());
        let link = LinkGuard::new(Arc::new(transport), timeouts().disconnect);

        link.attach("dev-1").await;
        link.teardown().await;
    }

    #[tokio::test]
    async fn connect_status_code_is_link_failure() {
        let mut transport = MockBleTransport::new();
        transport
            .expect_connect()
            .times(1)
            .returning(|_| Err(TransportError::Status { code: 133 }));
        let transport = Arc::new(transport);
        let link = LinkGuard::new(transport.clone(), timeouts().disconnect);
        let connection = ConnectionManager::new(transport, timeouts(), UUID_NOTIFIER_SERVICE, UUID_NOTIFIER_WRITE_CHAR);

        let result = connection.connect(&link, "dev-1").await;

        assert_eq!(result, LinkResult::Failed(BleError::LinkFailure(TransportError::Status { code: 133 })));
        assert!(link.is_attached().await);
    }

    /// A device that accepts the connect request and then never answers.
    #[derive(Default)]
    struct SilentDevice {
        closes: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BleTransport for SilentDevice {
        async fn adapter_enabled(&self) -> bool {
            true
        }
        async fn start_scan(&self) -> Result<crate::core::bluetooth::transport::ScanStream, TransportError> {
            Err(TransportError::AdapterUnavailable)
        }
        async fn connect(&self, _id: &str) -> Result<(), TransportError> {
            std::future::pending().await
        }
        async fn discover_services(&self, _id: &str) -> Result<Vec<GattService>, TransportError> {
            std::future::pending().await
        }
        async fn write_characteristic(&self, _: &str, _: Uuid, _: Uuid, _: &[u8]) -> Result<(), TransportError> {
            std::future::pending().await
        }
        async fn disconnect(&self, _id: &str) -> Result<(), TransportError> {
            std::future::pending().await
        }
        async fn close(&self, _id: &str) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn every_phase_is_bounded() {
        let transport = Arc::new(SilentDevice::default());
        let link = LinkGuard::new(transport.clone(), timeouts().disconnect);
        let connection = ConnectionManager::new(transport, timeouts(), UUID_NOTIFIER_SERVICE, UUID_NOTIFIER_WRITE_CHAR);

        assert_eq!(connection.connect(&link, "dev-1").await, LinkResult::Failed(BleError::LinkTimeout));
        assert_eq!(
            connection.discover_write_target("dev-1").await,
            LinkResult::Failed(BleError::DiscoveryTimeout)
        );
        assert_eq!(
            connection.write_command("dev-1", NotificationCommand::Default).await,
            LinkResult::Failed(BleError::WriteTimeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_disconnect_still_closes() {
        let transport = Arc::new(SilentDevice::default());
        let link = LinkGuard::new(transport.clone(), timeouts().disconnect);
        link.attach("dev-1").await;

        let started = tokio::time::Instant::now();
        link.teardown().await;

        assert!(started.elapsed() >= timeouts().disconnect);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_characteristic_is_reported() {
        let mut transport = MockBleTransport::new();
        transport.expect_discover_services().returning(|_| {
            Ok(vec![GattService {
                uuid: UUID_NOTIFIER_SERVICE,
                characteristics: vec![Uuid::nil()],
            }])
        });

        let result = manager(transport).discover_write_target("dev-1").await;

        assert_eq!(result, LinkResult::Failed(BleError::CharacteristicMissing(UUID_NOTIFIER_WRITE_CHAR)));
    }

    #[tokio::test]
    async fn missing_service_is_reported() {
        let mut transport = MockBleTransport::new();
        transport.expect_discover_services().returning(|_| {
            Ok(vec![GattService {
                uuid: Uuid::nil(),
                characteristics: vec![UUID_NOTIFIER_WRITE_CHAR],
            }])
        });

        let result = manager(transport).discover_write_target("dev-1").await;

        assert_eq!(result, LinkResult::Failed(BleError::ServiceMissing(UUID_NOTIFIER_SERVICE)));
    }

    #[tokio::test]
    async fn disconnect_during_discovery_is_dropped() {
        let mut transport = MockBleTransport::new();
        transport
            .expect_discover_services()
            .returning(|_| Err(TransportError::Disconnected));

        let result = manager(transport).discover_write_target("dev-1").await;

        assert_eq!(result, LinkResult::Dropped);
    }

    #[tokio::test]
    async fn write_sends_command_bytes() {
        let mut transport = MockBleTransport::new();
        transport
            .expect_write_characteristic()
            .withf(|id, service, characteristic, payload| {
                id == "dev-1"
                    && *service == UUID_NOTIFIER_SERVICE
                    && *characteristic == UUID_NOTIFIER_WRITE_CHAR
                    && payload == b"SILENT".as_slice()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let result = manager(transport).write_command("dev-1", NotificationCommand::Silent).await;

        assert_eq!(result, LinkResult::Done(()));
    }

    #[tokio::test]
    async fn remote_nack_is_write_rejected() {
        let mut transport = MockBleTransport::new();
        transport
            .expect_write_characteristic()
            .returning(|_, _, _, _| Err(TransportError::Status { code: 3 }));

        let result = manager(transport).write_command("dev-1", NotificationCommand::Default).await;

        assert_eq!(result, LinkResult::Failed(BleError::WriteRejected(TransportError::Status { code: 3 })));
    }
}
