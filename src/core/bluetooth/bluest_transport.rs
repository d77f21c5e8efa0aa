//! `BleTransport` over the host Bluetooth stack, via bluest.
//! Scanning runs in its own task and is stopped when the caller drops the stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluest::error::ErrorKind;
use bluest::{Adapter, AdapterEvent, AdvertisingDevice, Device};
use futures_util::{stream, StreamExt};
use log::{debug, error, info, warn};
use regex::Regex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::bluetooth::constants::SCAN_EVENT_CHANNEL_CAPACITY;
use crate::core::bluetooth::error::TransportError;
use crate::core::bluetooth::transport::{BleTransport, ScanStream};
use crate::core::bluetooth::types::{Advertisement, GattService, ScanEvent};

impl From<bluest::Error> for TransportError {
    fn from(e: bluest::Error) -> Self {
        match e.kind() {
            ErrorKind::NotConnected => TransportError::Disconnected,
            ErrorKind::AdapterUnavailable => TransportError::AdapterUnavailable,
            ErrorKind::Protocol(att) => TransportError::Status {
                code: i32::from(u8::from(att)),
            },
            _ => TransportError::Platform(e.to_string()),
        }
    }
}

pub struct BluestTransport {
    adapter: Adapter,
    /// Last power state reported by the adapter
    available: Arc<AtomicBool>,
    /// Devices seen by the scanner, keyed by platform id
    devices: Arc<Mutex<HashMap<String, Device>>>,
}

impl BluestTransport {
    /// Opens the default adapter and waits for it to become available.
    pub async fn new() -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        let available = Arc::new(AtomicBool::new(true));
        tokio::spawn(Self::adapter_watch_task(adapter.clone(), available.clone()));

        Ok(Self {
            adapter,
            available,
            devices: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Follows the adapter being powered on and off.
    async fn adapter_watch_task(adapter: Adapter, available: Arc<AtomicBool>) {
        let mut events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                warn!("Cannot follow adapter state, assuming it stays available: {}", e);
                return;
            }
        };

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => apply_adapter_event(&available, event),
                Err(e) => warn!("Adapter event error: {}", e),
            }
        }
        debug!("Adapter event stream ended");
    }

    fn device(&self, id: &str) -> Result<Device, TransportError> {
        self.devices
            .lock()
            .map_err(|_| TransportError::Platform("device table poisoned".to_string()))?
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::Platform(format!("unknown device: {}", id)))
    }

    /// Forwards scan results into `tx` until the receiver goes away.
    async fn internal_scan_task(
        adapter: Adapter,
        devices: Arc<Mutex<HashMap<String, Device>>>,
        tx: mpsc::Sender<ScanEvent>,
    ) {
        info!("Starting bluetooth scan");
        let mut scan_stream = match adapter.scan(&[]).await {
            Ok(scan_stream) => scan_stream,
            Err(e) => {
                error!("Failed to start scan: {}", e);
                let _ = tx.send(ScanEvent::Failed(e.into())).await;
                return;
            }
        };

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            let advertisement = Self::record(&devices, discovered);
                            if tx.send(ScanEvent::Discovered(advertisement)).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            let _ = tx
                                .send(ScanEvent::Failed(TransportError::Platform("scan stream ended".into())))
                                .await;
                            break;
                        }
                    }
                }
                _ = tx.closed() => {
                    break;
                }
            }
        }
        info!("Bluetooth scan stopped.");
    }

    /// Remembers the device for a later connect and converts the advertisement.
    fn record(devices: &Arc<Mutex<HashMap<String, Device>>>, discovered: AdvertisingDevice) -> Advertisement {
        let device = discovered.device;
        let id = device.id().to_string();
        let name = discovered
            .adv_data
            .local_name
            .clone()
            .or_else(|| device.name().ok());
        debug!("Found device - ID: {}, Name: {:?}, RSSI: {:?}", id, name, discovered.rssi);

        if let Ok(mut devices) = devices.lock() {
            devices.insert(id.clone(), device);
        }

        Advertisement {
            address: extract_mac_address(&id),
            id,
            name,
            services: discovered.adv_data.services,
            rssi: discovered.rssi,
        }
    }
}

#[async_trait]
impl BleTransport for BluestTransport {
    async fn adapter_enabled(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn start_scan(&self) -> Result<ScanStream, TransportError> {
        let (tx, rx) = mpsc::channel(SCAN_EVENT_CHANNEL_CAPACITY);
        tokio::spawn(Self::internal_scan_task(self.adapter.clone(), self.devices.clone(), tx));

        let scan = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|event| (event, rx)) });
        Ok(scan.boxed())
    }

    async fn connect(&self, id: &str) -> Result<(), TransportError> {
        let device = self.device(id)?;
        if !device.is_connected().await {
            info!("Initiating connection to {}...", id);
            self.adapter.connect_device(&device).await?;
        }
        Ok(())
    }

    async fn discover_services(&self, id: &str) -> Result<Vec<GattService>, TransportError> {
        let device = self.device(id)?;
        let mut table = Vec::new();
        for service in device.discover_services().await? {
            let characteristics = service
                .discover_characteristics()
                .await?
                .iter()
                .map(|c| c.uuid())
                .collect();
            debug!("Available service: {}", service.uuid());
            table.push(GattService {
                uuid: service.uuid(),
                characteristics,
            });
        }
        Ok(table)
    }

    async fn write_characteristic(
        &self,
        id: &str,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let device = self.device(id)?;
        let service = device
            .discover_services_with_uuid(service)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Platform(format!("service {} vanished", service)))?;
        let write_char = service
            .discover_characteristics_with_uuid(characteristic)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Platform(format!("characteristic {} vanished", characteristic)))?;

        // Write with response: completes once the peer acknowledged it.
        write_char.write(payload).await?;
        Ok(())
    }

    async fn disconnect(&self, id: &str) -> Result<(), TransportError> {
        let device = self.device(id)?;
        if device.is_connected().await {
            info!("Disconnecting from device {}", id);
            self.adapter.disconnect_device(&device).await?;
        } else {
            info!("Device {} not connected", id);
        }
        Ok(())
    }

    async fn close(&self, id: &str) {
        if let Ok(mut devices) = self.devices.lock() {
            if devices.remove(id).is_some() {
                debug!("Released device handle {}", id);
            }
        }
    }
}

fn apply_adapter_event(available: &AtomicBool, event: AdapterEvent) {
    match event {
        AdapterEvent::Available => {
            info!("Bluetooth adapter became available");
            available.store(true, Ordering::SeqCst);
        }
        AdapterEvent::Unavailable => {
            warn!("Bluetooth adapter became unavailable");
            available.store(false, Ordering::SeqCst);
        }
    }
}

/// Pulls a MAC address out of a platform device id, when it has one.
fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().replace('_', ":").to_uppercase())
}
