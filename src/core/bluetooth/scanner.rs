//! Scan controller: finds the one notifier a send attempt is aimed at.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::error::BleError;
use crate::core::bluetooth::transport::BleTransport;
use crate::core::bluetooth::types::{Advertisement, ScanEvent, TargetIdentity};

/// How a scan ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// First advertisement that matched the target.
    Matched(Advertisement),
    /// Time ran out and the target only needs the service UUID; nothing can be concluded.
    Inconclusive,
    /// The attempt was cancelled while scanning.
    Cancelled,
    /// Another scan was already running; nothing was started.
    Busy,
}

pub struct BluetoothScanner<T: BleTransport> {
    transport: Arc<T>,
    scan_timeout: Duration,
    is_scanning: AtomicBool,
}

impl<T: BleTransport> BluetoothScanner<T> {
    pub fn new(transport: Arc<T>, scan_timeout: Duration) -> Self {
        Self {
            transport,
            scan_timeout,
            is_scanning: AtomicBool::new(false),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.is_scanning.load(Ordering::SeqCst)
    }

    /// Scans until the target is seen, the scan window closes, or `cancel` fires.
    ///
    /// Filtering happens here rather than in the platform scan filter: every
    /// advertisement is checked for the service UUID and, when the target has a
    /// name, for an exact name match. The scan stops as soon as one is accepted.
    pub async fn find(&self, target: &TargetIdentity, cancel: &CancellationToken) -> Result<ScanOutcome, BleError> {
        if self.is_scanning.swap(true, Ordering::SeqCst) {
            warn!("Scan already in progress, ignoring start request");
            return Ok(ScanOutcome::Busy);
        }

        let outcome = self.scan(target, cancel).await;
        self.is_scanning.store(false, Ordering::SeqCst);
        outcome
    }

    async fn scan(&self, target: &TargetIdentity, cancel: &CancellationToken) -> Result<ScanOutcome, BleError> {
        info!("BLE scan starting (target: {})", target.display_name());
        let mut scan_stream = self.transport.start_scan().await.map_err(BleError::ScanFailed)?;

        let deadline = tokio::time::sleep(self.scan_timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                event = scan_stream.next() => {
                    match event {
                        Some(ScanEvent::Discovered(advertisement)) => {
                            if target.matches(&advertisement) {
                                info!(
                                    "Target device found: {:?} ({}), RSSI: {:?}",
                                    advertisement.name, advertisement.id, advertisement.rssi
                                );
                                break Ok(ScanOutcome::Matched(advertisement));
                            }
                            if advertisement.advertises(target.service_uuid) {
                                debug!(
                                    "Notifier service present but not our bus. Found: {:?}, looking for: {:?}",
                                    advertisement.name, target.device_name
                                );
                            }
                        }
                        Some(ScanEvent::Failed(e)) => {
                            warn!("Scan failed: {}", e);
                            break Err(BleError::ScanFailed(e));
                        }
                        None => {
                            // The stream ending early means no more advertisements will arrive;
                            // wait out the window so the verdict matches a quiet scan.
                            debug!("Scan stream ended before the scan window closed");
                            tokio::select! {
                                _ = &mut deadline => break self.timed_out(target),
                                _ = cancel.cancelled() => break Ok(ScanOutcome::Cancelled),
                            }
                        }
                    }
                }
                _ = &mut deadline => {
                    break self.timed_out(target);
                }
                _ = cancel.cancelled() => {
                    break Ok(ScanOutcome::Cancelled);
                }
            }
        };

        // Dropping the stream stops the platform scan.
        drop(scan_stream);
        info!("BLE scan stopped");
        outcome
    }

    fn timed_out(&self, target: &TargetIdentity) -> Result<ScanOutcome, BleError> {
        info!("Scan window of {:?} elapsed without a match", self.scan_timeout);
        if target.requires_name() {
            Err(BleError::DeviceNotFound(target.display_name()))
        } else {
            Ok(ScanOutcome::Inconclusive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{DEVICE_NAME_PREFIX, UUID_NOTIFIER_SERVICE};
    use crate::core::bluetooth::error::TransportError;
    use crate::core::bluetooth::transport::MockBleTransport;
    use crate::core::bluetooth::types::MatchPolicy;
    use futures_util::stream;
    use uuid::Uuid;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn target(policy: MatchPolicy) -> TargetIdentity {
        TargetIdentity::for_bus(UUID_NOTIFIER_SERVICE, DEVICE_NAME_PREFIX, "2221", policy)
    }

    fn transport_with(events: Vec<ScanEvent>) -> Arc<MockBleTransport> {
        let mut transport = MockBleTransport::new();
        transport.expect_start_scan().times(1).returning(move || {
            Ok(stream::iter(events.clone()).chain(stream::pending()).boxed())
        });
        Arc::new(transport)
    }

    fn notifier(id: &str, name: &str) -> ScanEvent {
        ScanEvent::Discovered(Advertisement::new(id, Some(name.to_string()), vec![UUID_NOTIFIER_SERVICE]))
    }

    #[tokio::test(start_paused = true)]
    async fn accepts_first_exact_match_only() {
        init_logger();
        let transport = transport_with(vec![
            ScanEvent::Discovered(Advertisement::new("speaker", Some("BF_DREAM_2221".into()), vec![Uuid::nil()])),
            notifier("other-bus", "BF_DREAM_1000"),
            notifier("our-bus", "BF_DREAM_2221"),
            notifier("our-bus-again", "BF_DREAM_2221"),
        ]);
        let scanner = BluetoothScanner::new(transport, Duration::from_secs(5));

        let outcome = scanner
            .find(&target(MatchPolicy::ServiceAndName), &CancellationToken::new())
            .await
            .unwrap();

        match outcome {
            ScanOutcome::Matched(advertisement) => assert_eq!(advertisement.id, "our-bus"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn strict_scan_timeout_is_not_found() {
        init_logger();
        let transport = transport_with(vec![notifier("other-bus", "BF_DREAM_1000")]);
        let scanner = BluetoothScanner::new(transport, Duration::from_secs(5));

        let err = scanner
            .find(&target(MatchPolicy::ServiceAndName), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, BleError::DeviceNotFound("BF_DREAM_2221".to_string()));
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn service_only_timeout_is_inconclusive() {
        init_logger();
        let transport = transport_with(vec![]);
        let scanner = BluetoothScanner::new(transport, Duration::from_secs(5));

        let outcome = scanner
            .find(&target(MatchPolicy::ServiceOnly), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ScanOutcome::Inconclusive);
    }

    #[tokio::test(start_paused = true)]
    async fn platform_scan_failure_carries_code() {
        init_logger();
        let transport = transport_with(vec![ScanEvent::Failed(TransportError::Status { code: 2 })]);
        let scanner = BluetoothScanner::new(transport, Duration::from_secs(5));

        let err = scanner
            .find(&target(MatchPolicy::ServiceAndName), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, BleError::ScanFailed(TransportError::Status { code: 2 }));
        assert_eq!(err.to_string(), "scan failed (code: 2)");
    }

    #[tokio::test(start_paused = true)]
    async fn scan_start_failure_is_reported() {
        init_logger();
        let mut transport = MockBleTransport::new();
        transport
            .expect_start_scan()
            .times(1)
            .returning(|| Err(TransportError::Status { code: 3 }));
        let scanner = BluetoothScanner::new(Arc::new(transport), Duration::from_secs(5));

        let err = scanner
            .find(&target(MatchPolicy::ServiceAndName), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, BleError::ScanFailed(TransportError::Status { code: 3 }));
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_scan() {
        init_logger();
        let transport = transport_with(vec![]);
        let scanner = BluetoothScanner::new(transport, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = scanner
            .find(&target(MatchPolicy::ServiceAndName), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, ScanOutcome::Cancelled);
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn second_scan_while_scanning_is_refused() {
        init_logger();
        let transport = transport_with(vec![]);
        let scanner = Arc::new(BluetoothScanner::new(transport, Duration::from_secs(5)));
        let cancel = CancellationToken::new();

        let first = {
            let scanner = scanner.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scanner.find(&target(MatchPolicy::ServiceAndName), &cancel).await })
        };
        while !scanner.is_scanning() {
            tokio::task::yield_now().await;
        }

        let second = scanner
            .find(&target(MatchPolicy::ServiceAndName), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second, ScanOutcome::Busy);
        assert!(scanner.is_scanning());

        cancel.cancel();
        assert_eq!(first.await.unwrap().unwrap(), ScanOutcome::Cancelled);
        assert!(!scanner.is_scanning());
    }
}
