//! Bluetooth manager for the courtesy-seat notifier
//! This module provides the main interface for the notification flow: bus
//! selection, sending, resetting, and observing the connection state.
//!
//! Every state write goes through the session lock and names the attempt it
//! belongs to. Writes from an attempt that has been reset or superseded are
//! dropped, so there is only ever one writer.
//!
//! The radio itself is held through the link lease: an attempt takes it
//! before scanning and gives it back only after its teardown, so a send that
//! follows a reset waits for the previous link to be released.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::bluetooth_config::BleConfig;
use crate::config::settings::SettingsStore;
use crate::core::bluetooth::commands::NotificationCommand;
use crate::core::bluetooth::connection::{ConnectionManager, LinkGuard, LinkResult};
use crate::core::bluetooth::constants::{UUID_NOTIFIER_SERVICE, UUID_NOTIFIER_WRITE_CHAR};
use crate::core::bluetooth::error::BleError;
use crate::core::bluetooth::scanner::{BluetoothScanner, ScanOutcome};
use crate::core::bluetooth::transport::BleTransport;
use crate::core::bluetooth::types::{ConnectionState, TargetIdentity};
use crate::core::permissions::PermissionGate;

/// How a send attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptOutcome {
    Delivered,
    Failed(BleError),
    /// No verdict: the link dropped, or a service-only scan found nothing.
    Inconclusive,
    Cancelled,
}

struct ActiveAttempt {
    id: u64,
    target: TargetIdentity,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Session {
    next_attempt: u64,
    active: Option<ActiveAttempt>,
    shut_down: bool,
}

/// The observable values the UI reads.
struct StateStore {
    connection_state: watch::Sender<ConnectionState>,
    is_sending: watch::Sender<bool>,
    selected_bus_id: watch::Sender<Option<String>>,
}

impl StateStore {
    fn new() -> Self {
        Self {
            connection_state: watch::channel(ConnectionState::Idle).0,
            is_sending: watch::channel(false).0,
            selected_bus_id: watch::channel(None).0,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        debug!("Connection state -> {:?}", state);
        self.connection_state.send_replace(state);
    }
}

struct Inner<T: BleTransport, P: PermissionGate> {
    transport: Arc<T>,
    permissions: P,
    settings: Arc<SettingsStore>,
    sound_on: watch::Receiver<bool>,
    config: BleConfig,
    scanner: BluetoothScanner<T>,
    link_lease: AsyncMutex<()>,
    store: StateStore,
    session: Mutex<Session>,
    tasks: TaskTracker,
}

/// Drives courtesy-seat notifications over a [`BleTransport`]
pub struct BluetoothManager<T: BleTransport, P: PermissionGate> {
    inner: Arc<Inner<T, P>>,
}

impl<T: BleTransport, P: PermissionGate> Clone for BluetoothManager<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: BleTransport, P: PermissionGate> BluetoothManager<T, P> {
    /// Creates a new BluetoothManager
    pub fn new(transport: Arc<T>, permissions: P, settings: Arc<SettingsStore>, config: BleConfig) -> Self {
        let sound_on = settings.sound_on();
        let scanner = BluetoothScanner::new(transport.clone(), config.scan_timeout());
        Self {
            inner: Arc::new(Inner {
                transport,
                permissions,
                settings,
                sound_on,
                config,
                scanner,
                link_lease: AsyncMutex::new(()),
                store: StateStore::new(),
                session: Mutex::new(Session::default()),
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.store.connection_state.borrow().clone()
    }

    pub fn is_sending(&self) -> bool {
        *self.inner.store.is_sending.borrow()
    }

    pub fn selected_bus_id(&self) -> Option<String> {
        self.inner.store.selected_bus_id.borrow().clone()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.store.connection_state.subscribe()
    }

    pub fn subscribe_is_sending(&self) -> watch::Receiver<bool> {
        self.inner.store.is_sending.subscribe()
    }

    pub fn subscribe_selected_bus(&self) -> watch::Receiver<Option<String>> {
        self.inner.store.selected_bus_id.subscribe()
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanner.is_scanning()
    }

    /// The target of the send in flight, if any.
    pub fn in_flight_target(&self) -> Option<TargetIdentity> {
        self.inner.lock_session().active.as_ref().map(|a| a.target.clone())
    }

    /// Selects `bus_id`, or clears the selection when it is already selected or `None`.
    ///
    /// Ignored while a send is in flight or a link is up. Returns whether the
    /// selection was applied.
    pub fn select_bus(&self, bus_id: Option<String>) -> bool {
        let _session = self.inner.lock_session();
        let store = &self.inner.store;
        if *store.is_sending.borrow() || store.connection_state.borrow().is_link_active() {
            warn!("Cannot change the selected bus while a notification is being sent");
            return false;
        }

        let current = store.selected_bus_id.borrow().clone();
        let next = match bus_id {
            Some(id) if current.as_deref() == Some(id.as_str()) => None,
            other => other,
        };
        info!("Selected bus: {:?}", next);
        store.selected_bus_id.send_replace(next);
        true
    }

    /// Starts a courtesy-seat notification to the notifier on `bus_number`.
    ///
    /// Returns as soon as the request is validated; progress is observed through
    /// the connection state. The handle of the spawned attempt is returned when
    /// one was started. A call while another send is in flight is ignored.
    pub async fn send_courtesy_seat_notification(&self, bus_number: &str) -> Option<JoinHandle<()>> {
        let inner = &self.inner;
        let (id, target, cancel) = {
            let mut session = inner.lock_session();
            if session.shut_down {
                warn!("Bluetooth manager is shut down, ignoring send request");
                return None;
            }
            if *inner.store.is_sending.borrow() {
                debug!("A notification is already being sent, ignoring request");
                return None;
            }
            if inner.store.selected_bus_id.borrow().is_none() || bus_number.trim().is_empty() {
                inner.store.set_state(ConnectionState::Error(BleError::NoBusSelected.to_string()));
                return None;
            }
            if !inner.permissions.has_required_permissions() {
                inner.store.set_state(ConnectionState::Error(BleError::PermissionDenied.to_string()));
                return None;
            }

            session.next_attempt += 1;
            let id = session.next_attempt;
            let target = TargetIdentity::for_bus(
                UUID_NOTIFIER_SERVICE,
                &inner.config.device_name_prefix,
                bus_number,
                inner.config.match_policy,
            );
            let cancel = CancellationToken::new();
            session.active = Some(ActiveAttempt {
                id,
                target: target.clone(),
                cancel: cancel.clone(),
            });
            inner.store.is_sending.send_replace(true);
            (id, target, cancel)
        };
        info!("Target device set: {}", target.display_name());

        if !inner.transport.adapter_enabled().await {
            inner.finish(id, AttemptOutcome::Failed(BleError::AdapterDisabled));
            return None;
        }
        if !inner.publish(id, ConnectionState::Scanning) {
            debug!("Send attempt {} was reset before scanning started", id);
            return None;
        }

        let task_inner = inner.clone();
        Some(inner.tasks.spawn(async move {
            task_inner.run_attempt(id, target, cancel).await;
        }))
    }

    /// Forces `Idle`, clears sending and the selection.
    ///
    /// An attempt in flight is cancelled; its own task still tears its link down.
    pub fn reset_state(&self) {
        let mut session = self.inner.lock_session();
        if let Some(active) = session.active.take() {
            info!("Cancelling send attempt {}", active.id);
            active.cancel.cancel();
        }
        debug!("Resetting state");
        let store = &self.inner.store;
        store.set_state(ConnectionState::Idle);
        store.is_sending.send_replace(false);
        store.selected_bus_id.send_replace(None);
    }

    /// Updates the persisted sound preference.
    pub async fn toggle_sound(&self, enabled: bool) -> Result<()> {
        self.inner.settings.set_sound_on(enabled).await
    }

    /// Cancels any send in flight and waits until its link is torn down.
    /// Later send requests are ignored.
    pub async fn shutdown(&self) {
        {
            let mut session = self.inner.lock_session();
            session.shut_down = true;
            if let Some(active) = session.active.take() {
                active.cancel.cancel();
            }
            self.inner.store.set_state(ConnectionState::Idle);
            self.inner.store.is_sending.send_replace(false);
        }
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        info!("Bluetooth manager shut down");
    }
}

impl<T: BleTransport, P: PermissionGate> Inner<T, P> {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        // A panic while holding the lock cannot leave the session half-written.
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publishes `state` if attempt `id` is still the active one.
    fn publish(&self, id: u64, state: ConnectionState) -> bool {
        let session = self.lock_session();
        match &session.active {
            Some(active) if active.id == id => {
                self.store.set_state(state);
                true
            }
            _ => false,
        }
    }

    /// Publishes the terminal state of attempt `id` and clears sending.
    fn finish(&self, id: u64, outcome: AttemptOutcome) {
        let mut session = self.lock_session();
        if !matches!(&session.active, Some(active) if active.id == id) {
            debug!("Dropping outcome {:?} of stale send attempt {}", outcome, id);
            return;
        }
        session.active = None;

        let state = match outcome {
            AttemptOutcome::Delivered => {
                info!("Courtesy-seat notification delivered");
                ConnectionState::Success
            }
            AttemptOutcome::Failed(e) => {
                error!("Courtesy-seat notification failed: {}", e);
                ConnectionState::Error(e.to_string())
            }
            AttemptOutcome::Inconclusive | AttemptOutcome::Cancelled => ConnectionState::Idle,
        };
        self.store.set_state(state);
        self.store.is_sending.send_replace(false);
    }

    async fn run_attempt(&self, id: u64, target: TargetIdentity, cancel: CancellationToken) {
        let _lease = tokio::select! {
            lease = self.link_lease.lock() => lease,
            _ = cancel.cancelled() => {
                self.finish(id, AttemptOutcome::Cancelled);
                return;
            }
        };

        let link = LinkGuard::new(self.transport.clone(), self.config.phase_timeouts().disconnect);
        let outcome = match self.drive(id, &target, &link, &cancel).await {
            Ok(()) => AttemptOutcome::Delivered,
            Err(outcome) => outcome,
        };
        link.teardown().await;
        self.finish(id, outcome);
    }

    /// scan -> connect -> discover -> write. `Err` carries every non-delivery outcome.
    async fn drive(
        &self,
        id: u64,
        target: &TargetIdentity,
        link: &LinkGuard<T>,
        cancel: &CancellationToken,
    ) -> Result<(), AttemptOutcome> {
        let device = match self.scanner.find(target, cancel).await {
            Ok(ScanOutcome::Matched(advertisement)) => advertisement,
            Ok(ScanOutcome::Inconclusive) => return Err(AttemptOutcome::Inconclusive),
            Ok(ScanOutcome::Cancelled | ScanOutcome::Busy) => return Err(AttemptOutcome::Cancelled),
            Err(e) => return Err(AttemptOutcome::Failed(e)),
        };

        if !self.publish(id, ConnectionState::Connecting) {
            return Err(AttemptOutcome::Cancelled);
        }
        if !self.permissions.can_connect() {
            return Err(AttemptOutcome::Failed(BleError::ConnectPermissionDenied));
        }

        let connection = ConnectionManager::new(
            self.transport.clone(),
            self.config.phase_timeouts(),
            UUID_NOTIFIER_SERVICE,
            UUID_NOTIFIER_WRITE_CHAR,
        );
        step(cancel, connection.connect(link, &device.id)).await?;

        if !self.publish(id, ConnectionState::Connected) {
            return Err(AttemptOutcome::Cancelled);
        }
        step(cancel, connection.discover_write_target(&device.id)).await?;

        let sound_on = *self.sound_on.borrow();
        let command = NotificationCommand::for_sound(sound_on);
        debug!("Command to send: {} (sound on: {})", command.as_str(), sound_on);
        step(cancel, connection.write_command(&device.id, command)).await
    }
}

/// Runs one link phase unless the attempt is cancelled first.
async fn step(cancel: &CancellationToken, phase: impl Future<Output = LinkResult<()>>) -> Result<(), AttemptOutcome> {
    tokio::select! {
        result = phase => match result {
            LinkResult::Done(()) => Ok(()),
            LinkResult::Failed(e) => Err(AttemptOutcome::Failed(e)),
            LinkResult::Dropped => {
                info!("Link dropped before the notifier answered");
                Err(AttemptOutcome::Inconclusive)
            }
        },
        _ = cancel.cancelled() => Err(AttemptOutcome::Cancelled),
    }
}
