//! AT command manager
//!
//! Serializes command/response exchange with the modem over a serial
//! transport. A single worker owns the protocol state machine and all link
//! I/O; clients submit commands through [`AtManager`] and either await the
//! completed transaction or fire and forget. Modem liveness is driven
//! entirely by the status service: the AT link is opened when the modem
//! comes up, torn down when it goes away, and re-subscribed on recovery.

mod core;
mod reactor;
mod status;

use self::core::ManagerCore;
use self::reactor::{Event, Reactor};
use crate::protocol::command::{
    AtCommand, PeriodicCommand, PeriodicHandle, QueuedCommand, UnsolicitedCommand,
    UnsolicitedHandle,
};
use crate::transport::ModemTransport;
use modemkit_core::{
    thread_safe, thread_safe_map, thread_safe_rw, AtListener, AtListenerHandle, AtResponse,
    CommandError, ModemStatus, Result, ThreadSafe, ThreadSafeMap, ThreadSafeRw, TransportError,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Tuning and wiring for an [`AtManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Unix socket of the modem status service.
    pub status_socket: String,
    /// Unix socket of the recovery service accepting cleanup requests.
    pub cleanup_socket: String,
    /// How long to wait for one answer sentence before retrying.
    pub answer_timeout_ms: u64,
    /// Grace period after a link error before recovery is requested.
    pub recover_timeout_ms: u64,
    /// Total transmissions of one command before it is failed.
    pub max_retries: u32,
    /// Interval between status service connection attempts.
    pub status_retry_interval_ms: u64,
    /// Total window for status service connection attempts.
    pub status_connect_window_ms: u64,
    /// How long `start` waits for the first status event.
    pub first_status_timeout_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            status_socket: "/var/run/modem/status".to_string(),
            cleanup_socket: "/var/run/modem/cleanup".to_string(),
            answer_timeout_ms: 1000,
            recover_timeout_ms: 2000,
            max_retries: 5,
            status_retry_interval_ms: 200,
            status_connect_window_ms: 5000,
            first_status_timeout_secs: 60,
        }
    }
}

impl ManagerConfig {
    pub(crate) fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }

    pub(crate) fn recover_timeout(&self) -> Duration {
        Duration::from_millis(self.recover_timeout_ms)
    }

    pub(crate) fn status_retry_interval(&self) -> Duration {
        Duration::from_millis(self.status_retry_interval_ms)
    }

    pub(crate) fn status_connect_window(&self) -> Duration {
        Duration::from_millis(self.status_connect_window_ms)
    }
}

/// Flags shared between client callers and the worker.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub started: bool,
    pub modem_status: ModemStatus,
    pub transport_ready: bool,
    pub client_waiting: bool,
}

pub(crate) struct PeriodicEntry {
    pub id: String,
    pub command: PeriodicCommand,
    pub next_due: Instant,
}

pub(crate) struct UnsolicitedEntry {
    pub id: String,
    pub command: UnsolicitedCommand,
}

/// Periodic and unsolicited registrations. Mutated by clients, scanned by
/// the worker; registrations survive modem restarts and manager restarts.
#[derive(Default)]
pub(crate) struct Registries {
    pub periodic: Vec<PeriodicEntry>,
    pub unsolicited: Vec<UnsolicitedEntry>,
}

struct WorkerHandles {
    events: mpsc::Sender<Event>,
    shutdown: mpsc::Sender<()>,
    reactor: JoinHandle<()>,
    status_reader: JoinHandle<()>,
}

/// Handle to the AT command manager.
///
/// Cheap to share behind an `Arc`; every method takes `&self`. One manager
/// instance owns one modem link, one status channel connection, and one
/// worker; multiple independent instances can coexist.
pub struct AtManager {
    config: ManagerConfig,
    transport: Arc<dyn ModemTransport>,
    shared: ThreadSafeRw<SharedState>,
    registries: ThreadSafe<Registries>,
    listeners: ThreadSafeMap<String, Arc<dyn AtListener>>,
    worker: RwLock<Option<WorkerHandles>>,
    answer_wait: RwLock<Duration>,
}

impl AtManager {
    /// Create a manager over the given transport. Nothing is opened until
    /// [`start`](Self::start).
    pub fn new(transport: Arc<dyn ModemTransport>, config: ManagerConfig) -> Self {
        Self {
            config,
            transport,
            shared: thread_safe_rw(SharedState::default()),
            registries: thread_safe(Registries::default()),
            listeners: thread_safe_map(),
            worker: RwLock::new(None),
            answer_wait: RwLock::new(Duration::from_secs(5)),
        }
    }

    /// Connect to the status service, spawn the worker, and wait for the
    /// first modem status event.
    ///
    /// `modem_path` is the AT link endpoint opened on every modem-up
    /// transition; `answer_wait` bounds how long
    /// [`send_command`](Self::send_command) blocks for a completed
    /// transaction.
    pub async fn start(&self, modem_path: &str, answer_wait: Duration) -> Result<()> {
        if self.shared.read().started || self.worker.read().is_some() {
            return Err(CommandError::AlreadyStarted.into());
        }

        let stream = status::connect_with_retry(
            &self.config.status_socket,
            self.config.status_retry_interval(),
            self.config.status_connect_window(),
        )
        .await?;
        let (status_reader_half, status_writer_half) = stream.into_split();

        let (events_tx, events_rx) = mpsc::channel::<Event>(64);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (first_status_tx, first_status_rx) = oneshot::channel::<()>();

        let status_reader = status::spawn_status_reader(status_reader_half, events_tx.clone());

        let core = ManagerCore::new(
            self.config.clone(),
            modem_path.to_string(),
            self.transport.clone(),
            self.shared.clone(),
            self.registries.clone(),
            self.listeners.clone(),
            events_tx.clone(),
            status_writer_half,
            first_status_tx,
        );
        let reactor = tokio::spawn(Reactor::new(events_rx, shutdown_rx, core).run());

        *self.worker.write() = Some(WorkerHandles {
            events: events_tx,
            shutdown: shutdown_tx,
            reactor,
            status_reader,
        });
        *self.answer_wait.write() = answer_wait;

        let wait = Duration::from_secs(self.config.first_status_timeout_secs);
        match tokio::time::timeout(wait, first_status_rx).await {
            Ok(Ok(())) => {}
            _ => {
                tracing::error!(
                    "Unable to get modem status after {}s",
                    self.config.first_status_timeout_secs
                );
                self.stop().await;
                return Err(TransportError::NoStatusReceived {
                    secs: self.config.first_status_timeout_secs,
                }
                .into());
            }
        }

        self.shared.write().started = true;
        Ok(())
    }

    /// Stop the worker and release every descriptor.
    ///
    /// An outstanding synchronous call is failed with
    /// [`CommandError::Aborted`] when its transaction is discarded.
    pub async fn stop(&self) {
        let handles = self.worker.write().take();
        if let Some(handles) = handles {
            let _ = handles.shutdown.send(()).await;
            handles.status_reader.abort();

            let mut reactor = handles.reactor;
            tokio::select! {
                _ = &mut reactor => {}
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    tracing::warn!("Worker did not stop in time, aborting");
                    reactor.abort();
                }
            }
        }

        let mut shared = self.shared.write();
        shared.started = false;
        shared.transport_ready = false;
        shared.modem_status = ModemStatus::Down;
        shared.client_waiting = false;
    }

    /// Send a command and await the completed transaction.
    ///
    /// Returns the transaction record (`success` reflects the terminal
    /// sentinel), or an error when the command could not be submitted, the
    /// wait expired, or the manager stopped underneath the call.
    /// Only one synchronous call may be outstanding at a time.
    pub async fn send_command(&self, command: AtCommand) -> Result<AtResponse> {
        let events = self.claim(true)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = QueuedCommand::new(command, Some(reply_tx));
        if events.send(Event::Submit(queued)).await.is_err() {
            self.shared.write().client_waiting = false;
            return Err(CommandError::Aborted.into());
        }

        let wait = *self.answer_wait.read();
        let result = tokio::time::timeout(wait, reply_rx).await;
        self.shared.write().client_waiting = false;

        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CommandError::Aborted.into()),
            Err(_) => Err(CommandError::Timeout {
                timeout_ms: wait.as_millis() as u64,
            }
            .into()),
        }
    }

    /// Queue a command without waiting for its answer.
    ///
    /// The outcome is discarded; delivery is still subject to the same
    /// retry and recovery machinery as synchronous commands.
    pub async fn post_command(&self, command: AtCommand) -> Result<()> {
        let events = self.claim(false)?;
        events
            .send(Event::Submit(QueuedCommand::new(command, None)))
            .await
            .map_err(|_| CommandError::Aborted)?;
        Ok(())
    }

    /// Gatekeeping shared by the send paths: started, transport ready, no
    /// synchronous call outstanding. Marks the caller as waiting when
    /// `synchronous`.
    fn claim(&self, synchronous: bool) -> Result<mpsc::Sender<Event>> {
        {
            let mut shared = self.shared.write();
            if !shared.started {
                return Err(CommandError::NotStarted.into());
            }
            if !shared.transport_ready {
                return Err(CommandError::NotReady.into());
            }
            if shared.client_waiting {
                return Err(CommandError::Busy.into());
            }
            if synchronous {
                shared.client_waiting = true;
            }
        }

        match self.worker.read().as_ref() {
            Some(handles) => Ok(handles.events.clone()),
            None => {
                if synchronous {
                    self.shared.write().client_waiting = false;
                }
                Err(CommandError::NotStarted.into())
            }
        }
    }

    /// Register a command resent on a fixed interval while the modem is up.
    pub fn add_periodic_command(&self, command: PeriodicCommand) -> PeriodicHandle {
        let id = Uuid::new_v4().to_string();
        let next_due = Instant::now() + command.interval();
        self.registries.lock().periodic.push(PeriodicEntry {
            id: id.clone(),
            command,
            next_due,
        });
        self.wake_worker();
        PeriodicHandle(id)
    }

    /// Drop a periodic registration. Already-queued sends are unaffected.
    pub fn remove_periodic_command(&self, handle: &PeriodicHandle) {
        self.registries
            .lock()
            .periodic
            .retain(|entry| entry.id != handle.0);
    }

    /// Register an unsolicited response pattern.
    ///
    /// The subscription command is sent immediately when the modem link is
    /// up, and again after every modem restart.
    pub fn add_unsolicited_command(&self, command: UnsolicitedCommand) -> UnsolicitedHandle {
        let id = Uuid::new_v4().to_string();
        let subscribe = command.subscribe().clone();
        self.registries
            .lock()
            .unsolicited
            .push(UnsolicitedEntry { id: id.clone(), command });

        if self.shared.read().transport_ready {
            self.submit_from_registry(subscribe);
        }
        UnsolicitedHandle(id)
    }

    /// Drop an unsolicited registration. The modem-side subscription is not
    /// revoked; further matching lines are simply ignored.
    pub fn remove_unsolicited_command(&self, handle: &UnsolicitedHandle) {
        self.registries
            .lock()
            .unsolicited
            .retain(|entry| entry.id != handle.0);
    }

    /// Last status reported by the status service.
    pub fn modem_status(&self) -> ModemStatus {
        self.shared.read().modem_status
    }

    /// Whether `start` completed and `stop` has not been called.
    pub fn is_started(&self) -> bool {
        self.shared.read().started
    }

    /// Whether the modem link is open and commands can be sent.
    pub fn is_transport_ready(&self) -> bool {
        self.shared.read().transport_ready
    }

    /// Register a listener for modem state changes and unsolicited
    /// responses.
    pub fn register_listener(&self, listener: Arc<dyn AtListener>) -> AtListenerHandle {
        let id = Uuid::new_v4().to_string();
        self.listeners.write().insert(id.clone(), listener);
        AtListenerHandle(id)
    }

    /// Remove a previously registered listener.
    pub fn unregister_listener(&self, handle: AtListenerHandle) {
        let _ = self.listeners.write().remove(&handle.0);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn submit_from_registry(&self, command: AtCommand) {
        if let Some(handles) = self.worker.read().as_ref() {
            if handles
                .events
                .try_send(Event::Submit(QueuedCommand::new(command, None)))
                .is_err()
            {
                tracing::warn!("Worker queue full, subscription deferred to next modem up");
            }
        }
    }

    fn wake_worker(&self) {
        if let Some(handles) = self.worker.read().as_ref() {
            let _ = handles.events.try_send(Event::Wake);
        }
    }
}
