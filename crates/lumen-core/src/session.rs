//! Self-healing live session for one device.
//!
//! A [`DeviceSession`] keeps one status socket open to its device,
//! publishes a [`LiveState`] on every decoded status message, feeds the
//! device's self-description back into the registry, and forwards
//! [`Command`]s. When the socket drops it reconnects with capped
//! exponential backoff until [`stop`](DeviceSession::stop) is called.
//!
//! ```text
//! disconnected ──start──▶ connecting ──open──▶ connected
//!      ▲                      ▲                    │
//!      │                      └──backoff elapsed───┤
//!      └──────────────── close / error ◀───────────┘
//! ```
//!
//! Every run of the connection task carries its own `CancellationToken`.
//! State transitions and publications happen under the session's control
//! lock after checking that token, so a stopped or replaced run can never
//! publish again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use lumen_api::{Command, DeviceAddress, Error as ApiError, Frame, StatusPayload, StatusSocket};

use crate::model::{
    ConnectionStatus, Device, HardwareId, LiveState, ReportedInfo, RuntimeState, UpdateChannel,
};
use crate::store::DeviceRegistry;

/// How long a closing socket may take to flush its close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// How long `shutdown` waits for the connection task to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Minimum gap between `last_seen_at` writes when nothing else changed.
const CONTACT_REFRESH_SECS: i64 = 60;

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// Capped exponential backoff between reconnect attempts.
///
/// `delay = min(base_delay * 2^retry_count, max_delay)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure. Default: 2.5s.
    pub base_delay: Duration,
    /// Upper bound on any delay. Default: 60s.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

// ── DeviceSession ────────────────────────────────────────────────────

/// Live connection to one device. Owned by the roster; dropping the
/// handle stops the session.
pub struct DeviceSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    identity: HardwareId,
    address: String,
    policy: ReconnectPolicy,
    registry: Arc<DeviceRegistry>,
    state: watch::Sender<LiveState>,
    control: Mutex<Control>,
    connect_attempts: AtomicU32,
}

#[derive(Default)]
struct Control {
    status: ConnectionStatus,
    manually_stopped: bool,
    retry_count: u32,
    run: Option<Run>,
}

/// One spawned connection task and the handles that steer it.
struct Run {
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<Command>,
    /// Latest self-description, drained by the run's contact writer.
    contact: watch::Sender<Option<Contact>>,
    task: JoinHandle<()>,
}

/// What a status message says about the device itself.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Contact {
    name: String,
    version: String,
}

impl DeviceSession {
    pub(crate) fn new(device: &Device, registry: Arc<DeviceRegistry>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(LiveState::new(device));
        Self {
            inner: Arc::new(SessionInner {
                identity: device.identity.clone(),
                address: device.address.clone(),
                policy,
                registry,
                state,
                control: Mutex::new(Control::default()),
                connect_attempts: AtomicU32::new(0),
            }),
        }
    }

    pub fn identity(&self) -> &HardwareId {
        &self.inner.identity
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.control().status
    }

    /// Subscribe to this session's live state.
    pub fn state(&self) -> watch::Receiver<LiveState> {
        self.inner.state.subscribe()
    }

    pub fn live_state(&self) -> LiveState {
        self.inner.state.borrow().clone()
    }

    /// Begin connecting. No-op while connecting or connected.
    ///
    /// An address that cannot be turned into a socket URL leaves the
    /// session disconnected with no retry scheduled. Called during a
    /// reconnect delay, this connects immediately.
    pub fn start(&self) {
        let inner = &self.inner;
        let mut control = inner.control();
        if matches!(
            control.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return;
        }
        control.manually_stopped = false;

        let url = match DeviceAddress::parse(&inner.address) {
            Ok(address) => address.socket_url(),
            Err(e) => {
                warn!(
                    identity = %inner.identity,
                    address = %inner.address,
                    error = %e,
                    "Session not started: unusable address"
                );
                return;
            }
        };

        // A run waiting out its reconnect delay is superseded.
        if let Some(stale) = control.run.take() {
            stale.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let (outbound, commands) = mpsc::unbounded_channel();
        let (contact, contacts) = watch::channel(None);
        control.status = ConnectionStatus::Connecting;
        inner.publish_status(ConnectionStatus::Connecting);

        tokio::spawn(contact_writer(
            Arc::clone(&inner.registry),
            inner.identity.clone(),
            contacts,
            cancel.clone(),
        ));

        let task = tokio::spawn(connection_loop(
            Arc::clone(inner),
            url,
            commands,
            cancel.clone(),
        ));
        control.run = Some(Run {
            cancel,
            outbound,
            contact,
            task,
        });
    }

    /// Close the socket, cancel any pending reconnect, and stay
    /// disconnected until the next `start`. Idempotent.
    pub fn stop(&self) {
        drop(self.halt());
    }

    /// `stop`, then wait briefly for the connection task to wind down.
    pub async fn shutdown(&self) {
        if let Some(task) = self.halt() {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                debug!(identity = %self.inner.identity, "Connection task slow to exit");
            }
        }
    }

    /// Queue `command` for the device, starting the session if needed.
    ///
    /// Fire-and-forget: commands queued while the socket is down are sent
    /// once it opens. A failed transmission takes the reconnect path.
    pub fn send(&self, command: Command) {
        if self.status() != ConnectionStatus::Connected {
            self.start();
        }
        let control = self.inner.control();
        match control.run.as_ref() {
            Some(run) => {
                if run.outbound.send(command).is_err() {
                    warn!(identity = %self.inner.identity, "Command dropped: connection task gone");
                }
            }
            None => {
                warn!(identity = %self.inner.identity, "Command dropped: session is not running");
            }
        }
    }

    /// Refresh the user-chosen name shown in the live state.
    pub(crate) fn refresh_custom_name(&self, custom_name: Option<&str>) {
        self.inner.state.send_if_modified(|live| {
            if live.custom_name.as_deref() == custom_name {
                false
            } else {
                live.custom_name = custom_name.map(str::to_owned);
                true
            }
        });
    }

    fn halt(&self) -> Option<JoinHandle<()>> {
        let mut control = self.inner.control();
        control.manually_stopped = true;
        let task = control.run.take().map(|run| {
            run.cancel.cancel();
            run.task
        });
        control.status = ConnectionStatus::Disconnected;
        self.inner.publish_status(ConnectionStatus::Disconnected);
        task
    }

    #[cfg(test)]
    fn retry_count(&self) -> u32 {
        self.inner.control().retry_count
    }

    #[cfg(test)]
    pub(crate) fn connect_attempts(&self) -> u32 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("identity", &self.inner.identity)
            .field("address", &self.inner.address)
            .field("status", &self.status())
            .finish()
    }
}

// ── Transitions ──────────────────────────────────────────────────────
//
// Called only by the connection task. Each returns `false`/`None` when
// the run has been cancelled, which ends the task without publishing.

impl SessionInner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mirror `status` into the live state. Caller holds the control lock.
    fn publish_status(&self, status: ConnectionStatus) {
        self.state.send_if_modified(|live| {
            if live.status == status {
                false
            } else {
                live.status = status;
                true
            }
        });
    }

    fn on_open(&self, cancel: &CancellationToken) -> bool {
        let mut control = self.control();
        if cancel.is_cancelled() {
            return false;
        }
        control.status = ConnectionStatus::Connected;
        control.retry_count = 0;
        self.publish_status(ConnectionStatus::Connected);
        info!(identity = %self.identity, address = %self.address, "Status socket connected");
        true
    }

    /// Returns the delay before the next attempt, or `None` to give up.
    fn on_disconnect(&self, cancel: &CancellationToken) -> Option<Duration> {
        let mut control = self.control();
        if cancel.is_cancelled() {
            return None;
        }
        control.status = ConnectionStatus::Disconnected;
        self.publish_status(ConnectionStatus::Disconnected);
        if control.manually_stopped {
            return None;
        }
        Some(self.policy.delay_for(control.retry_count))
    }

    fn on_reconnect(&self, cancel: &CancellationToken) -> bool {
        let mut control = self.control();
        if cancel.is_cancelled() || control.manually_stopped {
            return false;
        }
        control.retry_count = control.retry_count.saturating_add(1);
        control.status = ConnectionStatus::Connecting;
        self.publish_status(ConnectionStatus::Connecting);
        true
    }

    fn on_status(&self, status: &StatusPayload, cancel: &CancellationToken) {
        let control = self.control();
        if cancel.is_cancelled() {
            return;
        }
        self.state.send_modify(|live| {
            live.info = Some(ReportedInfo::from(&status.info));
            live.runtime = Some(RuntimeState::from(&status.state));
        });

        let reported = HardwareId::new(&status.info.mac);
        if !reported.is_empty() && reported != self.identity {
            warn!(
                identity = %self.identity,
                reported = %reported,
                address = %self.address,
                "Status from a different device; registry left unchanged"
            );
            return;
        }

        // Not cancelled under the lock, so the current run is this one.
        if let Some(run) = control.run.as_ref() {
            run.contact.send_replace(Some(Contact {
                name: status.info.name.trim().to_owned(),
                version: status.info.version.clone(),
            }));
        }
    }
}

/// Write the newest contact into the registry until the run ends.
///
/// Frames arriving while a write is in progress collapse into one.
async fn contact_writer(
    registry: Arc<DeviceRegistry>,
    identity: HardwareId,
    mut contacts: watch::Receiver<Option<Contact>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            changed = contacts.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        let contact = contacts.borrow_and_update().clone();
        if let Some(contact) = contact {
            record_contact(&registry, &identity, &contact).await;
        }
    }
}

/// Fold a status message's self-description into the registry record.
///
/// `last_seen_at` alone is refreshed at most every
/// `CONTACT_REFRESH_SECS`, so a steady stream of identical frames
/// commits nothing.
async fn record_contact(registry: &DeviceRegistry, identity: &HardwareId, contact: &Contact) {
    let _guard = registry.lock_identity(identity).await;
    let now = Utc::now();
    let recorded = registry.update(identity, |device| {
        let mut changed = false;
        if !contact.name.is_empty() && device.reported_name.as_deref() != Some(contact.name.as_str()) {
            device.reported_name = Some(contact.name.clone());
            changed = true;
        }
        // Inferred once; a known channel is never overwritten.
        if device.update_channel == UpdateChannel::Unknown && !contact.version.is_empty() {
            device.update_channel = UpdateChannel::infer(&contact.version);
            changed = true;
        }
        if changed || contact_is_stale(device.last_seen_at, now) {
            device.last_seen_at = Some(now);
        }
    });
    if recorded.is_none() {
        debug!(identity = %identity, "Status not recorded: device no longer registered");
    }
}

fn contact_is_stale(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_seen.is_none_or(|seen| now.signed_duration_since(seen) >= TimeDelta::seconds(CONTACT_REFRESH_SECS))
}

// ── Connection task ──────────────────────────────────────────────────

enum SocketEnd {
    Cancelled,
    Closed,
    Failed(ApiError),
}

/// connect → pump → on drop, back off → reconnect, until cancelled.
async fn connection_loop(
    inner: Arc<SessionInner>,
    url: Url,
    mut commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    loop {
        let attempt = inner.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(identity = %inner.identity, url = %url, attempt, "Opening status socket");

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            opened = StatusSocket::connect(&url) => opened,
        };

        match opened {
            Ok(socket) => {
                if !inner.on_open(&cancel) {
                    return;
                }
                match pump(&inner, socket, &mut commands, &cancel).await {
                    SocketEnd::Cancelled => return,
                    SocketEnd::Closed => {
                        info!(identity = %inner.identity, "Status socket closed by device");
                    }
                    SocketEnd::Failed(e) => {
                        warn!(identity = %inner.identity, error = %e, "Status socket failed");
                    }
                }
            }
            Err(e) => {
                warn!(identity = %inner.identity, error = %e, attempt, "Could not open status socket");
            }
        }

        let Some(delay) = inner.on_disconnect(&cancel) else {
            return;
        };
        info!(
            identity = %inner.identity,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        if !inner.on_reconnect(&cancel) {
            return;
        }
    }
}

/// Read status frames and write queued commands until the socket ends.
async fn pump(
    inner: &SessionInner,
    socket: StatusSocket,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    cancel: &CancellationToken,
) -> SocketEnd {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                return SocketEnd::Cancelled;
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                    return SocketEnd::Cancelled;
                };
                if let Err(e) = sink.send(&command).await {
                    return SocketEnd::Failed(e);
                }
            }
            frame = stream.next_frame() => match frame {
                Ok(Some(Frame::Status(status))) => inner.on_status(&status, cancel),
                Ok(Some(Frame::Malformed(e))) => {
                    warn!(identity = %inner.identity, error = %e, "Skipping undecodable status frame");
                }
                Ok(None) => return SocketEnd::Closed,
                Err(e) => return SocketEnd::Failed(e),
            }
        }
    }
}
