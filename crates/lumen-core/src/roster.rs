// ── Session roster ──
//
// Keeps exactly one live session per registered identity. The registry
// change stream drives `reconcile`; the roster is the only place sessions
// are created or destroyed. Session state changes are aggregated into a
// single identity-ordered `Vec<LiveState>` for consumers.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lumen_api::Command;

use crate::model::{Device, HardwareId, LiveState};
use crate::session::{DeviceSession, ReconnectPolicy};
use crate::store::DeviceRegistry;

type Entries = BTreeMap<HardwareId, SessionEntry>;

/// Roster bookkeeping for one identity.
struct SessionEntry {
    session: DeviceSession,
    last_known_address: String,
    /// Republishes the roster whenever this session's state changes.
    forwarder: JoinHandle<()>,
}

impl SessionEntry {
    async fn retire(self) {
        self.forwarder.abort();
        self.session.shutdown().await;
    }
}

/// Cheaply cloneable handle to the roster.
#[derive(Clone)]
pub struct SessionRoster {
    inner: Arc<RosterInner>,
}

struct RosterInner {
    registry: Arc<DeviceRegistry>,
    policy: ReconnectPolicy,
    entries: Mutex<Entries>,
    paused: AtomicBool,
    live: watch::Sender<Arc<Vec<LiveState>>>,
}

impl SessionRoster {
    pub fn new(registry: Arc<DeviceRegistry>, policy: ReconnectPolicy) -> Self {
        let (live, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            inner: Arc::new(RosterInner {
                registry,
                policy,
                entries: Mutex::new(BTreeMap::new()),
                paused: AtomicBool::new(false),
                live,
            }),
        }
    }

    /// Aggregated live states, ordered by identity.
    pub fn live_states(&self) -> watch::Receiver<Arc<Vec<LiveState>>> {
        self.inner.live.subscribe()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Bring the session set in line with a registry snapshot.
    ///
    /// Identities missing from `devices` lose their session. An identity
    /// whose address differs from the one its session was built for gets
    /// a fresh session; the old one is shut down first. New identities get
    /// a session, started unless the roster is paused.
    pub async fn reconcile(&self, devices: &[Arc<Device>]) {
        let mut entries = self.inner.entries.lock().await;
        let paused = self.is_paused();

        let wanted: HashSet<&HardwareId> = devices
            .iter()
            .map(|d| &d.identity)
            .filter(|id| !id.is_empty())
            .collect();

        let departed: Vec<HardwareId> = entries
            .keys()
            .filter(|id| !wanted.contains(id))
            .cloned()
            .collect();
        for identity in departed {
            if let Some(entry) = entries.remove(&identity) {
                entry.retire().await;
                info!(identity = %identity, "Session removed");
            }
        }

        for device in devices.iter().filter(|d| !d.identity.is_empty()) {
            let unchanged = entries
                .get(&device.identity)
                .map(|entry| entry.last_known_address == device.address);

            match unchanged {
                Some(true) => {
                    if let Some(entry) = entries.get(&device.identity) {
                        entry.session.refresh_custom_name(device.custom_name.as_deref());
                    }
                }
                Some(false) => {
                    if let Some(old) = entries.remove(&device.identity) {
                        info!(
                            identity = %device.identity,
                            from = %old.last_known_address,
                            to = %device.address,
                            "Device moved; replacing session"
                        );
                        old.retire().await;
                    }
                    let entry = self.open_entry(device, paused);
                    entries.insert(device.identity.clone(), entry);
                }
                None => {
                    debug!(identity = %device.identity, address = %device.address, "Session created");
                    let entry = self.open_entry(device, paused);
                    entries.insert(device.identity.clone(), entry);
                }
            }
        }

        self.inner.publish_locked(&entries);
    }

    /// Drive `reconcile` from the registry's change stream until `cancel`
    /// fires, then shut every session down.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut changes = self.inner.registry.changes();
        let initial = Arc::clone(changes.current());
        self.reconcile(&initial).await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                snapshot = changes.changed() => match snapshot {
                    Some(snapshot) => self.reconcile(&snapshot).await,
                    None => break,
                },
            }
        }

        self.clear().await;
        debug!("Roster stopped");
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let roster = self.clone();
        tokio::spawn(async move { roster.run(cancel).await })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop every session but keep the entries.
    pub async fn pause_all(&self) {
        let entries = self.inner.entries.lock().await;
        self.inner.paused.store(true, Ordering::SeqCst);
        for entry in entries.values() {
            entry.session.stop();
        }
        info!(sessions = entries.len(), "Sessions paused");
        self.inner.publish_locked(&entries);
    }

    /// Restart every session at its last known address.
    pub async fn resume_all(&self) {
        let entries = self.inner.entries.lock().await;
        self.inner.paused.store(false, Ordering::SeqCst);
        for entry in entries.values() {
            entry.session.start();
        }
        info!(sessions = entries.len(), "Sessions resumed");
        self.inner.publish_locked(&entries);
    }

    /// Shut every session down and forget them.
    pub async fn clear(&self) {
        let mut entries = self.inner.entries.lock().await;
        let drained = std::mem::take(&mut *entries);
        for entry in drained.into_values() {
            entry.retire().await;
        }
        self.inner.publish_locked(&entries);
    }

    /// Recompute and republish the aggregated live states.
    pub async fn publish(&self) {
        self.inner.publish().await;
    }

    /// Route `command` to the session for `identity`. Returns `false` when
    /// the roster has no such session.
    pub async fn send(&self, identity: &HardwareId, command: Command) -> bool {
        let entries = self.inner.entries.lock().await;
        match entries.get(identity) {
            Some(entry) => {
                entry.session.send(command);
                true
            }
            None => false,
        }
    }

    /// `(identity, address)` for every session, ordered by identity.
    pub async fn sessions(&self) -> Vec<(HardwareId, String)> {
        let entries = self.inner.entries.lock().await;
        entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.last_known_address.clone()))
            .collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn open_entry(&self, device: &Device, paused: bool) -> SessionEntry {
        let session = DeviceSession::new(device, Arc::clone(&self.inner.registry), self.inner.policy);
        let forwarder = spawn_forwarder(Arc::downgrade(&self.inner), session.state());
        if !paused {
            session.start();
        }
        SessionEntry {
            session,
            last_known_address: device.address.clone(),
            forwarder,
        }
    }

    #[cfg(test)]
    async fn with_session<R>(&self, identity: &HardwareId, f: impl FnOnce(&DeviceSession) -> R) -> Option<R> {
        let entries = self.inner.entries.lock().await;
        entries.get(identity).map(|entry| f(&entry.session))
    }
}

impl RosterInner {
    async fn publish(&self) {
        let entries = self.entries.lock().await;
        self.publish_locked(&entries);
    }

    fn publish_locked(&self, entries: &Entries) {
        let states: Vec<LiveState> = entries.values().map(|e| e.session.live_state()).collect();
        self.live.send_replace(Arc::new(states));
    }
}

fn spawn_forwarder(roster: Weak<RosterInner>, mut state: watch::Receiver<LiveState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let Some(roster) = roster.upgrade() else {
                break;
            };
            roster.publish().await;
        }
    })
}
