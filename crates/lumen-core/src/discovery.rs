//! mDNS discovery of devices on the local network.
//!
//! The listener browses for the device service type, turns each resolved
//! announcement into a reachable address with a short TCP probe, and hands
//! the result to a caller-supplied callback. It never writes the registry;
//! that is [`IdentityResolver::handle_sighting`](crate::IdentityResolver::handle_sighting)'s job.
//!
//! Discovery is opportunistic. When the mDNS transport fails the listener
//! moves to [`DiscoveryState::Failed`] and stops; callers restart it.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::CoreError;
use crate::model::HardwareId;

/// TXT record carrying the device's hardware address.
const IDENTITY_TXT_KEY: &str = "mac";

/// A reachable device endpoint seen during browsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    /// `ip:port` of the first candidate that accepted a connection.
    pub address: String,
    /// Hardware identity from the announcement, when present.
    pub identity_hint: Option<HardwareId>,
}

/// Listener lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DiscoveryState {
    Idle,
    Browsing,
    Ready,
    Failed(String),
}

type SightingCallback = Arc<dyn Fn(Sighting) + Send + Sync>;

// ── DiscoveryListener ────────────────────────────────────────────────

pub struct DiscoveryListener {
    config: DiscoveryConfig,
    state: Arc<watch::Sender<DiscoveryState>>,
    running: Mutex<Option<CancellationToken>>,
}

impl DiscoveryListener {
    pub fn new(config: DiscoveryConfig) -> Self {
        let (state, _) = watch::channel(DiscoveryState::Idle);
        Self {
            config,
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> watch::Receiver<DiscoveryState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> DiscoveryState {
        self.state.borrow().clone()
    }

    /// Begin browsing. Each endpoint is reported to `on_sighting` at most
    /// once until the listener is stopped. No-op while already browsing.
    pub fn start<F>(&self, on_sighting: F) -> Result<(), CoreError>
    where
        F: Fn(Sighting) + Send + Sync + 'static,
    {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|token| !token.is_cancelled()) {
            debug!("Discovery already running");
            return Ok(());
        }

        let (daemon, events) = match open_browser(&self.config.service_type) {
            Ok(opened) => opened,
            Err(message) => {
                warn!(error = %message, "Could not start mDNS browsing");
                self.state.send_replace(DiscoveryState::Failed(message.clone()));
                return Err(CoreError::Discovery { message });
            }
        };

        let cancel = CancellationToken::new();
        *running = Some(cancel.clone());
        self.state.send_replace(DiscoveryState::Browsing);
        info!(service_type = %self.config.service_type, "Discovery started");

        let task = BrowseTask {
            events,
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            on_sighting: Arc::new(on_sighting),
            cancel,
        };
        let service_type = self.config.service_type.clone();
        tokio::spawn(async move {
            task.run().await;
            close_browser(&daemon, &service_type);
        });
        Ok(())
    }

    /// End browsing and return to `Idle`. Idempotent.
    pub fn stop(&self) {
        let token = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
            info!("Discovery stopped");
        }
        self.state.send_replace(DiscoveryState::Idle);
    }
}

impl Drop for DiscoveryListener {
    fn drop(&mut self) {
        if let Some(token) = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

fn open_browser(
    service_type: &str,
) -> Result<(ServiceDaemon, flume::Receiver<ServiceEvent>), String> {
    let daemon = ServiceDaemon::new().map_err(|e| e.to_string())?;
    let events = daemon.browse(service_type).map_err(|e| e.to_string())?;
    Ok((daemon, events))
}

fn close_browser(daemon: &ServiceDaemon, service_type: &str) {
    if let Err(e) = daemon.stop_browse(service_type) {
        debug!(error = %e, "stop_browse failed");
    }
    if let Err(e) = daemon.shutdown() {
        debug!(error = %e, "mDNS daemon shutdown failed");
    }
}

// ── Browse loop ──────────────────────────────────────────────────────

/// Consumes browse events until cancelled or the channel closes.
struct BrowseTask {
    events: flume::Receiver<ServiceEvent>,
    config: DiscoveryConfig,
    state: Arc<watch::Sender<DiscoveryState>>,
    on_sighting: SightingCallback,
    cancel: CancellationToken,
}

impl BrowseTask {
    async fn run(self) {
        let mut reported: HashSet<String> = HashSet::new();

        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = self.events.recv_async() => event,
            };

            match event {
                Ok(ServiceEvent::SearchStarted(_)) => {
                    self.publish_if_running(|state| {
                        if *state == DiscoveryState::Browsing {
                            *state = DiscoveryState::Ready;
                            true
                        } else {
                            false
                        }
                    });
                }
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    let endpoint = Endpoint::from_service_info(&info);
                    if reported.contains(&endpoint.name) {
                        continue;
                    }
                    let probed = tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => break,
                        probed = probe_candidates(&endpoint.candidates, self.config.probe_timeout) => probed,
                    };
                    match probed {
                        Some(address) => {
                            debug!(endpoint = %endpoint.name, %address, "Device sighted");
                            reported.insert(endpoint.name);
                            (self.on_sighting)(Sighting {
                                address: address.to_string(),
                                identity_hint: endpoint.identity_hint,
                            });
                        }
                        None => {
                            debug!(endpoint = %endpoint.name, "No announced address was reachable");
                        }
                    }
                }
                Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                    debug!(endpoint = %fullname, "Announcement withdrawn");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "mDNS event channel closed; discovery stopped");
                    let message = e.to_string();
                    self.publish_if_running(|state| {
                        *state = DiscoveryState::Failed(message);
                        true
                    });
                    self.cancel.cancel();
                    break;
                }
            }
        }
    }

    fn publish_if_running(&self, modify: impl FnOnce(&mut DiscoveryState) -> bool) {
        if !self.cancel.is_cancelled() {
            self.state.send_if_modified(modify);
        }
    }
}

// ── Endpoint resolution ──────────────────────────────────────────────

/// What one resolved announcement offers.
#[derive(Debug)]
struct Endpoint {
    name: String,
    identity_hint: Option<HardwareId>,
    candidates: Vec<SocketAddr>,
}

impl Endpoint {
    fn from_service_info(info: &ServiceInfo) -> Self {
        let port = info.get_port();
        let mut candidates: Vec<SocketAddr> = info
            .get_addresses()
            .iter()
            .map(|ip| SocketAddr::new(IpAddr::from(*ip), port))
            .collect();
        // IPv4 first; link-local IPv6 without a scope rarely connects.
        candidates.sort_by_key(|addr| (addr.is_ipv6(), *addr));

        let identity_hint = info
            .get_property_val_str(IDENTITY_TXT_KEY)
            .map(HardwareId::new)
            .filter(|id| !id.is_empty());

        Self {
            name: info.get_fullname().to_owned(),
            identity_hint,
            candidates,
        }
    }
}

/// Return the first candidate that accepts a TCP connection within `timeout`.
pub(crate) async fn probe_candidates(
    candidates: &[SocketAddr],
    timeout: Duration,
) -> Option<SocketAddr> {
    for candidate in candidates {
        match tokio::time::timeout(timeout, TcpStream::connect(*candidate)).await {
            Ok(Ok(_stream)) => return Some(*candidate),
            Ok(Err(e)) => debug!(%candidate, error = %e, "Probe refused"),
            Err(_) => debug!(%candidate, timeout_ms = timeout.as_millis(), "Probe timed out"),
        }
    }
    None
}
