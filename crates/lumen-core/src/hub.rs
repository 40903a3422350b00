// ── Hub ──
//
// One object wiring the registry, resolver, discovery listener, and
// session roster together for front-ends. Owns the background tasks it
// spawns and tears them down on `shutdown`.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::discovery::DiscoveryListener;
use crate::error::CoreError;
use crate::model::Device;
use crate::resolver::IdentityResolver;
use crate::roster::SessionRoster;
use crate::store::DeviceRegistry;

/// Cheaply cloneable via `Arc<HubInner>`.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: LinkConfig,
    registry: Arc<DeviceRegistry>,
    resolver: Arc<IdentityResolver>,
    roster: SessionRoster,
    discovery: DiscoveryListener,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Hub {
    /// Open the registry described by `config` and build every component.
    /// Nothing touches the network until [`start_sessions`](Self::start_sessions)
    /// or [`start_discovery`](Self::start_discovery).
    pub fn open(config: LinkConfig) -> Result<Self, CoreError> {
        let registry = Arc::new(match &config.registry_path {
            Some(path) => DeviceRegistry::open_file(path)?,
            None => DeviceRegistry::in_memory(),
        });
        let resolver = Arc::new(IdentityResolver::new(Arc::clone(&registry), &config)?);
        let roster = SessionRoster::new(Arc::clone(&registry), config.reconnect);
        let discovery = DiscoveryListener::new(config.discovery.clone());

        Ok(Self {
            inner: Arc::new(HubInner {
                config,
                registry,
                resolver,
                roster,
                discovery,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    pub fn resolver(&self) -> &Arc<IdentityResolver> {
        &self.inner.resolver
    }

    pub fn roster(&self) -> &SessionRoster {
        &self.inner.roster
    }

    pub fn discovery(&self) -> &DiscoveryListener {
        &self.inner.discovery
    }

    /// Identify the device at `address` and add or update its record.
    pub async fn add(&self, address: &str) -> Result<Device, CoreError> {
        let (_, device) = self.inner.resolver.resolve(address).await?;
        Ok(device)
    }

    /// Keep one live session per registered device until `shutdown`.
    pub async fn start_sessions(&self) {
        let handle = self.inner.roster.spawn(self.inner.cancel.child_token());
        self.inner.task_handles.lock().await.push(handle);
        info!(devices = self.inner.registry.len(), "Session roster running");
    }

    /// Browse for devices and fold every sighting into the registry.
    ///
    /// Each device recorded this way is also sent on the returned channel.
    pub fn start_discovery(&self) -> Result<mpsc::UnboundedReceiver<Device>, CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let resolver = Arc::clone(&self.inner.resolver);
        let cancel = self.inner.cancel.clone();

        self.inner.discovery.start(move |sighting| {
            let resolver = Arc::clone(&resolver);
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let handled = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    handled = resolver.handle_sighting(&sighting) => handled,
                };
                match handled {
                    Ok(device) => {
                        let _ = tx.send(device);
                    }
                    Err(e) => {
                        warn!(address = %sighting.address, error = %e, "Sighted device could not be identified");
                    }
                }
            });
        })?;
        Ok(rx)
    }

    /// Stop discovery, cancel background tasks, shut every session down
    /// and wait for pending registry writes.
    pub async fn shutdown(&self) {
        self.inner.discovery.stop();
        self.inner.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                debug!(error = %e, "Background task ended abnormally");
            }
        }
        self.inner.roster.clear().await;
        self.inner.registry.flush().await;
    }
}
