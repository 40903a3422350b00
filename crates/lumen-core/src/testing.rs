// In-process device doubles for session and roster tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::CoreError;
use crate::model::Device;
use crate::session::ReconnectPolicy;
use crate::store::RegistryBackend;

/// A status socket served on localhost.
pub(crate) struct FakeDevice {
    pub addr: SocketAddr,
    /// Text frames the client sent, in order.
    pub received: mpsc::UnboundedReceiver<String>,
    connections: Arc<AtomicUsize>,
}

impl FakeDevice {
    /// Accept connections; push `frames` to each client, then either keep
    /// reading (collecting commands) or hang up.
    pub async fn spawn(frames: Vec<String>, hang_up: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, received) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let frames = frames.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    for frame in frames {
                        if ws.send(Message::text(frame)).await.is_err() {
                            return;
                        }
                    }
                    if hang_up {
                        let _ = ws.close(None).await;
                        return;
                    }
                    while let Some(Ok(message)) = ws.next().await {
                        if let Message::Text(text) = message {
                            let _ = tx.send(text.as_str().to_owned());
                        }
                    }
                });
            }
        });

        Self {
            addr,
            received,
            connections,
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// A localhost port with nothing listening on it.
pub(crate) async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

pub(crate) fn status_frame(name: &str, version: &str, on: bool) -> String {
    status_frame_from("a8032a1b2c3d", name, version, on)
}

/// A status frame reporting `mac` as the hardware address.
pub(crate) fn status_frame_from(mac: &str, name: &str, version: &str, on: bool) -> String {
    json!({
        "state": { "on": on, "bri": 200, "seg": [{ "id": 0, "col": [[255, 120, 0]] }] },
        "info": {
            "name": name,
            "ver": version,
            "mac": mac,
            "arch": "esp32",
            "leds": { "count": 30 },
            "wifi": { "signal": 80 }
        }
    })
    .to_string()
}

/// Keeps nothing but counts saves.
#[derive(Clone, Default)]
pub(crate) struct CountingBackend {
    saves: Arc<AtomicUsize>,
}

impl CountingBackend {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl RegistryBackend for CountingBackend {
    fn load(&self) -> Result<Vec<Device>, CoreError> {
        Ok(Vec::new())
    }

    fn save(&self, _devices: &[Arc<Device>]) -> Result<(), CoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
    }
}

/// Poll `check` until it holds, failing the test after five seconds.
pub(crate) async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
