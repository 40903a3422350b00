//! Live status socket.
//!
//! A thin typed wrapper over a `tokio-tungstenite` client stream for the
//! device's `/ws` endpoint. Inbound text frames are decoded into
//! [`StatusPayload`]s; outbound [`Command`]s are encoded as sparse JSON.
//!
//! A socket is a single connection attempt; the retry loop lives in
//! `lumen-core`'s session.
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_api::{Command, DeviceAddress, Frame, StatusSocket};
//!
//! let addr = DeviceAddress::parse("192.168.1.40")?;
//! let (mut sink, mut stream) = StatusSocket::connect(&addr.socket_url()).await?.split();
//! sink.send(&Command::power(true)).await?;
//!
//! while let Some(frame) = stream.next_frame().await? {
//!     if let Frame::Status(status) = frame {
//!         println!("{} is {}", status.info.name, if status.state.on { "on" } else { "off" });
//!     }
//! }
//! ```

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::models::{Command, StatusPayload};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── StatusSocket ────────────────────────────────────────────────────

/// An open status socket, before being split into its two halves.
pub struct StatusSocket {
    inner: WsStream,
}

impl StatusSocket {
    /// Perform the WebSocket handshake against `url`.
    pub async fn connect(url: &Url) -> Result<Self, Error> {
        tracing::debug!(url = %url, "Connecting status socket");

        let (inner, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        Ok(Self { inner })
    }

    /// Split into independently usable write and read halves.
    pub fn split(self) -> (StatusSink, StatusStream) {
        let (write, read) = self.inner.split();
        (StatusSink { write }, StatusStream { read })
    }
}

// ── Write half ──────────────────────────────────────────────────────

pub struct StatusSink {
    write: SplitSink<WsStream, Message>,
}

impl StatusSink {
    /// Encode and transmit a command.
    pub async fn send(&mut self, command: &Command) -> Result<(), Error> {
        let json = command.to_json()?;
        tracing::trace!(payload = %json, "Sending command");
        self.write
            .send(Message::text(json))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    /// Send a close frame. Errors are ignored; the peer may already be gone.
    pub async fn close(&mut self) {
        let _ = self.write.send(Message::Close(None)).await;
        let _ = self.write.close().await;
    }
}

// ── Read half ───────────────────────────────────────────────────────

/// One decoded inbound frame.
#[derive(Debug)]
pub enum Frame {
    Status(Box<StatusPayload>),
    /// A text frame that did not decode as a status payload. Not fatal.
    Malformed(Error),
}

pub struct StatusStream {
    read: SplitStream<WsStream>,
}

impl StatusStream {
    /// Wait for the next text frame.
    ///
    /// Returns `Ok(None)` when the peer closes the socket cleanly and
    /// `Err` on a transport failure. Control and binary frames are skipped.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let frame = match StatusPayload::from_json(text.as_str()) {
                        Ok(status) => Frame::Status(Box::new(status)),
                        Err(e) => Frame::Malformed(e),
                    };
                    return Ok(Some(frame));
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        tracing::debug!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "Status socket close frame received"
                        );
                    }
                    return Ok(None);
                }
                Some(Ok(_)) => {
                    // Ping/Pong are answered by tungstenite; binary frames
                    // carry live LED previews, which are not consumed here.
                }
                Some(Err(e)) => return Err(Error::WebSocket(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}
