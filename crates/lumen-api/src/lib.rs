// lumen-api: Async wire-level client for WLED-style lighting controllers
//
// Two surfaces: the one-shot `GET /json/info` identification request and
// the long-lived `/ws` status socket. Everything above raw transport
// (sessions, registry, reconnection policy) lives in `lumen-core`.

pub mod address;
pub mod error;
pub mod info;
pub mod models;
pub mod transport;
pub mod websocket;

pub use address::DeviceAddress;
pub use error::Error;
pub use info::InfoClient;
pub use models::{Command, DeviceInfo, DeviceState, SegmentCommand, SegmentState, StatusPayload};
pub use transport::TransportConfig;
pub use websocket::{Frame, StatusSink, StatusSocket, StatusStream};
