//! Device connectivity layer between `lumen-api` and front-ends.
//!
//! This crate keeps a set of WLED-style lighting controllers known,
//! reachable, and observable:
//!
//! - **[`DeviceRegistry`]**: identity-keyed device records with atomic
//!   per-record commits, a watch-backed change stream ([`DeviceStream`]),
//!   and an optional JSON file backend.
//!
//! - **[`IdentityResolver`]**: turns an address into a hardware identity
//!   with one `GET /json/info` and records the result. Offers a no-network
//!   fast path for sightings that already carry an identity.
//!
//! - **[`DiscoveryListener`]**: mDNS browsing for `_wled._tcp`, with a TCP
//!   probe to pick a reachable address per announcement.
//!
//! - **[`DeviceSession`]**: one self-healing status socket per device with
//!   capped exponential backoff, publishing a [`LiveState`].
//!
//! - **[`SessionRoster`]**: reconciles sessions against registry snapshots
//!   and aggregates their live states.
//!
//! - **[`Hub`]**: wires all of the above together for a front-end.

pub mod config;
pub mod discovery;
pub mod error;
pub mod hub;
pub mod model;
pub mod release;
pub mod resolver;
pub mod roster;
pub mod session;
pub mod store;
pub mod stream;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DiscoveryConfig, LinkConfig};
pub use discovery::{DiscoveryListener, DiscoveryState, Sighting};
pub use error::CoreError;
pub use hub::Hub;
pub use resolver::IdentityResolver;
pub use roster::SessionRoster;
pub use session::{DeviceSession, ReconnectPolicy};
pub use store::{DeviceRegistry, JsonFileBackend, MemoryBackend, RegistryBackend};
pub use stream::{DeviceStream, EntityStream};

pub use model::{
    ConnectionStatus, Device, HardwareId, LiveState, PLACEHOLDER_NAME, ReportedInfo, RuntimeState,
    UpdateChannel,
};

// Wire-level command type, re-exported so front-ends need only this crate.
pub use lumen_api::Command;
