// ── Domain model ──

mod device;
mod identity;
mod live;

pub use device::{Device, PLACEHOLDER_NAME, UpdateChannel};
pub use identity::HardwareId;
pub use live::{ConnectionStatus, LiveState, ReportedInfo, RuntimeState};
