// ── Device storage ──

mod collection;
mod registry;

pub use registry::{DeviceRegistry, JsonFileBackend, MemoryBackend, RegistryBackend};
