// ── Runtime tuning ──
//
// Knobs for the connectivity subsystem. `lumen-config` builds this from
// the user's configuration file; tests build it directly.

use std::path::PathBuf;
use std::time::Duration;

use crate::session::ReconnectPolicy;

/// mDNS service type devices announce themselves under.
pub const SERVICE_TYPE: &str = "_wled._tcp.local.";

pub use lumen_api::transport::DEFAULT_IDENTIFY_TIMEOUT;

/// Per-candidate TCP probe timeout during discovery.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Discovery listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub service_type: String,
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: SERVICE_TYPE.to_owned(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Everything the connectivity subsystem needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub identify_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub discovery: DiscoveryConfig,
    /// JSON file backing the registry. `None` keeps records in memory only.
    pub registry_path: Option<PathBuf>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            identify_timeout: DEFAULT_IDENTIFY_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            discovery: DiscoveryConfig::default(),
            registry_path: None,
        }
    }
}
