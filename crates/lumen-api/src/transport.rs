// Shared transport configuration for building reqwest::Client instances.
//
// Devices are plain-HTTP endpoints on the local network, so the only
// tuning that matters is the request timeout and the user agent.

use std::time::Duration;

/// Default timeout for the one-shot identification request.
pub const DEFAULT_IDENTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_IDENTIFY_TIMEOUT,
            user_agent: concat!("lumen/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl TransportConfig {
    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` from this config.
    ///
    /// Idle keep-alive connections are dropped after one second so a
    /// device that changed address is never reached through a stale socket.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .pool_idle_timeout(Duration::from_secs(1))
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(crate::error::Error::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_five_seconds() {
        assert_eq!(TransportConfig::default().timeout, Duration::from_secs(5));
    }

    #[test]
    fn with_timeout_overrides() {
        let cfg = TransportConfig::default().with_timeout(Duration::from_millis(250));
        assert_eq!(cfg.timeout, Duration::from_millis(250));
    }
}
