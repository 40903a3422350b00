// ── Core error types ──
//
// User-facing errors from lumen-core. Consumers never see reqwest or
// tungstenite errors directly; `From<lumen_api::Error>` translates
// transport-layer failures into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Identification errors ────────────────────────────────────────
    #[error("Invalid device address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Device at {address} did not report a hardware identity")]
    NoIdentity { address: String },

    #[error("Device at {address} is unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Could not decode device payload: {message}")]
    Decode { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Subsystem errors ─────────────────────────────────────────────
    #[error("Could not persist device registry to {path}: {message}")]
    Persistence { path: String, message: String },

    #[error("Discovery failed: {message}")]
    Discovery { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Whether retrying the same operation later might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Transport { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<lumen_api::Error> for CoreError {
    fn from(err: lumen_api::Error) -> Self {
        match err {
            lumen_api::Error::InvalidAddress { address, reason } => {
                CoreError::InvalidAddress { address, reason }
            }
            lumen_api::Error::InvalidUrl(e) => CoreError::InvalidAddress {
                address: String::new(),
                reason: e.to_string(),
            },
            lumen_api::Error::Transport(ref e) => CoreError::Unreachable {
                address: e.url().map(|u| u.to_string()).unwrap_or_default(),
                reason: err.to_string(),
            },
            lumen_api::Error::Timeout { .. } | lumen_api::Error::Http { .. } => {
                CoreError::Unreachable {
                    address: String::new(),
                    reason: err.to_string(),
                }
            }
            lumen_api::Error::WebSocketConnect(message) | lumen_api::Error::WebSocket(message) => {
                CoreError::Transport { message }
            }
            lumen_api::Error::Deserialization { message, .. } | lumen_api::Error::Encode(message) => {
                CoreError::Decode { message }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn api_timeout_maps_to_unreachable() {
        let err: CoreError = lumen_api::Error::Timeout { timeout_secs: 5 }.into();
        assert!(matches!(err, CoreError::Unreachable { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn api_decode_failure_is_not_transient() {
        let err: CoreError = lumen_api::Error::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Decode { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn api_invalid_address_keeps_context() {
        let err: CoreError = lumen_api::Error::InvalidAddress {
            address: "ftp://x".into(),
            reason: "unsupported scheme 'ftp'".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Invalid device address 'ftp://x': unsupported scheme 'ftp'"
        );
    }
}
