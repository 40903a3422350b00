use thiserror::Error;

/// Top-level error type for the `lumen-api` crate.
///
/// Covers every failure mode on the wire: address parsing, the HTTP
/// identification request, the status socket, and JSON coding.
/// `lumen-core` maps these into its domain taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Addressing ──────────────────────────────────────────────────
    /// The raw address could not be normalized into a device endpoint.
    #[error("Invalid device address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── HTTP ────────────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The device answered with a non-success status code.
    #[error("Device returned HTTP {status}")]
    Http { status: u16 },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Reading from or writing to an open WebSocket failed.
    #[error("WebSocket I/O failed: {0}")]
    WebSocket(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An outbound command could not be encoded.
    #[error("Encoding error: {0}")]
    Encode(String),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) | Self::WebSocket(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the error came from a request that ran out of time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_transient() {
        let err = Error::Timeout { timeout_secs: 5 };
        assert!(err.is_transient());
        assert!(err.is_timeout());
    }

    #[test]
    fn http_status_is_not_transient() {
        let err = Error::Http { status: 404 };
        assert!(!err.is_transient());
        assert!(!err.is_timeout());
    }

    #[test]
    fn invalid_address_message_names_the_address() {
        let err = Error::InvalidAddress {
            address: "::bogus".into(),
            reason: "missing host".into(),
        };
        assert!(err.to_string().contains("::bogus"));
    }
}
