//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use lumen_config::ConfigError;
use lumen_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach device at {address}")]
    #[diagnostic(
        code(lumen::unreachable),
        help(
            "Check that the device is powered and on the same network.\n\
             Reason: {reason}"
        )
    )]
    Unreachable { address: String, reason: String },

    #[error("Device at {address} did not report a hardware address")]
    #[diagnostic(
        code(lumen::no_identity),
        help("The endpoint answered but does not look like a WLED controller.")
    )]
    NoIdentity { address: String },

    #[error("{message}")]
    #[diagnostic(code(lumen::transport))]
    Transport { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(lumen::not_found),
        help("Run: lumen {list_command} to see registered {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("'{identifier}' matches more than one device: {matches}")]
    #[diagnostic(
        code(lumen::ambiguous),
        help("Use the hardware address shown by: lumen list --all")
    )]
    Ambiguous { identifier: String, matches: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(lumen::validation))]
    Validation { field: String, reason: String },

    // ── Subsystems ───────────────────────────────────────────────────
    #[error("Could not save the device registry to {path}")]
    #[diagnostic(
        code(lumen::storage),
        help("Check permissions on the registry file or pass --registry.\nReason: {message}")
    )]
    Storage { path: String, message: String },

    #[error("Discovery failed: {message}")]
    #[diagnostic(
        code(lumen::discovery),
        help("mDNS needs multicast on the local network. Add devices by address with: lumen add <address>")
    )]
    Discovery { message: String },

    #[error(transparent)]
    #[diagnostic(code(lumen::config), help("Inspect the file with: lumen config show"))]
    Config(#[from] ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {waited} waiting for {what}")]
    #[diagnostic(
        code(lumen::timeout),
        help("Increase the wait with --timeout or check the device is online.")
    )]
    Timeout { what: String, waited: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(lumen::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(lumen::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Could not render TOML: {0}")]
    #[diagnostic(code(lumen::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } | Self::Transport { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Ambiguous { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAddress { address, reason } => CliError::Validation {
                field: format!("address '{address}'"),
                reason,
            },
            CoreError::NoIdentity { address } => CliError::NoIdentity { address },
            CoreError::Unreachable { address, reason } => CliError::Unreachable { address, reason },
            CoreError::Decode { message } | CoreError::Transport { message } => {
                CliError::Transport { message }
            }
            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
                list_command: "list --all".into(),
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "device".into(),
                reason: message,
            },
            CoreError::Persistence { path, message } => CliError::Storage { path, message },
            CoreError::Discovery { message } => CliError::Discovery { message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let unreachable: CliError = CoreError::Unreachable {
            address: "10.0.0.5".into(),
            reason: "timed out".into(),
        }
        .into();
        assert_eq!(unreachable.exit_code(), exit_code::CONNECTION);

        let missing: CliError = CoreError::DeviceNotFound {
            identifier: "desk".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let invalid: CliError = CoreError::InvalidAddress {
            address: String::new(),
            reason: "empty".into(),
        }
        .into();
        assert_eq!(invalid.exit_code(), exit_code::USAGE);
    }
}
