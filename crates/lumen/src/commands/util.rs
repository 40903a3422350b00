//! Shared helpers for command handlers.

use lumen_core::{Device, HardwareId, Hub};

use crate::error::CliError;

/// Resolve a device by hardware address, network address, or display name.
pub fn resolve_device(hub: &Hub, identifier: &str) -> Result<Device, CliError> {
    if let Some(device) = hub.registry().find(&HardwareId::new(identifier)) {
        return Ok(device);
    }

    let snap = hub.registry().snapshot();
    let matches: Vec<&Device> = snap
        .iter()
        .map(AsRef::as_ref)
        .filter(|d| d.address == identifier || d.display_name().eq_ignore_ascii_case(identifier))
        .collect();

    match matches.as_slice() {
        [device] => Ok((*device).clone()),
        [] => Err(CliError::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "list --all".into(),
        }),
        many => Err(CliError::Ambiguous {
            identifier: identifier.into(),
            matches: many
                .iter()
                .map(|d| d.identity.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Format an RGB triple as `#rrggbb`.
pub fn hex_color(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Parse `rrggbb` or `#rrggbb`.
pub fn parse_hex_color(raw: &str) -> Result<[u8; 3], CliError> {
    let invalid = || CliError::Validation {
        field: "color".into(),
        reason: format!("expected RRGGBB hex, got '{raw}'"),
    };
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_and_without_hash() {
        assert_eq!(parse_hex_color("#ff8800").unwrap(), [255, 136, 0]);
        assert_eq!(parse_hex_color("00FF10").unwrap(), [0, 255, 16]);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(parse_hex_color("fff").is_err());
        assert!(parse_hex_color("gg0000").is_err());
    }

    #[test]
    fn formats_hex() {
        assert_eq!(hex_color([255, 136, 0]), "#ff8800");
    }
}
