// ── Device registry record ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::HardwareId;
use crate::release;

/// Name shown for a device that has neither a custom nor a reported name.
pub const PLACEHOLDER_NAME: &str = "(new device)";

/// Firmware release channel a device follows.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UpdateChannel {
    Stable,
    Beta,
    #[default]
    Unknown,
}

impl UpdateChannel {
    /// Infer the channel from a firmware version string.
    pub fn infer(version: &str) -> Self {
        if release::is_beta_version(version) {
            Self::Beta
        } else {
            Self::Stable
        }
    }
}

/// The persisted record for one known device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Primary key. Never reassigned once set.
    pub identity: HardwareId,

    /// Current network location in canonical [`lumen_api::DeviceAddress`] form.
    pub address: String,

    /// Name chosen by the user, if any.
    #[serde(default)]
    pub custom_name: Option<String>,

    /// Name the device reports about itself.
    #[serde(default)]
    pub reported_name: Option<String>,

    #[serde(default)]
    pub update_channel: UpdateChannel,

    #[serde(default)]
    pub hidden: bool,

    /// Updated on every successful contact.
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(identity: HardwareId, address: impl Into<String>) -> Self {
        Self {
            identity,
            address: address.into(),
            custom_name: None,
            reported_name: None,
            update_channel: UpdateChannel::Unknown,
            hidden: false,
            last_seen_at: None,
        }
    }

    /// Custom name, else reported name, else [`PLACEHOLDER_NAME`].
    pub fn display_name(&self) -> &str {
        non_blank(self.custom_name.as_deref())
            .or_else(|| non_blank(self.reported_name.as_deref()))
            .unwrap_or(PLACEHOLDER_NAME)
    }

    /// Merge `incoming` into `self`, last writer wins per field.
    ///
    /// `identity` is never touched. Optional fields only overwrite when
    /// `incoming` carries a value, and an `Unknown` channel never replaces
    /// a known one.
    pub(crate) fn merge_from(&mut self, incoming: Device) {
        self.address = incoming.address;
        self.hidden = incoming.hidden;
        if incoming.custom_name.is_some() {
            self.custom_name = incoming.custom_name;
        }
        if incoming.reported_name.is_some() {
            self.reported_name = incoming.reported_name;
        }
        if incoming.update_channel != UpdateChannel::Unknown {
            self.update_channel = incoming.update_channel;
        }
        if incoming.last_seen_at.is_some() {
            self.last_seen_at = incoming.last_seen_at;
        }
    }
}

pub(crate) fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device::new(HardwareId::new("a8032a1b2c3d"), "10.0.0.5")
    }

    #[test]
    fn display_name_prefers_custom() {
        let mut d = device();
        d.reported_name = Some("WLED".into());
        d.custom_name = Some("Kitchen".into());
        assert_eq!(d.display_name(), "Kitchen");
    }

    #[test]
    fn display_name_falls_back_to_reported_then_placeholder() {
        let mut d = device();
        assert_eq!(d.display_name(), PLACEHOLDER_NAME);
        d.reported_name = Some("WLED".into());
        assert_eq!(d.display_name(), "WLED");
        d.custom_name = Some("   ".into());
        assert_eq!(d.display_name(), "WLED");
    }

    #[test]
    fn infer_channel() {
        assert_eq!(UpdateChannel::infer("0.15.0-b3"), UpdateChannel::Beta);
        assert_eq!(UpdateChannel::infer("0.14.4"), UpdateChannel::Stable);
    }

    #[test]
    fn channel_round_trips_through_strum() {
        assert_eq!(UpdateChannel::Beta.to_string(), "beta");
        assert_eq!("STABLE".parse::<UpdateChannel>().unwrap(), UpdateChannel::Stable);
    }

    #[test]
    fn merge_keeps_known_fields_when_incoming_is_sparse() {
        let mut stored = device();
        stored.custom_name = Some("Kitchen".into());
        stored.update_channel = UpdateChannel::Beta;

        let mut incoming = Device::new(HardwareId::new("ignored"), "10.0.0.9");
        incoming.reported_name = Some("WLED-Kitchen".into());
        stored.merge_from(incoming);

        assert_eq!(stored.identity.as_str(), "a8032a1b2c3d");
        assert_eq!(stored.address, "10.0.0.9");
        assert_eq!(stored.custom_name.as_deref(), Some("Kitchen"));
        assert_eq!(stored.reported_name.as_deref(), Some("WLED-Kitchen"));
        assert_eq!(stored.update_channel, UpdateChannel::Beta);
    }
}
