// ── Live session state ──
//
// What a session knows right now about its device. Owned and published
// by exactly one `DeviceSession`; never persisted.

use serde::Serialize;

use lumen_api::{DeviceInfo, DeviceState};

use super::device::{Device, PLACEHOLDER_NAME, non_blank};
use super::identity::HardwareId;

/// Transport status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Device self-description from the latest status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
    /// WiFi signal quality, percent.
    pub signal: Option<u8>,
    pub led_count: u32,
}

impl From<&DeviceInfo> for ReportedInfo {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            name: info.name.clone(),
            version: info.version.clone(),
            platform: info.arch.clone(),
            signal: info.wifi.signal,
            led_count: info.leds.count,
        }
    }
}

/// Output state from the latest status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeState {
    pub on: bool,
    pub brightness: u8,
    /// Primary color of each segment, in segment order.
    pub segment_colors: Vec<[u8; 3]>,
}

impl RuntimeState {
    /// Primary color of the first segment.
    pub fn color(&self) -> Option<[u8; 3]> {
        self.segment_colors.first().copied()
    }
}

impl From<&DeviceState> for RuntimeState {
    fn from(state: &DeviceState) -> Self {
        let segment_colors = state
            .seg
            .iter()
            .filter_map(|seg| seg.col.first())
            .filter_map(|rgb| match rgb.as_slice() {
                [r, g, b, ..] => Some([*r, *g, *b]),
                _ => None,
            })
            .collect();
        Self {
            on: state.on,
            brightness: state.bri,
            segment_colors,
        }
    }
}

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveState {
    pub identity: HardwareId,
    /// User-chosen name copied from the registry when the session was created.
    pub custom_name: Option<String>,
    pub status: ConnectionStatus,
    pub info: Option<ReportedInfo>,
    pub runtime: Option<RuntimeState>,
}

impl LiveState {
    pub fn new(device: &Device) -> Self {
        Self {
            identity: device.identity.clone(),
            custom_name: device.custom_name.clone(),
            status: ConnectionStatus::Disconnected,
            info: device.reported_name.as_ref().map(|name| ReportedInfo {
                name: name.clone(),
                version: String::new(),
                platform: String::new(),
                signal: None,
                led_count: 0,
            }),
            runtime: None,
        }
    }

    /// Custom name, else the name the device last reported.
    pub fn display_name(&self) -> &str {
        non_blank(self.custom_name.as_deref())
            .or_else(|| non_blank(self.info.as_ref().map(|i| i.name.as_str())))
            .unwrap_or(PLACEHOLDER_NAME)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lumen_api::StatusPayload;

    const STATUS: &str = r#"{
        "state": {"on": true, "bri": 128, "seg": [
            {"id": 0, "on": true, "col": [[255, 160, 0], [0, 0, 0]]},
            {"id": 1, "on": true, "col": [[0, 0, 255, 0]]}
        ]},
        "info": {"ver": "0.15.0-b3", "name": "Desk", "mac": "a8032a1b2c3d",
                 "arch": "esp32", "leds": {"count": 60}, "wifi": {"signal": 72}}
    }"#;

    #[test]
    fn runtime_state_collects_primary_colors() {
        let status = StatusPayload::from_json(STATUS).unwrap();
        let runtime = RuntimeState::from(&status.state);
        assert!(runtime.on);
        assert_eq!(runtime.brightness, 128);
        assert_eq!(runtime.segment_colors, vec![[255, 160, 0], [0, 0, 255]]);
        assert_eq!(runtime.color(), Some([255, 160, 0]));
    }

    #[test]
    fn reported_info_maps_fields() {
        let status = StatusPayload::from_json(STATUS).unwrap();
        let info = ReportedInfo::from(&status.info);
        assert_eq!(info.name, "Desk");
        assert_eq!(info.version, "0.15.0-b3");
        assert_eq!(info.platform, "esp32");
        assert_eq!(info.signal, Some(72));
        assert_eq!(info.led_count, 60);
    }

    #[test]
    fn display_name_prefers_custom_then_reported() {
        let mut device = Device::new(HardwareId::new("a8032a1b2c3d"), "10.0.0.5");
        let live = LiveState::new(&device);
        assert_eq!(live.display_name(), PLACEHOLDER_NAME);
        assert_eq!(live.status, ConnectionStatus::Disconnected);

        device.reported_name = Some("WLED".into());
        assert_eq!(LiveState::new(&device).display_name(), "WLED");

        device.custom_name = Some("Porch".into());
        assert_eq!(LiveState::new(&device).display_name(), "Porch");
    }
}
