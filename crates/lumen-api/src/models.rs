// Wire types for the device JSON API.
//
// Inbound types are lenient: every field has a default so that firmware
// revisions which omit a field still decode. Outbound `Command` is sparse:
// only the fields a caller sets are serialized, so each frame is a partial
// state update.

use serde::{Deserialize, Serialize};

// ── Inbound ─────────────────────────────────────────────────────────

/// `info` object from `GET /json/info` and from every status frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Hardware address without separators, e.g. `"a8032a1b2c3d"`.
    #[serde(default)]
    pub mac: String,

    #[serde(default)]
    pub name: String,

    /// Firmware version string, e.g. `"0.14.4"` or `"0.15.0-b3"`.
    #[serde(default, rename = "ver")]
    pub version: String,

    /// Platform identifier, e.g. `"esp32"`, `"esp8266"`.
    #[serde(default)]
    pub arch: String,

    #[serde(default)]
    pub leds: LedInfo,

    #[serde(default)]
    pub wifi: WifiInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedInfo {
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiInfo {
    /// Signal quality in percent (0-100).
    #[serde(default)]
    pub signal: Option<u8>,

    #[serde(default)]
    pub rssi: Option<i32>,
}

/// `state` object of a status frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    #[serde(default)]
    pub on: bool,

    /// Master brightness, 0-255.
    #[serde(default)]
    pub bri: u8,

    #[serde(default)]
    pub seg: Vec<SegmentState>,
}

/// One LED segment as reported by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentState {
    #[serde(default)]
    pub id: Option<u8>,

    #[serde(default)]
    pub on: Option<bool>,

    /// Up to three color slots, each `[r, g, b]` or `[r, g, b, w]`.
    #[serde(default)]
    pub col: Vec<Vec<u8>>,
}

/// Full frame pushed over `/ws`. Both halves are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub info: DeviceInfo,
    pub state: DeviceState,
}

impl StatusPayload {
    /// Decode a text frame.
    pub fn from_json(text: &str) -> Result<Self, crate::Error> {
        serde_json::from_str(text).map_err(|e| crate::Error::Deserialization {
            message: e.to_string(),
            body: text.chars().take(200).collect(),
        })
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// Partial state update sent to the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Command {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,

    /// Crossfade duration in units of 100 ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<u16>,

    /// Preset to apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ps: Option<i16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seg: Option<Vec<SegmentCommand>>,

    /// Ask the device to answer with a full status frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<Vec<[u8; 3]>>,
}

impl Command {
    pub fn power(on: bool) -> Self {
        Self {
            on: Some(on),
            ..Self::default()
        }
    }

    pub fn brightness(bri: u8) -> Self {
        Self {
            bri: Some(bri),
            ..Self::default()
        }
    }

    /// Set the primary color of the main segment.
    pub fn color(rgb: [u8; 3]) -> Self {
        Self {
            seg: Some(vec![SegmentCommand {
                col: Some(vec![rgb]),
                ..SegmentCommand::default()
            }]),
            ..Self::default()
        }
    }

    pub fn preset(id: i16) -> Self {
        Self {
            ps: Some(id),
            ..Self::default()
        }
    }

    /// Request a full status frame without changing anything.
    pub fn refresh() -> Self {
        Self {
            v: Some(true),
            ..Self::default()
        }
    }

    pub fn with_transition(mut self, deciseconds: u16) -> Self {
        self.transition = Some(deciseconds);
        self
    }

    pub fn to_json(&self) -> Result<String, crate::Error> {
        serde_json::to_string(self).map_err(|e| crate::Error::Encode(e.to_string()))
    }
}
