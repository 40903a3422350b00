// ── Hardware identity ──
//
// The stable primary key of every device. Devices report their MAC in
// several shapes ("A8:03:2A:1B:2C:3D", "a8032a1b2c3d", mDNS TXT records
// with dashes); all of them collapse to the same `HardwareId`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hardware identity, normalized to lowercase hex without separators.
///
/// An empty `HardwareId` means "the device did not report one" and is
/// never used as a registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct HardwareId(String);

impl HardwareId {
    /// Normalize from any common format: colon/dash/dot separated or bare hex.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw
            .as_ref()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.') && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HardwareId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<String> for HardwareId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for HardwareId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
