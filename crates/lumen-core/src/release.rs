//! Firmware release naming.
//!
//! Release binaries are published per platform as
//! `WLED_{version}_{PLATFORM}.bin`, where `version` is the release tag
//! without its leading `v`.

/// Marker that identifies a beta build in a version string.
const BETA_MARKER: &str = "-b";

/// Derive the binary asset name for a release tag and platform.
///
/// The version part is lowercased and stripped of a leading `v`; the
/// platform is uppercased. Surrounding whitespace is ignored.
pub fn asset_name(tag: &str, platform: &str) -> String {
    let version = version_from_tag(tag);
    let platform = platform.trim().to_uppercase();
    format!("WLED_{version}_{platform}.bin")
}

/// `"v0.15.0-B3"` → `"0.15.0-b3"`.
pub fn version_from_tag(tag: &str) -> String {
    let tag = tag.trim().to_lowercase();
    match tag.strip_prefix('v') {
        Some(rest) => rest.to_owned(),
        None => tag,
    }
}

/// Whether a firmware version string denotes a beta build.
pub fn is_beta_version(version: &str) -> bool {
    version.to_lowercase().contains(BETA_MARKER)
}
