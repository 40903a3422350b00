// ── Device address normalization ──
//
// Users type addresses by hand ("192.168.1.40", "wled-kitchen.local",
// "http://10.0.0.7:8080/"), discovery produces "ip:port". Everything is
// funnelled through `DeviceAddress` so the HTTP and socket endpoints are
// always derived the same way.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::Error;

/// A normalized device endpoint: scheme, host and optional explicit port.
///
/// Paths, queries and fragments from the raw input are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    base: Url,
}

impl DeviceAddress {
    /// Normalize a raw address. Bare hosts get an `http://` scheme;
    /// an existing `http`/`https` scheme is kept.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid(raw, "address is empty"));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_owned()
        } else {
            format!("http://{trimmed}")
        };

        let mut url = Url::parse(&candidate).map_err(|e| invalid(raw, &e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(raw, &format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid(raw, "missing host"));
        }

        url.set_path("/");
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { base: url })
    }

    /// `host[:port]`.
    pub fn authority(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    /// `GET` target for the identification request.
    pub fn info_url(&self) -> Url {
        let mut url = self.base.clone();
        url.set_path("/json/info");
        url
    }

    /// Target for the live status socket (`ws://` or `wss://` to match the scheme).
    pub fn socket_url(&self) -> Url {
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        let raw = format!("{scheme}://{}/ws", self.authority());
        // Derived from an already-validated host, so this always parses.
        Url::parse(&raw).unwrap_or_else(|_| self.base.clone())
    }
}

/// Canonical stored form: the bare authority for `http`, the full
/// `https://authority` otherwise. Parsing it again yields the same address.
impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.base.scheme() == "https" {
            write!(f, "https://{}", self.authority())
        } else {
            f.write_str(&self.authority())
        }
    }
}

impl FromStr for DeviceAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn invalid(raw: &str, reason: &str) -> Error {
    Error::InvalidAddress {
        address: raw.to_owned(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bare_ip_gets_http_scheme() {
        let addr = DeviceAddress::parse("192.168.1.40").unwrap();
        assert_eq!(addr.info_url().as_str(), "http://192.168.1.40/json/info");
        assert_eq!(addr.socket_url().as_str(), "ws://192.168.1.40/ws");
        assert_eq!(addr.authority(), "192.168.1.40");
    }

    #[test]
    fn explicit_port_is_preserved() {
        let addr = DeviceAddress::parse("10.0.0.7:8080").unwrap();
        assert_eq!(addr.authority(), "10.0.0.7:8080");
        assert_eq!(addr.socket_url().as_str(), "ws://10.0.0.7:8080/ws");
    }

    #[test]
    fn existing_scheme_is_kept_and_path_dropped() {
        let addr = DeviceAddress::parse("https://wled.local/settings?x=1").unwrap();
        assert_eq!(addr.info_url().as_str(), "https://wled.local/json/info");
        assert_eq!(addr.socket_url().as_str(), "wss://wled.local/ws");
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let addr: DeviceAddress = "  wled-kitchen.local \n".parse().unwrap();
        assert_eq!(addr.to_string(), "wled-kitchen.local");
    }

    #[test]
    fn https_scheme_survives_display() {
        let addr = DeviceAddress::parse("https://wled.local:8443/").unwrap();
        assert_eq!(addr.to_string(), "https://wled.local:8443");
        assert_eq!(DeviceAddress::parse(&addr.to_string()).unwrap(), addr);
    }

    #[test]
    fn discovery_style_default_port_collapses() {
        let addr = DeviceAddress::parse("10.0.0.5:80").unwrap();
        assert_eq!(addr.to_string(), "10.0.0.5");
    }

    #[test]
    fn empty_address_is_rejected() {
        assert!(matches!(
            DeviceAddress::parse("   "),
            Err(Error::InvalidAddress { .. })
        ));
    }

    #[test]
    fn foreign_scheme_is_rejected() {
        assert!(matches!(
            DeviceAddress::parse("ftp://10.0.0.1"),
            Err(Error::InvalidAddress { .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(DeviceAddress::parse("http://").is_err());
        assert!(DeviceAddress::parse("not a host at all").is_err());
    }
}
