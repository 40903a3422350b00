// ── Identity resolution ──
//
// Turns a network address into a registry record keyed by hardware
// identity. Manual entry and discovery both funnel through here; nothing
// else creates registry records.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use lumen_api::{DeviceAddress, InfoClient, TransportConfig};

use crate::config::LinkConfig;
use crate::discovery::Sighting;
use crate::error::CoreError;
use crate::model::{Device, HardwareId};
use crate::store::DeviceRegistry;

pub struct IdentityResolver {
    registry: Arc<DeviceRegistry>,
    client: InfoClient,
}

impl IdentityResolver {
    pub fn new(registry: Arc<DeviceRegistry>, config: &LinkConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig::default().with_timeout(config.identify_timeout);
        let client = InfoClient::new(&transport)?;
        Ok(Self::with_client(registry, client))
    }

    pub fn with_client(registry: Arc<DeviceRegistry>, client: InfoClient) -> Self {
        Self { registry, client }
    }

    /// Identify the device at `address` and record it.
    ///
    /// Performs one identification request. On success the registry is
    /// left untouched if the stored address and reported name already
    /// match, updated in place if they differ, and a new visible record
    /// is created otherwise.
    pub async fn resolve(&self, address: &str) -> Result<(HardwareId, Device), CoreError> {
        let endpoint = DeviceAddress::parse(address).map_err(|e| CoreError::InvalidAddress {
            address: address.to_owned(),
            reason: e.to_string(),
        })?;
        let stored_address = endpoint.to_string();

        let info = self
            .client
            .get_info(&endpoint)
            .await
            .map_err(|e| CoreError::Unreachable {
                address: stored_address.clone(),
                reason: e.to_string(),
            })?;

        let identity = HardwareId::new(&info.mac);
        if identity.is_empty() {
            return Err(CoreError::NoIdentity {
                address: stored_address,
            });
        }
        let reported_name = Some(info.name.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_owned);

        let _guard = self.registry.lock_identity(&identity).await;

        let device = match self.registry.find(&identity) {
            // A blank reported name never clears the stored one.
            Some(existing)
                if existing.address == stored_address
                    && (reported_name.is_none() || existing.reported_name == reported_name) =>
            {
                debug!(identity = %identity, address = %stored_address, "Device already up to date");
                existing
            }
            Some(existing) => {
                info!(
                    identity = %identity,
                    from = %existing.address,
                    to = %stored_address,
                    "Updating known device"
                );
                self.registry
                    .update(&identity, |d| {
                        d.address = stored_address;
                        if reported_name.is_some() {
                            d.reported_name = reported_name;
                        }
                        d.last_seen_at = Some(Utc::now());
                    })
                    .ok_or_else(|| CoreError::DeviceNotFound {
                        identifier: identity.to_string(),
                    })?
            }
            None => {
                info!(identity = %identity, address = %stored_address, "Adding new device");
                let mut device = Device::new(identity.clone(), stored_address);
                device.reported_name = reported_name;
                device.last_seen_at = Some(Utc::now());
                self.registry.upsert(device)?
            }
        };

        Ok((identity, device))
    }

    /// Move a known device to `address` without contacting it.
    ///
    /// Returns `false` when no record exists for `identity` (or `address`
    /// cannot be normalized), in which case the caller should `resolve`.
    pub async fn fast_path_update(&self, identity: &HardwareId, address: &str) -> bool {
        let Ok(endpoint) = DeviceAddress::parse(address) else {
            return false;
        };
        let stored_address = endpoint.to_string();

        let _guard = self.registry.lock_identity(identity).await;
        let Some(existing) = self.registry.find(identity) else {
            return false;
        };
        if existing.address != stored_address {
            info!(
                identity = %identity,
                from = %existing.address,
                to = %stored_address,
                "Known device moved"
            );
            self.registry.update(identity, |d| d.address = stored_address);
        }
        true
    }

    /// Fold a discovery sighting into the registry.
    ///
    /// A sighting whose identity hint matches a known record takes the
    /// fast path; anything else is resolved over the network.
    pub async fn handle_sighting(&self, sighting: &Sighting) -> Result<Device, CoreError> {
        if let Some(hint) = &sighting.identity_hint {
            if self.fast_path_update(hint, &sighting.address).await {
                return self.registry.find(hint).ok_or_else(|| CoreError::DeviceNotFound {
                    identifier: hint.to_string(),
                });
            }
        }
        let (_, device) = self.resolve(&sighting.address).await?;
        Ok(device)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(registry: &Arc<DeviceRegistry>) -> IdentityResolver {
        let transport = TransportConfig::default().with_timeout(Duration::from_millis(500));
        IdentityResolver::with_client(Arc::clone(registry), InfoClient::new(&transport).unwrap())
    }

    async fn device_server(mac: &str, name: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "mac": mac,
                "name": name,
                "ver": "0.14.4",
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn resolve_creates_visible_record() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let server = device_server("A8:03:2A:1B:2C:3D", "Desk").await;
        let address = server.address().to_string();

        let (identity, device) = resolver(&registry).resolve(&address).await.unwrap();

        assert_eq!(identity.as_str(), "a8032a1b2c3d");
        assert_eq!(device.address, address);
        assert_eq!(device.display_name(), "Desk");
        assert!(!device.hidden);
        assert!(device.last_seen_at.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn resolve_unchanged_is_a_no_op() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let server = device_server("a8032a1b2c3d", "Desk").await;
        let address = server.address().to_string();
        let resolver = resolver(&registry);

        resolver.resolve(&address).await.unwrap();
        let changes = registry.changes();
        resolver.resolve(&address).await.unwrap();

        assert!(!changes.has_changed());
    }

    #[tokio::test]
    async fn resolve_updates_moved_device_in_place() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let mut known = Device::new(HardwareId::new("a8032a1b2c3d"), "10.9.9.9");
        known.custom_name = Some("Porch".into());
        registry.upsert(known).unwrap();

        let server = device_server("a8032a1b2c3d", "WLED").await;
        let address = server.address().to_string();
        let (_, device) = resolver(&registry).resolve(&address).await.unwrap();

        assert_eq!(device.address, address);
        assert_eq!(device.custom_name.as_deref(), Some("Porch"));
        assert_eq!(device.reported_name.as_deref(), Some("WLED"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn blank_name_keeps_stored_reported_name() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let mut known = Device::new(HardwareId::new("a8032a1b2c3d"), "10.9.9.9");
        known.reported_name = Some("Desk".into());
        registry.upsert(known).unwrap();

        let server = device_server("a8032a1b2c3d", "   ").await;
        let address = server.address().to_string();
        let resolver = resolver(&registry);
        let (_, moved) = resolver.resolve(&address).await.unwrap();

        assert_eq!(moved.address, address);
        assert_eq!(moved.reported_name.as_deref(), Some("Desk"));

        // Same address again with a blank name changes nothing.
        let changes = registry.changes();
        let (_, again) = resolver.resolve(&address).await.unwrap();
        assert_eq!(again.reported_name.as_deref(), Some("Desk"));
        assert!(!changes.has_changed());
    }

    #[tokio::test]
    async fn blank_mac_is_no_identity_without_mutation() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let server = device_server("", "Nameless").await;
        let changes = registry.changes();

        let err = resolver(&registry)
            .resolve(&server.address().to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NoIdentity { .. }), "got {err:?}");
        assert!(registry.is_empty());
        assert!(!changes.has_changed());
    }

    #[tokio::test]
    async fn unparsable_address_is_invalid() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let err = resolver(&registry).resolve("  ").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn error_status_is_unreachable() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = resolver(&registry)
            .resolve(&server.address().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unreachable { .. }), "got {err:?}");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn concurrent_resolves_never_duplicate() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let first = device_server("a8032a1b2c3d", "Desk").await;
        let second = device_server("A8-03-2A-1B-2C-3D", "Desk").await;
        let resolver = resolver(&registry);
        let a = first.address().to_string();
        let b = second.address().to_string();

        let (r1, r2, r3) = tokio::join!(
            resolver.resolve(&a),
            resolver.resolve(&b),
            resolver.resolve(&a)
        );

        assert_eq!(r1.unwrap().0, r2.unwrap().0);
        assert!(r3.is_ok());
        assert_eq!(registry.len(), 1);
        let stored = registry.find(&HardwareId::new("a8032a1b2c3d")).unwrap();
        assert!(stored.address == a || stored.address == b);
    }

    #[tokio::test]
    async fn fast_path_never_touches_network() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let identity = HardwareId::new("a8032a1b2c3d");
        registry.upsert(Device::new(identity.clone(), "10.0.0.5")).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let address = server.address().to_string();
        let resolver = resolver(&registry);

        assert!(resolver.fast_path_update(&identity, &address).await);
        assert_eq!(registry.find(&identity).unwrap().address, address);

        let unknown = HardwareId::new("ffffffffffff");
        assert!(!resolver.fast_path_update(&unknown, &address).await);
        assert!(registry.find(&unknown).is_none());

        server.verify().await;
    }

    #[tokio::test]
    async fn sighting_with_known_hint_skips_identification() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let identity = HardwareId::new("a8032a1b2c3d");
        registry.upsert(Device::new(identity.clone(), "10.0.0.5")).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let sighting = Sighting {
            address: server.address().to_string(),
            identity_hint: Some(identity.clone()),
        };
        let device = resolver(&registry).handle_sighting(&sighting).await.unwrap();

        assert_eq!(device.identity, identity);
        assert_eq!(device.address, sighting.address);
        server.verify().await;
    }

    #[tokio::test]
    async fn sighting_with_unknown_hint_falls_back_to_resolve() {
        let registry = Arc::new(DeviceRegistry::in_memory());
        let server = device_server("a8032a1b2c3d", "Desk").await;

        let sighting = Sighting {
            address: server.address().to_string(),
            identity_hint: Some(HardwareId::new("a8032a1b2c3d")),
        };
        let device = resolver(&registry).handle_sighting(&sighting).await.unwrap();

        assert_eq!(device.display_name(), "Desk");
        assert_eq!(registry.len(), 1);
    }
}
