#![allow(clippy::unwrap_used)]
// Integration tests for `InfoClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lumen_api::{DeviceAddress, Error, InfoClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, InfoClient, DeviceAddress) {
    let server = MockServer::start().await;
    let address = DeviceAddress::parse(&server.address().to_string()).unwrap();
    let client = InfoClient::new(&TransportConfig::default().with_timeout(Duration::from_millis(500)))
        .unwrap();
    (server, client, address)
}

// ── Success ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_info() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/json/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ver": "0.14.4",
            "name": "Desk Strip",
            "mac": "a8032a1b2c3d",
            "arch": "esp8266",
            "leds": { "count": 30 },
            "wifi": { "signal": 64 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = client.get_info(&address).await.unwrap();

    assert_eq!(info.mac, "a8032a1b2c3d");
    assert_eq!(info.name, "Desk Strip");
    assert_eq!(info.version, "0.14.4");
    assert_eq!(info.arch, "esp8266");
    assert_eq!(info.leds.count, 30);
}

#[tokio::test]
async fn test_get_info_without_mac_still_decodes() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/json/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Mystery" })))
        .mount(&server)
        .await;

    let info = client.get_info(&address).await.unwrap();
    assert!(info.mac.is_empty());
    assert_eq!(info.name, "Mystery");
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_error_status() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = client.get_info(&address).await;
    assert!(
        matches!(result, Err(Error::Http { status: 503 })),
        "expected Http error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_non_json_body() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/json/info"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captive portal</html>"))
        .mount(&server)
        .await;

    let result = client.get_info(&address).await;
    match result {
        Err(Error::Deserialization { ref body, .. }) => {
            assert!(body.contains("captive portal"));
        }
        other => panic!("expected Deserialization error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_device_times_out() {
    let (server, client, address) = setup().await;

    Mock::given(method("GET"))
        .and(path("/json/info"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "mac": "a8032a1b2c3d" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let result = client.get_info(&address).await;
    let err = result.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got: {err:?}");
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind and immediately drop a listener to obtain a port nobody serves.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = InfoClient::new(&TransportConfig::default()).unwrap();
    let address = DeviceAddress::parse(&addr.to_string()).unwrap();

    let err = client.get_info(&address).await.unwrap_err();
    assert!(err.is_transient(), "expected transient error, got: {err:?}");
}
