// One-shot identification client
//
// `GET /json/info` is the only HTTP call in the connectivity subsystem.
// It is used to learn a device's hardware identity before anything is
// written to the registry. No retries and no caching happen here; the
// caller decides what a failure means.

use tracing::debug;

use crate::address::DeviceAddress;
use crate::error::Error;
use crate::models::DeviceInfo;
use crate::transport::TransportConfig;

/// HTTP client for the device identification endpoint.
pub struct InfoClient {
    http: reqwest::Client,
    timeout_secs: u64,
}

impl InfoClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            timeout_secs: transport.timeout.as_secs(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout_secs: crate::transport::DEFAULT_IDENTIFY_TIMEOUT.as_secs(),
        }
    }

    /// Fetch the `info` object from a device.
    ///
    /// `GET {scheme}://{address}/json/info`
    pub async fn get_info(&self, address: &DeviceAddress) -> Result<DeviceInfo, Error> {
        let url = address.info_url();
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                Error::Transport(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }
}
