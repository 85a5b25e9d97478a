//! Production resolver adapters.
//!
//! The device fix, if any, already happened on the scanning client; the
//! daemon replays it into the resolver. The IP stage is an HTTP call to
//! an ipwho.is-style endpoint, one attempt per scan, bounded by the
//! resolver's budget on top of the client-side timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use pawlink_core::{DeviceFix, DeviceGeolocation, FixResult, IpGeolocationService, IpLookup};

/// Replays a request-supplied fix. No fix in the request means the
/// finder declined or the device could not produce one.
pub struct ProvidedFix {
    fix: Option<DeviceFix>,
}

impl ProvidedFix {
    pub fn new(fix: Option<DeviceFix>) -> Self {
        ProvidedFix { fix }
    }
}

#[async_trait]
impl DeviceGeolocation for ProvidedFix {
    async fn get_fix(&self, _budget: Duration) -> FixResult {
        match self.fix {
            Some(fix) => FixResult::Fix(fix),
            None => FixResult::Denied,
        }
    }
}

/// Shape of an ipwho.is response. `success: false` still usually carries
/// the caller's IP, which is worth keeping.
#[derive(Debug, Deserialize)]
struct IpwhoResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

pub struct IpwhoClient {
    http: reqwest::Client,
    endpoint: String,
    /// IP to look up. `None` asks the service about the requester, which
    /// from the daemon host is only a last resort.
    target_ip: Option<String>,
}

impl IpwhoClient {
    pub fn new(endpoint: &str, target_ip: Option<String>) -> Self {
        IpwhoClient {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            target_ip,
        }
    }

    fn url(&self) -> String {
        match &self.target_ip {
            Some(ip) => format!("{}/{}", self.endpoint, ip),
            None => format!("{}/", self.endpoint),
        }
    }
}

#[async_trait]
impl IpGeolocationService for IpwhoClient {
    async fn lookup(&self, budget: Duration) -> Option<IpLookup> {
        let response = match self.http.get(self.url()).timeout(budget).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "IP lookup request failed");
                return None;
            }
        };

        let body: IpwhoResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                debug!(error = %err, "IP lookup response did not parse");
                return None;
            }
        };

        // Rate-limited or failed lookups still surface the IP when the
        // service echoed one.
        if !body.success {
            return Some(IpLookup {
                ip: body.ip,
                ..IpLookup::default()
            });
        }

        Some(IpLookup {
            ip: body.ip,
            lat: body.latitude,
            lng: body.longitude,
            city: body.city,
            country: body.country,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_provided_fix_replays_the_request() {
        let provided = ProvidedFix::new(Some(DeviceFix {
            lat: 41.0,
            lng: 29.0,
            accuracy_m: 10.0,
        }));
        match provided.get_fix(Duration::from_secs(4)).await {
            FixResult::Fix(fix) => assert_eq!(fix.lat, 41.0),
            other => panic!("expected a fix, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_fix_is_denied() {
        let provided = ProvidedFix::new(None);
        assert_eq!(
            provided.get_fix(Duration::from_secs(4)).await,
            FixResult::Denied
        );
    }

    #[test]
    fn test_lookup_url_targets_the_scanner_ip() {
        let client = IpwhoClient::new("https://ipwho.is/", Some("203.0.113.7".to_string()));
        assert_eq!(client.url(), "https://ipwho.is/203.0.113.7");

        let fallback = IpwhoClient::new("https://ipwho.is", None);
        assert_eq!(fallback.url(), "https://ipwho.is/");
    }

    #[test]
    fn test_failed_lookup_body_keeps_the_ip() {
        let raw = r#"{"success": false, "ip": "203.0.113.7", "message": "rate limited"}"#;
        let body: IpwhoResponse = serde_json::from_str(raw).unwrap();
        assert!(!body.success);
        assert_eq!(body.ip.as_deref(), Some("203.0.113.7"));
    }
}
