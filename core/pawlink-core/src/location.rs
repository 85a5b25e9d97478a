//! Best-effort location resolution for scan events.
//!
//! Two stages, each hard-deadlined: an on-device GPS fix first, then an
//! IP-based lookup as fallback. Absence of location is a valid outcome,
//! never an error. The resolver enforces its own deadlines with
//! `tokio::time::timeout` even when a collaborator honors the hint it
//! was handed, so no call can outlive its budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::types::{Location, LocationSource};

/// Accuracy stamped on IP-derived fixes. City-level at best.
pub const IP_ACCURACY_M: f64 = 5_000.0;

/// Floor for IP-derived accuracy; anything tighter is not believable
/// from an IP lookup.
const IP_ACCURACY_FLOOR_M: f64 = 1_000.0;

/// A device-reported fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceFix {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: f64,
}

/// Outcome of a device geolocation attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixResult {
    Fix(DeviceFix),
    /// The user refused, or the device has no geolocation capability.
    Denied,
    Timeout,
}

/// On-device geolocation, high-accuracy mode implied.
#[async_trait]
pub trait DeviceGeolocation: Send + Sync {
    async fn get_fix(&self, budget: Duration) -> FixResult;
}

/// What an IP geolocation lookup produced. The IP itself is best-effort
/// and independent of whether coordinates parsed; a lookup that only
/// yields the IP is a partial success, not a failure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IpLookup {
    pub ip: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// External IP geolocation collaborator. One attempt per scan, no
/// retry or backoff; `None` means the call failed outright.
#[async_trait]
pub trait IpGeolocationService: Send + Sync {
    async fn lookup(&self, budget: Duration) -> Option<IpLookup>;
}

/// What a resolve pass produced. `client_ip` is populated from the IP
/// stage when that stage ran, regardless of whether coordinates came
/// back with it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Resolution {
    pub location: Option<Location>,
    pub client_ip: Option<String>,
}

pub struct LocationResolver {
    device: Arc<dyn DeviceGeolocation>,
    ip: Arc<dyn IpGeolocationService>,
    config: ResolverConfig,
}

impl LocationResolver {
    pub fn new(
        device: Arc<dyn DeviceGeolocation>,
        ip: Arc<dyn IpGeolocationService>,
        config: ResolverConfig,
    ) -> Self {
        LocationResolver { device, ip, config }
    }

    /// Resolves a best-effort location within `gps_timeout + ip_timeout`.
    ///
    /// GPS is strictly preferred; the IP stage never runs once a device
    /// fix succeeded. Deadline expiry on either stage is a fallback
    /// trigger, not an error.
    pub async fn resolve(&self) -> Resolution {
        let gps_budget = self.config.gps_timeout();
        match timeout(gps_budget, self.device.get_fix(gps_budget)).await {
            Ok(FixResult::Fix(fix)) => {
                debug!(accuracy_m = fix.accuracy_m, "Device fix obtained");
                return Resolution {
                    location: Some(Location {
                        lat: fix.lat,
                        lng: fix.lng,
                        accuracy_m: fix.accuracy_m,
                        source: LocationSource::Gps,
                        city: None,
                        country: None,
                    }),
                    client_ip: None,
                };
            }
            Ok(FixResult::Denied) => debug!("Device geolocation denied or unavailable"),
            Ok(FixResult::Timeout) => debug!("Device geolocation reported timeout"),
            Err(_) => debug!("Device geolocation deadline expired"),
        }

        let ip_budget = self.config.ip_timeout();
        let lookup = match timeout(ip_budget, self.ip.lookup(ip_budget)).await {
            Ok(Some(lookup)) => lookup,
            Ok(None) => {
                debug!("IP lookup failed");
                return Resolution::default();
            }
            Err(_) => {
                debug!("IP lookup deadline expired");
                return Resolution::default();
            }
        };

        let location = match (lookup.lat, lookup.lng) {
            (Some(lat), Some(lng)) => Some(Location {
                lat,
                lng,
                accuracy_m: IP_ACCURACY_M.max(IP_ACCURACY_FLOOR_M),
                source: LocationSource::Ip,
                city: lookup.city,
                country: lookup.country,
            }),
            _ => None,
        };

        Resolution {
            location,
            client_ip: lookup.ip,
        }
    }
}
