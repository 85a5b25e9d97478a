//! Scan recording and the owner-side alert feed.
//!
//! A finder's scan is acknowledged no matter what: location resolution
//! may come up empty and the log append may fail, and neither is allowed
//! to surface as an error to the person standing next to the pet.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use ulid::Ulid;

use crate::error::Result;
use crate::location::LocationResolver;
use crate::session::OwnerSession;
use crate::store::ScanLogStore;
use crate::types::{DeviceMeta, LocationSource, ScanEvent};

/// How many scans the owner alert feed shows by default.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Builds one scan event per finder report and appends it to the log.
pub struct ScanRecorder {
    resolver: LocationResolver,
    log: Arc<dyn ScanLogStore>,
}

impl ScanRecorder {
    pub fn new(resolver: LocationResolver, log: Arc<dyn ScanLogStore>) -> Self {
        ScanRecorder { resolver, log }
    }

    /// Records a scan of `tag_code` with whatever location arrived
    /// within the resolver's budget.
    ///
    /// Returns the appended event's id, or `None` when the log append
    /// failed; the failure is logged and swallowed. An event with no
    /// location and no consent is a perfectly good scan record.
    pub async fn record_scan(&self, tag_code: &str, device: DeviceMeta) -> Option<String> {
        let resolution = self.resolver.resolve().await;

        let consent_given = matches!(
            resolution.location.as_ref().map(|l| l.source),
            Some(LocationSource::Gps)
        );
        let ip_address = device.remote_ip.clone().or(resolution.client_ip);

        let event = ScanEvent {
            id: Ulid::new().to_string(),
            tag_code: tag_code.to_string(),
            timestamp: Utc::now(),
            ip_address,
            device,
            location: resolution.location,
            consent_given,
        };

        match self.log.append(&event).await {
            Ok(id) => {
                info!(
                    tag_code,
                    event_id = %id,
                    has_location = event.location.is_some(),
                    consent_given,
                    "Scan recorded"
                );
                Some(id)
            }
            Err(err) => {
                warn!(tag_code, error = %err, "Scan log append failed; scan acknowledged anyway");
                None
            }
        }
    }
}

/// Newest-first read of an owner's own scan feed.
///
/// Taking the session is what scopes the read: there is no way to ask
/// for another account's scans. Whether a non-empty feed becomes an
/// alert is presentation's call.
pub struct ScanAlertAggregator {
    log: Arc<dyn ScanLogStore>,
}

impl ScanAlertAggregator {
    pub fn new(log: Arc<dyn ScanLogStore>) -> Self {
        ScanAlertAggregator { log }
    }

    pub async fn recent_scans(
        &self,
        session: &OwnerSession,
        limit: Option<usize>,
    ) -> Result<Vec<ScanEvent>> {
        self.log
            .list_recent(session.code(), limit.unwrap_or(DEFAULT_RECENT_LIMIT))
            .await
    }
}
