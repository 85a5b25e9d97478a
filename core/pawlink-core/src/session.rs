//! The explicit per-login context object.
//!
//! There is no ambient "current user"; every owner-side operation takes
//! an `OwnerSession` produced by the claim coordinator. Persisting a
//! session across client reloads is the embedder's concern.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scan::ScanAlertAggregator;
use crate::store::PetStore;
use crate::types::{OwnerProfile, PetRecord, ScanEvent};

/// Proof of a completed claim or login. Holds the authenticated owner
/// profile; the tag code doubles as the account key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSession {
    pub owner: OwnerProfile,
}

impl OwnerSession {
    pub fn new(owner: OwnerProfile) -> Self {
        OwnerSession { owner }
    }

    pub fn code(&self) -> &str {
        &self.owner.username
    }
}

/// Everything a client needs after login or session resume: the profile,
/// the pet record if one was saved, and the recent-scan alert feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub owner: OwnerProfile,
    pub pet: Option<PetRecord>,
    pub recent_scans: Vec<ScanEvent>,
}

/// Builds the resume snapshot for an authenticated owner.
///
/// A failing scan-log read degrades to an empty feed rather than failing
/// the resume; the pet read still surfaces store errors because the
/// owner view is unusable without it.
pub async fn resume(
    session: &OwnerSession,
    pets: &dyn PetStore,
    alerts: &ScanAlertAggregator,
) -> Result<SessionSnapshot> {
    let pet = pets.get(session.code()).await?;

    let recent_scans = match alerts.recent_scans(session, None).await {
        Ok(events) => events,
        Err(err) => {
            tracing::warn!(code = session.code(), error = %err, "Scan feed unavailable on resume");
            Vec::new()
        }
    };

    Ok(SessionSnapshot {
        owner: session.owner.clone(),
        pet,
        recent_scans,
    })
}
