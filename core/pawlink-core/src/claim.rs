//! Claim and authentication protocol.
//!
//! A tag code plus its packaged PIN is the whole credential. The first
//! successful claim binds the tag to an owner account; every later login
//! with the same pair is a returning owner. The `Empty -> Claimed` flip
//! is arbitrated by a compare-and-set at the store, which is the only
//! cross-client race in the system.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::session::OwnerSession;
use crate::store::{OwnerStore, PetStore, TagStore};
use crate::types::{OwnerProfile, PetRecord, TagStatus};

/// What `claim_or_authenticate` decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// First claim of this tag. The owner profile is a transient
    /// skeleton; nothing is persisted until `complete_claim`.
    NewClaim { owner: OwnerProfile },
    /// Known tag, known owner, PIN verified.
    ReturningOwner { session: OwnerSession },
}

/// Owns every mutation of tag records and the owner-side writes that
/// hang off them.
pub struct ClaimCoordinator {
    tags: Arc<dyn TagStore>,
    owners: Arc<dyn OwnerStore>,
    pets: Arc<dyn PetStore>,
}

impl ClaimCoordinator {
    pub fn new(
        tags: Arc<dyn TagStore>,
        owners: Arc<dyn OwnerStore>,
        pets: Arc<dyn PetStore>,
    ) -> Self {
        ClaimCoordinator { tags, owners, pets }
    }

    /// Decides between first claim and returning login for a code/PIN
    /// pair.
    ///
    /// The PIN check happens before any status branching, so a wrong PIN
    /// answers identically for empty and claimed tags. A claimed tag
    /// with no owner record behind it is rolled back to empty and
    /// re-enters the first-claim path instead of locking up.
    pub async fn claim_or_authenticate(&self, code: &str, pin: &str) -> Result<ClaimOutcome> {
        let tag = self
            .tags
            .get(code)
            .await?
            .ok_or_else(|| CoreError::InvalidCode(code.to_string()))?;

        if tag.secret.trim() != pin.trim() {
            return Err(CoreError::InvalidPin {
                code: code.to_string(),
            });
        }

        if tag.status == TagStatus::Empty {
            return Ok(ClaimOutcome::NewClaim {
                owner: OwnerProfile::skeleton(code, pin.trim()),
            });
        }

        match self.owners.get(code).await? {
            Some(mut owner) => {
                // Legacy rows may predate the secret column; the tag PIN
                // is authoritative for them.
                if owner.secret.trim().is_empty() {
                    owner.secret = tag.secret.clone();
                }
                Ok(ClaimOutcome::ReturningOwner {
                    session: OwnerSession::new(owner),
                })
            }
            None => {
                warn!(code, "Claimed tag has no owner record; rolling back to empty");
                self.tags.reset_to_empty(code).await?;
                Ok(ClaimOutcome::NewClaim {
                    owner: OwnerProfile::skeleton(code, pin.trim()),
                })
            }
        }
    }

    /// Persists a first claim: flips the tag via compare-and-set, then
    /// writes the owner profile.
    ///
    /// Exactly one of N concurrent calls for the same code wins the CAS;
    /// losers get `AlreadyClaimed` and re-enter as returning owners. If
    /// the profile write fails after a won CAS, the tag is left claimed
    /// without an owner, which the rollback in
    /// [`claim_or_authenticate`] repairs on the next attempt.
    pub async fn complete_claim(&self, owner: OwnerProfile) -> Result<OwnerSession> {
        let code = owner.username.clone();

        if !self.tags.try_set_claimed(&code).await? {
            return Err(CoreError::AlreadyClaimed(code));
        }

        self.owners.upsert(&owner).await?;
        info!(code = %code, "Tag claimed");
        Ok(OwnerSession::new(owner))
    }

    /// Owner profile update, including PIN rotation: when the stored tag
    /// secret differs from the profile's, the tag follows the profile.
    pub async fn update_owner(&self, session: &OwnerSession, owner: OwnerProfile) -> Result<OwnerSession> {
        let code = session.code();
        let mut owner = owner;
        owner.username = code.to_string();

        self.owners.upsert(&owner).await?;

        if let Some(tag) = self.tags.get(code).await? {
            if tag.secret.trim() != owner.secret.trim() {
                self.tags.set_secret(code, owner.secret.trim()).await?;
                info!(code, "Tag PIN rotated");
            }
        }

        Ok(OwnerSession::new(owner))
    }

    /// Owner-side pet record write. If the owner row does not exist yet
    /// (pet saved straight after a first claim), the claim is completed
    /// first; the CAS still arbitrates.
    pub async fn save_pet(&self, session: &OwnerSession, pet: PetRecord) -> Result<PetRecord> {
        let mut pet = pet;
        pet.code = session.code().to_string();

        if self.owners.get(session.code()).await?.is_none() {
            self.complete_claim(session.owner.clone()).await?;
        }

        self.pets.upsert(&pet).await?;
        Ok(pet)
    }
}
