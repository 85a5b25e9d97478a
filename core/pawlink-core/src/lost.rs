//! Lost/safe state machine.
//!
//! Activation is cheap by design: an authenticated owner in a panic
//! should not face another password prompt, only the consent
//! acknowledgement for broadcasting their data. Deactivation is the
//! guarded direction; it re-proves the login PIN so a stranger with an
//! unlocked phone cannot silence the alarm.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{CoreError, Result};
use crate::session::OwnerSession;
use crate::store::PetStore;
use crate::types::{GeoPoint, LostState, LostStatus, PetRecord};

/// Caller input for `Safe -> Active`.
#[derive(Debug, Clone, Default)]
pub struct ActivationRequest {
    /// Explicit acknowledgement that the lost broadcast shares location,
    /// contact, and pet data publicly. Required.
    pub consent: bool,
    pub location: Option<GeoPoint>,
    pub message: Option<String>,
}

/// Maps the current broadcast state plus an activation request to the
/// next state. Re-activation keeps the first activation timestamp.
fn apply_activation(
    current: &LostStatus,
    now: DateTime<Utc>,
    request: &ActivationRequest,
) -> LostStatus {
    LostStatus {
        state: LostState::Active,
        activated_at: current.activated_at.or(Some(now)),
        last_seen: request.location,
        message: request
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string),
    }
}

/// Sole mutator of a pet's `LostStatus`.
pub struct LostStateMachine {
    pets: Arc<dyn PetStore>,
}

impl LostStateMachine {
    pub fn new(pets: Arc<dyn PetStore>) -> Self {
        LostStateMachine { pets }
    }

    async fn load(&self, code: &str) -> Result<PetRecord> {
        self.pets
            .get(code)
            .await?
            .ok_or_else(|| CoreError::InvalidCode(code.to_string()))
    }

    /// `Safe -> Active`. Refused without the consent flag. Activating an
    /// already-active record updates message and location but preserves
    /// the original `activated_at`.
    pub async fn activate(
        &self,
        session: &OwnerSession,
        request: ActivationRequest,
    ) -> Result<PetRecord> {
        if !request.consent {
            return Err(CoreError::ConsentRequired);
        }

        let mut pet = self.load(session.code()).await?;
        let reactivation = pet.lost.is_active();
        pet.lost = apply_activation(&pet.lost, Utc::now(), &request);
        self.pets.upsert(&pet).await?;

        info!(
            code = session.code(),
            reactivation,
            has_location = pet.lost.last_seen.is_some(),
            "Lost mode activated"
        );
        Ok(pet)
    }

    /// `Active -> Safe`, guarded by re-proof of the login PIN.
    ///
    /// On PIN mismatch nothing changes and `AuthFailed` is returned. On
    /// success the timestamp, location, and message are cleared in the
    /// same write as the state flip. Deactivating an already-safe record
    /// is a no-op and short-circuits before the PIN check.
    pub async fn deactivate(&self, session: &OwnerSession, pin: &str) -> Result<PetRecord> {
        let mut pet = self.load(session.code()).await?;

        if !pet.lost.is_active() {
            return Ok(pet);
        }

        if session.owner.secret.trim() != pin.trim() {
            return Err(CoreError::AuthFailed {
                code: session.code().to_string(),
            });
        }

        pet.lost = LostStatus::default();
        self.pets.upsert(&pet).await?;

        info!(code = session.code(), "Lost mode deactivated");
        Ok(pet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{OwnerProfile, Visible};

    fn session() -> OwnerSession {
        OwnerSession::new(OwnerProfile::skeleton("S1A2B3", "482913"))
    }

    async fn machine_with_pet() -> (Arc<MemoryStore>, LostStateMachine) {
        let store = Arc::new(MemoryStore::new());
        let pet = PetRecord::new("S1A2B3", Visible::public("Pamuk".into()), "cat");
        PetStore::upsert(store.as_ref(), &pet).await.unwrap();
        let machine = LostStateMachine::new(store.clone());
        (store, machine)
    }

    fn activation(location: Option<GeoPoint>, message: &str) -> ActivationRequest {
        ActivationRequest {
            consent: true,
            location,
            message: Some(message.to_string()),
        }
    }

    #[tokio::test]
    async fn test_activation_without_consent_is_refused() {
        let (store, machine) = machine_with_pet().await;

        let err = machine
            .activate(&session(), ActivationRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "consent_required");

        let pet = PetStore::get(store.as_ref(), "S1A2B3").await.unwrap().unwrap();
        assert_eq!(pet.lost.state, LostState::Safe);
    }

    #[tokio::test]
    async fn test_activation_records_timestamp_location_message() {
        let (_store, machine) = machine_with_pet().await;

        let pet = machine
            .activate(
                &session(),
                activation(Some(GeoPoint { lat: 41.0, lng: 29.0 }), "answers to Pamuk"),
            )
            .await
            .unwrap();

        assert_eq!(pet.lost.state, LostState::Active);
        assert!(pet.lost.activated_at.is_some());
        assert_eq!(pet.lost.last_seen, Some(GeoPoint { lat: 41.0, lng: 29.0 }));
        assert_eq!(pet.lost.message.as_deref(), Some("answers to Pamuk"));
    }

    #[tokio::test]
    async fn test_reactivation_preserves_first_activated_at() {
        let (_store, machine) = machine_with_pet().await;

        let first = machine
            .activate(&session(), activation(None, "first message"))
            .await
            .unwrap();
        let first_at = first.lost.activated_at.unwrap();

        let second = machine
            .activate(&session(), activation(None, "updated message"))
            .await
            .unwrap();

        assert_eq!(second.lost.activated_at, Some(first_at));
        assert_eq!(second.lost.message.as_deref(), Some("updated message"));
    }

    #[tokio::test]
    async fn test_wrong_pin_leaves_active_state_untouched() {
        let (store, machine) = machine_with_pet().await;
        machine
            .activate(
                &session(),
                activation(Some(GeoPoint { lat: 41.0, lng: 29.0 }), "lost near the park"),
            )
            .await
            .unwrap();

        let err = machine.deactivate(&session(), "000000").await.unwrap_err();
        assert_eq!(err.code(), "auth_failed");

        let pet = PetStore::get(store.as_ref(), "S1A2B3").await.unwrap().unwrap();
        assert_eq!(pet.lost.state, LostState::Active);
        assert_eq!(pet.lost.last_seen, Some(GeoPoint { lat: 41.0, lng: 29.0 }));
    }

    #[tokio::test]
    async fn test_deactivation_clears_everything_with_the_flip() {
        let (store, machine) = machine_with_pet().await;
        machine
            .activate(
                &session(),
                activation(Some(GeoPoint { lat: 41.0, lng: 29.0 }), "lost near the park"),
            )
            .await
            .unwrap();

        let pet = machine.deactivate(&session(), "482913").await.unwrap();
        assert_eq!(pet.lost, LostStatus::default());

        let stored = PetStore::get(store.as_ref(), "S1A2B3").await.unwrap().unwrap();
        assert_eq!(stored.lost, LostStatus::default());
    }

    #[tokio::test]
    async fn test_deactivating_safe_record_is_a_noop() {
        let (_store, machine) = machine_with_pet().await;

        // Short-circuits before the PIN check; a wrong PIN is irrelevant
        // when there is nothing to deactivate.
        let pet = machine.deactivate(&session(), "000000").await.unwrap();
        assert_eq!(pet.lost.state, LostState::Safe);
    }

    #[tokio::test]
    async fn test_pin_comparison_trims_whitespace() {
        let (_store, machine) = machine_with_pet().await;
        machine
            .activate(&session(), activation(None, "m"))
            .await
            .unwrap();

        let pet = machine.deactivate(&session(), " 482913 ").await.unwrap();
        assert_eq!(pet.lost.state, LostState::Safe);
    }

    #[tokio::test]
    async fn test_activation_without_pet_record_fails() {
        let store = Arc::new(MemoryStore::new());
        let machine = LostStateMachine::new(store);

        let err = machine
            .activate(&session(), activation(None, "m"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_code");
    }

    #[tokio::test]
    async fn test_empty_message_normalizes_to_none() {
        let (_store, machine) = machine_with_pet().await;

        let pet = machine
            .activate(&session(), activation(None, "   "))
            .await
            .unwrap();
        assert!(pet.lost.message.is_none());
    }
}
