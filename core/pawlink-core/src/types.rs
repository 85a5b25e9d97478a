//! Core types shared across the Pawlink crates.
//!
//! These are the lingua franca of the system: the daemon, its protocol
//! crate, and any embedding client all use these exact types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// Tag Registry Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Claim status of a physical tag.
///
/// A tag moves `Empty -> Claimed` at most once. The reverse transition
/// exists only as a corrective rollback when a claimed tag has no owner
/// record behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    Empty,
    Claimed,
}

/// One physical tag: a printed code, its packaged PIN, and claim status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub code: String,
    pub secret: String,
    pub status: TagStatus,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Owner Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContactPreference {
    Email,
    #[default]
    Phone,
    Both,
}

/// Owner profile, keyed by `username`, which is always the tag code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerProfile {
    pub username: String,
    /// Login PIN. Kept in sync with the tag secret on rotation.
    pub secret: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub contact_preference: ContactPreference,
    #[serde(default)]
    pub emergency_contact_name: Option<String>,
    #[serde(default)]
    pub emergency_contact_email: Option<String>,
    #[serde(default)]
    pub emergency_contact_phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

impl OwnerProfile {
    /// Transient profile handed out on a first claim, before anything is
    /// persisted. Only the identity pair is filled in.
    pub fn skeleton(code: &str, pin: &str) -> Self {
        OwnerProfile {
            username: code.to_string(),
            secret: pin.to_string(),
            full_name: None,
            email: None,
            phone: None,
            contact_preference: ContactPreference::default(),
            emergency_contact_name: None,
            emergency_contact_email: None,
            emergency_contact_phone: None,
            city: None,
            district: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pet Record Types
// ═══════════════════════════════════════════════════════════════════════════════

/// A field the owner can mark public (shown to finders) or private.
///
/// The wrapper is applied uniformly at the model boundary; nothing
/// downstream ever sees a bare value with an ambient visibility bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visible<T> {
    pub value: T,
    pub public: bool,
}

impl<T> Visible<T> {
    pub fn public(value: T) -> Self {
        Visible {
            value,
            public: true,
        }
    }

    pub fn private(value: T) -> Self {
        Visible {
            value,
            public: false,
        }
    }

    /// The value if public, `None` otherwise.
    pub fn shared(&self) -> Option<&T> {
        self.public.then_some(&self.value)
    }
}

/// The pet record behind a claimed tag. One per owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetRecord {
    /// Tag code of the owning account.
    pub code: String,
    pub name: Visible<String>,
    /// Free-form species text ("cat", "dog", anything).
    pub species: String,
    #[serde(default)]
    pub photo_url: Option<Visible<String>>,
    #[serde(default)]
    pub features: Option<Visible<String>>,
    #[serde(default)]
    pub size_info: Option<Visible<String>>,
    #[serde(default)]
    pub temperament: Option<Visible<String>>,
    #[serde(default)]
    pub health_warning: Option<Visible<String>>,
    #[serde(default)]
    pub vet_info: Option<Visible<String>>,
    /// Always owner-private, never projected to finders.
    #[serde(default)]
    pub microchip: Option<String>,
    #[serde(default)]
    pub lost: LostStatus,
}

impl PetRecord {
    pub fn new(code: &str, name: Visible<String>, species: &str) -> Self {
        PetRecord {
            code: code.to_string(),
            name,
            species: species.to_string(),
            photo_url: None,
            features: None,
            size_info: None,
            temperament: None,
            health_warning: None,
            vet_info: None,
            microchip: None,
            lost: LostStatus::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Lost Status Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LostState {
    #[default]
    Safe,
    Active,
}

/// Broadcast state of a pet.
///
/// Invariant: `activated_at`, `last_seen`, and `message` are present only
/// while `state` is `Active`. Deactivation clears them together with the
/// state flip, never piecemeal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LostStatus {
    pub state: LostState,
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<GeoPoint>,
    #[serde(default)]
    pub message: Option<String>,
}

impl LostStatus {
    pub fn is_active(&self) -> bool {
        self.state == LostState::Active
    }
}

/// A bare coordinate pair, as placed on a map by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scan Event Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Gps,
    Ip,
}

/// A resolved fix with its provenance. IP-derived fixes are coarse and
/// carry the city/country strings the lookup returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    /// Estimated accuracy radius in meters.
    pub accuracy_m: f64,
    pub source: LocationSource,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Device metadata supplied by the scanning client. All best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceMeta {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub screen_width: Option<u32>,
    #[serde(default)]
    pub screen_height: Option<u32>,
    /// Client IP as observed by the transport, when it has one.
    #[serde(default)]
    pub remote_ip: Option<String>,
}

/// One immutable record of a tag scan. Append-only; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    /// ULID assigned at append time.
    pub id: String,
    pub tag_code: String,
    /// Server-assigned, not client-supplied.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub device: DeviceMeta,
    #[serde(default)]
    pub location: Option<Location>,
    /// True iff the fix came from the device itself. An IP-derived
    /// location is recorded without consent.
    pub consent_given: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Finder Projection
// ═══════════════════════════════════════════════════════════════════════════════

/// Owner contact details as shown to a finder. Built from the profile's
/// contact preference; emergency contacts ride along when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OwnerContact {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub contact_preference: ContactPreference,
    #[serde(default)]
    pub emergency_contact_name: Option<String>,
    #[serde(default)]
    pub emergency_contact_email: Option<String>,
    #[serde(default)]
    pub emergency_contact_phone: Option<String>,
}

/// The finder-facing view of a lost pet: public-marked fields only, plus
/// the lost broadcast itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicPetView {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    pub species: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub features: Option<String>,
    #[serde(default)]
    pub size_info: Option<String>,
    #[serde(default)]
    pub temperament: Option<String>,
    #[serde(default)]
    pub health_warning: Option<String>,
    #[serde(default)]
    pub vet_info: Option<String>,
    pub lost: LostStatus,
    #[serde(default)]
    pub contact: Option<OwnerContact>,
}

impl PublicPetView {
    /// Projects a pet record down to what a finder may see. The microchip
    /// number is never included.
    pub fn project(pet: &PetRecord, owner: Option<&OwnerProfile>) -> Self {
        fn shared(field: &Option<Visible<String>>) -> Option<String> {
            field.as_ref().and_then(|f| f.shared().cloned())
        }

        let contact = owner.map(|o| {
            let wants_email = matches!(
                o.contact_preference,
                ContactPreference::Email | ContactPreference::Both
            );
            let wants_phone = matches!(
                o.contact_preference,
                ContactPreference::Phone | ContactPreference::Both
            );
            OwnerContact {
                full_name: o.full_name.clone(),
                email: wants_email.then(|| o.email.clone()).flatten(),
                phone: wants_phone.then(|| o.phone.clone()).flatten(),
                contact_preference: o.contact_preference,
                emergency_contact_name: o.emergency_contact_name.clone(),
                emergency_contact_email: o.emergency_contact_email.clone(),
                emergency_contact_phone: o.emergency_contact_phone.clone(),
            }
        });

        PublicPetView {
            code: pet.code.clone(),
            name: pet.name.shared().cloned(),
            species: pet.species.clone(),
            photo_url: shared(&pet.photo_url),
            features: shared(&pet.features),
            size_info: shared(&pet.size_info),
            temperament: shared(&pet.temperament),
            health_warning: shared(&pet.health_warning),
            vet_info: shared(&pet.vet_info),
            lost: pet.lost.clone(),
            contact,
        }
    }
}
