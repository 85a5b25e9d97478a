//! Entry routing for scanned tags.
//!
//! A scan lands on `/pet/<code>`. The lost-status check runs before any
//! login prompt: a lost pet forks the visitor into finder vs. owner,
//! everything else goes straight to login. Nothing is appended to the
//! scan log here; that only happens when a finder chooses to report.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{OwnerStore, PetStore, TagStore};
use crate::types::{PublicPetView, TagStatus};

static PET_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/pet/([A-Za-z0-9]+)").expect("static pattern"));

/// Extracts the tag code from a `/pet/<code>` path. Codes are
/// alphanumeric; anything else is not an entry path.
pub fn parse_pet_path(path: &str) -> Option<&str> {
    PET_PATH
        .captures(path)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Which pre-login message the visitor should see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginPrompt {
    /// Fresh tag, packaged PIN starts the claim.
    NewTag,
    /// Claimed tag, PIN opens the owner panel.
    RegisteredTag,
    /// Code not in the registry at all.
    UnknownTag,
}

/// The fork computed for a scanned code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDecision {
    /// The pet is broadcasting lost. The caller asks the visitor whether
    /// they are the finder or the owner; the view carries only
    /// public-marked fields.
    Lost { pet: PublicPetView },
    Login { prompt: LoginPrompt },
}

pub struct EntryRouter {
    tags: Arc<dyn TagStore>,
    owners: Arc<dyn OwnerStore>,
    pets: Arc<dyn PetStore>,
}

impl EntryRouter {
    pub fn new(
        tags: Arc<dyn TagStore>,
        owners: Arc<dyn OwnerStore>,
        pets: Arc<dyn PetStore>,
    ) -> Self {
        EntryRouter { tags, owners, pets }
    }

    pub async fn entry_decision(&self, code: &str) -> Result<EntryDecision> {
        if let Some(pet) = self.pets.get(code).await? {
            if pet.lost.is_active() {
                let owner = self.owners.get(code).await?;
                return Ok(EntryDecision::Lost {
                    pet: PublicPetView::project(&pet, owner.as_ref()),
                });
            }
        }

        let prompt = match self.tags.get(code).await? {
            Some(tag) => match tag.status {
                TagStatus::Empty => LoginPrompt::NewTag,
                TagStatus::Claimed => LoginPrompt::RegisteredTag,
            },
            None => LoginPrompt::UnknownTag,
        };

        Ok(EntryDecision::Login { prompt })
    }
}
