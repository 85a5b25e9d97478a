//! In-memory store, used by tests and by embedders that bring their own
//! persistence. Implements every store contract over one mutex-guarded
//! map set; the claim CAS holds the lock across check and write, which
//! is what makes it a CAS.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CoreError, Result};
use crate::types::{OwnerProfile, PetRecord, ScanEvent, Tag, TagStatus};

#[derive(Default)]
struct Inner {
    tags: HashMap<String, Tag>,
    owners: HashMap<String, OwnerProfile>,
    pets: HashMap<String, PetRecord>,
    scans: Vec<ScanEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Seeds a tag the way a production batch would: code plus packaged
    /// PIN, unclaimed.
    pub fn seed_tag(&self, code: &str, secret: &str) {
        let mut inner = self.lock();
        inner.tags.insert(
            code.to_string(),
            Tag {
                code: code.to_string(),
                secret: secret.to_string(),
                status: TagStatus::Empty,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panicked test thread; propagating the
        // inner state is still sound for these plain maps.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl super::TagStore for MemoryStore {
    async fn get(&self, code: &str) -> Result<Option<Tag>> {
        Ok(self.lock().tags.get(code).cloned())
    }

    async fn try_set_claimed(&self, code: &str) -> Result<bool> {
        let mut inner = self.lock();
        match inner.tags.get_mut(code) {
            Some(tag) if tag.status == TagStatus::Empty => {
                tag.status = TagStatus::Claimed;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::InvalidCode(code.to_string())),
        }
    }

    async fn reset_to_empty(&self, code: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(tag) = inner.tags.get_mut(code) {
            tag.status = TagStatus::Empty;
        }
        Ok(())
    }

    async fn set_secret(&self, code: &str, secret: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(tag) = inner.tags.get_mut(code) {
            tag.secret = secret.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl super::OwnerStore for MemoryStore {
    async fn get(&self, code: &str) -> Result<Option<OwnerProfile>> {
        Ok(self.lock().owners.get(code).cloned())
    }

    async fn upsert(&self, owner: &OwnerProfile) -> Result<()> {
        self.lock()
            .owners
            .insert(owner.username.clone(), owner.clone());
        Ok(())
    }
}

#[async_trait]
impl super::PetStore for MemoryStore {
    async fn get(&self, code: &str) -> Result<Option<PetRecord>> {
        Ok(self.lock().pets.get(code).cloned())
    }

    async fn upsert(&self, pet: &PetRecord) -> Result<()> {
        self.lock().pets.insert(pet.code.clone(), pet.clone());
        Ok(())
    }
}

#[async_trait]
impl super::ScanLogStore for MemoryStore {
    async fn append(&self, event: &ScanEvent) -> Result<String> {
        self.lock().scans.push(event.clone());
        Ok(event.id.clone())
    }

    async fn list_recent(&self, code: &str, limit: usize) -> Result<Vec<ScanEvent>> {
        let inner = self.lock();
        let mut matching: Vec<ScanEvent> = inner
            .scans
            .iter()
            .filter(|e| e.tag_code == code)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit);
        Ok(matching)
    }
}
