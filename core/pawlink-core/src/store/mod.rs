//! Store collaborator contracts.
//!
//! The core specifies only the operations it needs; how a store is built
//! (SQLite, a remote API, a test fake) is the implementor's business.
//! Every call is a suspend point and must not block indefinitely.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{OwnerProfile, PetRecord, ScanEvent, Tag};

mod memory;

pub use memory::MemoryStore;

/// Registry of physical tags.
///
/// The claim flip is the one contended write in the system, so it is a
/// compare-and-set here at the store boundary rather than a
/// read-then-write anywhere above it.
#[async_trait]
pub trait TagStore: Send + Sync {
    async fn get(&self, code: &str) -> Result<Option<Tag>>;

    /// Atomically flips `Empty -> Claimed`. Returns `false` when the tag
    /// was not `Empty` at write time; first writer wins.
    async fn try_set_claimed(&self, code: &str) -> Result<bool>;

    /// Corrective rollback for a claimed tag with no owner behind it.
    async fn reset_to_empty(&self, code: &str) -> Result<()>;

    /// PIN rotation. Does not touch claim status.
    async fn set_secret(&self, code: &str, secret: &str) -> Result<()>;
}

/// Owner profiles, keyed by tag code. Single-owner writes, no
/// cross-client contention.
#[async_trait]
pub trait OwnerStore: Send + Sync {
    async fn get(&self, code: &str) -> Result<Option<OwnerProfile>>;
    async fn upsert(&self, owner: &OwnerProfile) -> Result<()>;
}

/// Pet records, keyed by tag code. Single-owner writes.
#[async_trait]
pub trait PetStore: Send + Sync {
    async fn get(&self, code: &str) -> Result<Option<PetRecord>>;
    async fn upsert(&self, pet: &PetRecord) -> Result<()>;
}

/// Append-only log of scan events, queryable newest-first per tag code.
#[async_trait]
pub trait ScanLogStore: Send + Sync {
    /// Appends one event and returns its id.
    async fn append(&self, event: &ScanEvent) -> Result<String>;

    /// Newest-first read; restartable, not a consumed stream.
    async fn list_recent(&self, code: &str, limit: usize) -> Result<Vec<ScanEvent>>;
}
