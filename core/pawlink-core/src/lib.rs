//! # pawlink-core
//!
//! Coordination core for Pawlink, shared by the daemon and any embedding
//! client: tag claim and authentication, the lost/safe state machine,
//! best-effort scan location resolution, and the append-only scan log
//! read path.
//!
//! ## Design Principles
//!
//! - **Store-agnostic**: collaborators are async traits; the daemon
//!   brings SQLite, tests bring [`store::MemoryStore`].
//! - **One contended write**: the tag claim flip is a compare-and-set at
//!   the store boundary. Everything else is single-owner or append-only.
//! - **Bounded waits**: every geolocation stage runs under its own hard
//!   deadline; no call in this crate blocks indefinitely.
//! - **Graceful degradation**: missing location and failed scan-log
//!   appends are logged outcomes, not errors.

// Public modules
pub mod claim;
pub mod config;
pub mod entry;
pub mod error;
pub mod location;
pub mod lost;
pub mod scan;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used items at crate root
pub use claim::{ClaimCoordinator, ClaimOutcome};
pub use config::ResolverConfig;
pub use entry::{parse_pet_path, EntryDecision, EntryRouter, LoginPrompt};
pub use error::{CoreError, Result};
pub use location::{
    DeviceFix, DeviceGeolocation, FixResult, IpGeolocationService, IpLookup, LocationResolver,
    Resolution,
};
pub use lost::{ActivationRequest, LostStateMachine};
pub use scan::{ScanAlertAggregator, ScanRecorder, DEFAULT_RECENT_LIMIT};
pub use session::{resume, OwnerSession, SessionSnapshot};
pub use store::{MemoryStore, OwnerStore, PetStore, ScanLogStore, TagStore};
pub use types::*;
