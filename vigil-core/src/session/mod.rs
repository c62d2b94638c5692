//! Per-session caching
//!
//! Session identity, the cache bundle kept for each session, the store that
//! maps one to the other, and the coalesced snapshot fetch.

mod entry;
mod key;
pub mod registry;
mod snapshot;
mod store;

pub use entry::SessionCacheEntry;
pub use key::SessionKey;
pub use snapshot::{
    PendingSnapshot, SessionMember, SessionMode, SessionSnapshot, SnapshotResult, SnapshotSource,
};
pub use store::SessionCacheStore;
