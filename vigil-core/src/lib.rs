//! vigil-core - Session telemetry cache
//!
//! This crate keeps a consistent derived view of every live or replayed
//! training session:
//!
//! - **Session keys**: identity with experiment-aware equality
//! - **Message cache**: last message per type, duplicate filter, playback rewind
//! - **Task timers**: activity time per performance node
//! - **Throttling**: rate limiting for high-frequency entity updates
//! - **Session store**: per-session entries and coalesced snapshot fetches
//!
//! The assessment hierarchy and rollup live in `vigil-assess`.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod throttle;

pub use cache::{MessageCache, TaskTimer};
pub use config::{CacheConfig, ThrottleConfig};
pub use error::{CacheError, Result};
pub use events::{
    ActivityState, AssessmentLevel, ConceptPerformanceState, EntityState, LearnerState, Message,
    MessageType, ModuleType, NodeId, Payload, PerformanceState, PerformanceStateAttribute,
    ProcessedBookmark, ProcessedStrategy, TaskPerformanceState, UserSession,
};
pub use session::{
    PendingSnapshot, SessionCacheEntry, SessionCacheStore, SessionKey, SessionMember, SessionMode,
    SessionSnapshot, SnapshotResult, SnapshotSource, registry,
};
pub use throttle::ThrottleGate;
