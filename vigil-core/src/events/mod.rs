//! Telemetry event model
//!
//! Messages delivered by the transport, the performance-state snapshot they
//! carry, and the side-cache records kept alongside them.

mod message;
mod performance;
mod records;

pub use message::{EntityState, Message, MessageType, ModuleType, Payload, UserSession};
pub use performance::{
    ActivityState, AssessmentLevel, ConceptPerformanceState, LearnerState, NodeId,
    PerformanceState, PerformanceStateAttribute, TaskPerformanceState,
};
pub use records::{ProcessedBookmark, ProcessedStrategy};
