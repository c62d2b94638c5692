//! Message caching and derived activity timers.

mod message_cache;
mod timers;

pub use message_cache::MessageCache;
pub use timers::TaskTimer;
