//! Rate limiter for high-frequency entity updates.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::config::ThrottleConfig;
use crate::session::SessionKey;

/// Decides whether an entity update should be forwarded.
///
/// Remembers when each `(session, entity)` pair was last let through and
/// drops updates that arrive within the minimum interval. Deactivations are
/// always let through so consumers never miss an entity going away.
pub struct ThrottleGate {
    min_interval_millis: i64,
    last_allowed: Mutex<HashMap<(SessionKey, String), i64>>,
}

impl ThrottleGate {
    /// Create a gate with the given minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval_millis: i64::try_from(min_interval.as_millis()).unwrap_or(i64::MAX),
            last_allowed: Mutex::new(HashMap::new()),
        }
    }

    /// Create a gate from configuration.
    #[must_use]
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(config.min_interval)
    }

    /// Whether the update should be forwarded; records `now_millis` if so.
    pub fn allow(
        &self,
        key: &SessionKey,
        entity_id: &str,
        is_active: bool,
        now_millis: i64,
    ) -> bool {
        let mut last_allowed = self
            .last_allowed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = (key.clone(), entity_id.to_string());

        let allowed = match last_allowed.get(&slot) {
            None => true,
            Some(_) if !is_active => true,
            Some(last) => now_millis.saturating_sub(*last) > self.min_interval_millis,
        };

        if allowed {
            last_allowed.insert(slot, now_millis);
        } else {
            tracing::trace!(session = %key, entity_id, "Throttled entity update");
        }
        allowed
    }

    /// Forget every record for a session.
    pub fn clear_session(&self, key: &SessionKey) {
        self.last_allowed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(session, _), _| session != key);
    }

    /// Number of tracked `(session, entity)` pairs.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.last_allowed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self::from_config(&ThrottleConfig::default())
    }
}
