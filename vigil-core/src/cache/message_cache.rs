//! Last-message-per-type cache with duplicate filtering.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::events::{LearnerState, Message, MessageType, NodeId, Payload, PerformanceState};

use super::timers::{self, TaskTimer};

/// Per-session store of the last message of each cached type.
///
/// Also tracks every `(source_event_id, sender_address)` pair seen so far, so
/// a redelivered message is recognised regardless of its type, and derives
/// per-node activity timers from successive state snapshots.
#[derive(Debug, Default)]
pub struct MessageCache {
    /// Types whose last message is kept.
    cached_types: BTreeSet<MessageType>,
    /// Last message seen per cached type.
    last_by_type: HashMap<MessageType, Message>,
    /// Event ids already processed, per sender.
    seen: HashSet<(u64, String)>,
    /// Activity timers by node id.
    timers: HashMap<NodeId, TaskTimer>,
}

impl MessageCache {
    /// Create a cache that keeps messages of the given types.
    #[must_use]
    pub fn new(cached_types: BTreeSet<MessageType>) -> Self {
        Self {
            cached_types,
            ..Self::default()
        }
    }

    /// Process a message. Returns true if it is a duplicate.
    ///
    /// Duplicates are dropped without touching any cached state. Messages
    /// without a source event id are never treated as duplicates. In past
    /// mode, cached messages newer than the incoming one are evicted before
    /// it is stored; evicting a state snapshot clears all task timers since
    /// they are only valid forward from a snapshot.
    pub fn process(&mut self, message: &Message, past_mode: bool) -> bool {
        if self.is_duplicate(message) {
            let sender = &message.sender_address;
            tracing::trace!(event_id = ?message.source_event_id, %sender, "Dropping duplicate");
            return true;
        }
        if let Some(event_id) = message.source_event_id {
            let sender = message.sender_address.clone();
            self.seen.insert((event_id, sender));
        }

        let message_type = message.message_type();
        if !self.cached_types.contains(&message_type) {
            return false;
        }

        if past_mode {
            self.rewind_to(message.timestamp);
        }

        if let Some(learner_state) = message.payload.as_learner_state() {
            let previous = self.last_snapshot_state().cloned();
            timers::advance(
                &mut self.timers,
                previous.as_ref(),
                &learner_state.performance,
                message.timestamp,
            );
        }

        self.last_by_type.insert(message_type, message.clone());
        false
    }

    /// Evict every cached message newer than `timestamp`.
    fn rewind_to(&mut self, timestamp: i64) {
        let mut cleared_timers = false;
        self.last_by_type.retain(|message_type, cached| {
            if cached.timestamp <= timestamp {
                return true;
            }
            tracing::debug!(
                message_type = %message_type,
                cached = cached.timestamp,
                incoming = timestamp,
                "Evicting cached message from the future"
            );
            if *message_type == MessageType::STATE_SNAPSHOT {
                cleared_timers = true;
            }
            false
        });
        if cleared_timers {
            self.timers.clear();
        }
    }

    fn last_snapshot_state(&self) -> Option<&PerformanceState> {
        self.last_learner_state().map(|s| &s.performance)
    }

    /// Last cached message of a type.
    #[must_use]
    pub fn last(&self, message_type: MessageType) -> Option<&Message> {
        self.last_by_type.get(&message_type)
    }

    /// Payload of the last cached message of a type.
    #[must_use]
    pub fn last_payload(&self, message_type: MessageType) -> Option<Payload> {
        self.last(message_type).map(|m| m.payload.clone())
    }

    /// Learner state carried by the last cached state snapshot.
    #[must_use]
    pub fn last_learner_state(&self) -> Option<&LearnerState> {
        self.last(MessageType::STATE_SNAPSHOT)
            .and_then(|m| m.payload.as_learner_state())
    }

    /// Newest timestamp across all cached messages.
    #[must_use]
    pub fn latest_timestamp(&self) -> Option<i64> {
        self.last_by_type.values().map(|m| m.timestamp).max()
    }

    /// Copy of the current task timers.
    #[must_use]
    pub fn task_timers(&self) -> HashMap<NodeId, TaskTimer> {
        self.timers.clone()
    }

    /// Whether a message with this id from this sender was already processed.
    #[must_use]
    pub fn is_duplicate(&self, message: &Message) -> bool {
        let Some(event_id) = message.source_event_id else {
            return false;
        };
        self.seen
            .contains(&(event_id, message.sender_address.clone()))
    }

    /// Number of cached message types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_by_type.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_by_type.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActivityState, PerformanceStateAttribute, TaskPerformanceState};
    use serde_json::Value;

    fn all_types() -> BTreeSet<MessageType> {
        [
            MessageType::LearnerState,
            MessageType::InitializePedagogicalModelRequest,
            MessageType::PedagogicalRequest,
            MessageType::LessonStarted,
            MessageType::LessonCompleted,
            MessageType::KnowledgeSessionUpdate,
        ]
        .into_iter()
        .collect()
    }

    fn msg(id: u64, timestamp: i64, payload: Payload) -> Message {
        Message::new(1, "domain-1", timestamp, payload).with_event_id(id)
    }

    fn learner_state(id: u64, node_state: ActivityState, time: i64) -> Message {
        let attr = PerformanceStateAttribute::new(1, "T1")
            .with_node_state(node_state)
            .with_assessment_time(time);
        let task = TaskPerformanceState::new(attr, vec![]);
        let state = LearnerState::new(PerformanceState::new().with_task(task));
        msg(id, time, Payload::LearnerState(state))
    }

    fn timestamp_of(cache: &MessageCache, message_type: MessageType) -> Option<i64> {
        cache.last(message_type).map(|m| m.timestamp)
    }

    // ==================== Duplicate Tests ====================

    #[test]
    fn second_delivery_is_duplicate_and_changes_nothing() {
        let mut cache = MessageCache::new(all_types());
        let first = msg(1, 10, Payload::LessonStarted);

        assert!(!cache.process(&first, false));
        let latest = cache.latest_timestamp();

        let mut redelivered = first.clone();
        redelivered.timestamp = 99;
        assert!(cache.process(&redelivered, false));
        assert!(cache.is_duplicate(&first));
        assert_eq!(cache.latest_timestamp(), latest);
        assert_eq!(timestamp_of(&cache, MessageType::LessonStarted), Some(10));
    }

    #[test]
    fn duplicate_detection_ignores_message_type() {
        let mut cache = MessageCache::new(all_types());
        assert!(!cache.process(&msg(5, 10, Payload::LessonStarted), false));
        assert!(cache.process(&msg(5, 20, Payload::LessonCompleted), false));
        assert!(cache.last(MessageType::LessonCompleted).is_none());
    }

    #[test]
    fn same_id_from_other_sender_is_not_duplicate() {
        let mut cache = MessageCache::new(all_types());
        let first = msg(5, 10, Payload::LessonStarted);
        let mut other = first.clone();
        other.sender_address = "domain-2".into();

        assert!(!cache.process(&first, false));
        assert!(!cache.process(&other, false));
    }

    #[test]
    fn missing_event_id_is_never_duplicate() {
        let mut cache = MessageCache::new(all_types());
        let message = Message::new(1, "domain-1", 10, Payload::LessonStarted);

        assert!(!cache.process(&message, false));
        assert!(!cache.process(&message, false));
        assert!(!cache.is_duplicate(&message));
    }

    #[test]
    fn uncached_type_is_still_deduplicated() {
        let mut cache = MessageCache::new([MessageType::LearnerState].into_iter().collect());
        let message = msg(3, 10, Payload::LessonStarted);

        assert!(!cache.process(&message, false));
        assert!(cache.is_empty());
        assert!(cache.process(&message, false));
    }

    // ==================== Rewind Tests ====================

    #[test]
    fn past_mode_evicts_future_messages() {
        let mut cache = MessageCache::new(all_types());
        cache.process(&msg(1, 10, Payload::LessonStarted), true);
        cache.process(&msg(2, 20, Payload::PedagogicalRequest(Value::Null)), true);
        cache.process(&msg(3, 30, Payload::LessonCompleted), true);

        let rewind = msg(4, 15, Payload::KnowledgeSessionUpdate(Value::Null));
        cache.process(&rewind, true);

        assert_eq!(timestamp_of(&cache, MessageType::LessonStarted), Some(10));
        assert!(cache.last(MessageType::PedagogicalRequest).is_none());
        assert!(cache.last(MessageType::LessonCompleted).is_none());
        let update = timestamp_of(&cache, MessageType::KnowledgeSessionUpdate);
        assert_eq!(update, Some(15));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn live_mode_keeps_future_messages() {
        let mut cache = MessageCache::new(all_types());
        cache.process(&msg(1, 30, Payload::LessonCompleted), false);
        cache.process(&msg(2, 15, Payload::LessonStarted), false);

        assert!(cache.last(MessageType::LessonCompleted).is_some());
        assert_eq!(cache.latest_timestamp(), Some(30));
    }

    #[test]
    fn equal_timestamp_is_not_evicted() {
        let mut cache = MessageCache::new(all_types());
        cache.process(&msg(1, 20, Payload::LessonStarted), true);
        cache.process(&msg(2, 20, Payload::LessonCompleted), true);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn evicting_snapshot_clears_timers() {
        let mut cache = MessageCache::new(all_types());
        cache.process(&learner_state(1, ActivityState::Active, 100), true);
        assert!(!cache.task_timers().is_empty());

        cache.process(&msg(2, 50, Payload::LessonStarted), true);

        assert!(cache.task_timers().is_empty());
        assert!(cache.last(MessageType::LearnerState).is_none());
    }

    // ==================== Timer Tests ====================

    #[test]
    fn timers_accumulate_active_time() {
        let mut cache = MessageCache::new(all_types());
        cache.process(&learner_state(1, ActivityState::Active, 100), false);
        cache.process(&learner_state(2, ActivityState::Finished, 350), false);

        let timer = cache.task_timers()[&1];
        assert_eq!(timer.cumulative_active_millis, 250);
        assert_eq!(timer.last_active_timestamp, Some(100));
    }

    #[test]
    fn task_timers_returns_a_copy() {
        let mut cache = MessageCache::new(all_types());
        cache.process(&learner_state(1, ActivityState::Active, 100), false);
        let copy = cache.task_timers();

        cache.process(&learner_state(2, ActivityState::Finished, 400), false);

        assert_eq!(copy[&1].cumulative_active_millis, 0);
        assert_eq!(cache.task_timers()[&1].cumulative_active_millis, 300);
    }

    #[test]
    fn latest_timestamp_empty_is_none() {
        let cache = MessageCache::new(all_types());
        assert_eq!(cache.latest_timestamp(), None);
    }
}
