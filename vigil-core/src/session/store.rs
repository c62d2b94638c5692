//! Process-wide directory of per-session caches.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::cache::TaskTimer;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::events::{
    LearnerState, Message, MessageType, ModuleType, NodeId, Payload, ProcessedBookmark,
    ProcessedStrategy, UserSession,
};
use crate::throttle::ThrottleGate;

use super::entry::{Registration, SessionCacheEntry};
use super::key::SessionKey;
use super::snapshot::{PendingSnapshot, SessionMode, SessionSnapshot, SnapshotSource};

/// Maps [`SessionKey`]s to their [`SessionCacheEntry`].
///
/// Entries are created lazily on first reference and only go away through
/// [`remove`](Self::remove) or [`reset`](Self::reset). There is no lock
/// across sessions: the directory lock is held only long enough to look up
/// or insert an entry.
pub struct SessionCacheStore {
    config: CacheConfig,
    source: Arc<dyn SnapshotSource>,
    entries: RwLock<HashMap<SessionKey, Arc<SessionCacheEntry>>>,
    throttle: ThrottleGate,
    connected: Mutex<HashSet<i32>>,
}

impl SessionCacheStore {
    /// Create a store that fetches snapshots from `source`.
    pub fn new(config: CacheConfig, source: Arc<dyn SnapshotSource>) -> Self {
        let throttle = ThrottleGate::from_config(&config.throttle);
        Self {
            config,
            source,
            entries: RwLock::new(HashMap::new()),
            throttle,
            connected: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Rate limiter for entity updates, shared by every session in the store.
    #[must_use]
    pub fn throttle(&self) -> &ThrottleGate {
        &self.throttle
    }

    /// Get the entry for `key`, creating an empty one if needed.
    pub fn get_or_create(&self, key: &SessionKey) -> Arc<SessionCacheEntry> {
        if let Some(entry) = self.get(key) {
            return entry;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(session = %key, "Creating session cache entry");
                let cached_types = self.config.cached_types.clone();
                Arc::new(SessionCacheEntry::new(key.clone(), cached_types))
            })
            .clone()
    }

    /// Get the entry for `key` without creating one.
    #[must_use]
    pub fn get(&self, key: &SessionKey) -> Option<Arc<SessionCacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Evict a session. Returns the removed entry, if any.
    pub fn remove(&self, key: &SessionKey) -> Option<Arc<SessionCacheEntry>> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.throttle.clear_session(key);
        if removed.is_some() {
            tracing::debug!(session = %key, "Removed session cache entry");
        }
        removed
    }

    /// Drop every entry and connection record.
    pub fn reset(&self) {
        let keys: Vec<SessionKey> = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.drain().map(|(key, _)| key).collect()
        };
        for key in &keys {
            self.throttle.clear_session(key);
        }
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!(sessions = keys.len(), "Reset session cache store");
    }

    /// Number of sessions currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // === Message ingestion ===

    /// Ingest one message. Returns true if it was a duplicate.
    ///
    /// Updates the session's message cache, prunes strategies from the future
    /// when replaying, and fills in the owner address and user session the
    /// first time a message carries them. A lesson starting in a live session
    /// drops the cached snapshot so the next fetch picks up new membership.
    ///
    /// A domain message without a sender address is rejected before anything
    /// is recorded. A conflicting owner address or user session is logged and
    /// left as first recorded; the message itself is still ingested.
    pub fn dispatch(&self, message: &Message) -> Result<bool> {
        let from_domain = message.sender_module == ModuleType::Domain;
        if from_domain && message.sender_address.trim().is_empty() {
            return Err(CacheError::InvalidArgument("blank domain sender".into()));
        }

        let key = SessionKey::from_message(message);
        let entry = self.get_or_create(&key);

        let snapshot = entry.cached_snapshot();
        let past_mode = snapshot.as_ref().is_some_and(|s| s.is_past());

        if entry.with_messages(|cache| cache.process(message, past_mode)) {
            return Ok(true);
        }

        if past_mode {
            let pruned = entry.prune_strategies_after(message.timestamp);
            if pruned > 0 {
                tracing::debug!(session = %key, pruned, "Pruned strategies after rewind");
            }
        }

        if from_domain && entry.owner_address().is_none() {
            if let Err(e) = entry.set_owner_address(message.sender_address.clone()) {
                tracing::warn!(session = %key, error = %e, "Keeping first owner address");
            }
        }

        if let Some(user_session) = &message.user_session {
            if entry.user_session().is_none() {
                if let Err(e) = entry.set_user_session(user_session.clone()) {
                    tracing::warn!(session = %key, error = %e, "Keeping first user session");
                }
            }
        }

        if message.message_type() == MessageType::LessonStarted
            && snapshot.is_some_and(|s| s.mode == SessionMode::Live)
        {
            tracing::debug!(session = %key, "Lesson started, dropping cached snapshot");
            entry.set_snapshot(None);
        }

        Ok(false)
    }

    // === Snapshots ===

    /// Fetch the session snapshot, coalescing concurrent callers.
    ///
    /// A cached snapshot resolves immediately. Otherwise at most one request
    /// to the [`SnapshotSource`] is outstanding per session; every caller
    /// arriving while it runs receives the same outcome. The request runs on
    /// its own task and completes even if every caller drops its future.
    /// Failures are not cached, so the next call after one issues a new
    /// request.
    ///
    /// Must be called from within a tokio runtime.
    pub fn fetch_snapshot(&self, key: &SessionKey) -> PendingSnapshot {
        let entry = self.get_or_create(key);

        if let Some(snapshot) = entry.cached_snapshot() {
            tracing::trace!(session = %key, "Snapshot cache hit");
            return PendingSnapshot::ready(Ok(Some(snapshot)));
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let err = CacheError::InvalidArgument("no tokio runtime".into());
            return PendingSnapshot::ready(Err(err));
        };

        match entry.register_waiter() {
            Registration::Cached(snapshot) => PendingSnapshot::ready(Ok(Some(snapshot))),
            Registration::Joined(rx) => {
                tracing::debug!(session = %key, "Joined in-flight snapshot fetch");
                PendingSnapshot::waiting(rx)
            }
            Registration::Leader(rx) => {
                let source = Arc::clone(&self.source);
                let key = key.clone();
                runtime.spawn(async move {
                    tracing::debug!(session = %key, "Requesting session snapshot");
                    let result = match source.request_snapshot(&key).await {
                        Ok(snapshot) => Ok(snapshot.map(Arc::new)),
                        Err(reason) => {
                            tracing::error!(session = %key, %reason, "Snapshot request failed");
                            Err(CacheError::Upstream {
                                key: key.to_string(),
                                reason,
                            })
                        }
                    };
                    entry.complete_fetch(result);
                });
                PendingSnapshot::waiting(rx)
            }
        }
    }

    /// Seed a snapshot known out of band, such as at playback start.
    pub fn cache_snapshot(&self, snapshot: SessionSnapshot) -> Arc<SessionSnapshot> {
        let snapshot = Arc::new(snapshot);
        let entry = self.get_or_create(&snapshot.key);
        entry.set_snapshot(Some(Arc::clone(&snapshot)));
        snapshot
    }

    pub fn cache_snapshots(&self, snapshots: impl IntoIterator<Item = SessionSnapshot>) {
        for snapshot in snapshots {
            self.cache_snapshot(snapshot);
        }
    }

    #[must_use]
    pub fn cached_snapshot(&self, key: &SessionKey) -> Option<Arc<SessionSnapshot>> {
        self.get(key).and_then(|entry| entry.cached_snapshot())
    }

    // === Set-once fields ===

    pub fn set_owner_address(&self, key: &SessionKey, address: impl Into<String>) -> Result<()> {
        self.get_or_create(key).set_owner_address(address)
    }

    pub fn set_user_session(&self, key: &SessionKey, session: UserSession) -> Result<()> {
        self.get_or_create(key).set_user_session(session)
    }

    #[must_use]
    pub fn owner_address(&self, key: &SessionKey) -> Option<String> {
        self.get(key)
            .and_then(|entry| entry.owner_address().map(str::to_string))
    }

    #[must_use]
    pub fn user_session(&self, key: &SessionKey) -> Option<UserSession> {
        self.get(key)
            .and_then(|entry| entry.user_session().cloned())
    }

    // === Side caches ===

    /// Append processed strategies. Missing items are skipped.
    pub fn record_processed_strategy(
        &self,
        key: &SessionKey,
        items: impl IntoIterator<Item = Option<ProcessedStrategy>>,
    ) {
        let items: Vec<_> = items.into_iter().flatten().collect();
        if items.is_empty() {
            return;
        }
        self.get_or_create(key).record_strategies(items);
    }

    /// Append processed bookmarks. Missing items are skipped.
    pub fn record_processed_bookmark(
        &self,
        key: &SessionKey,
        items: impl IntoIterator<Item = Option<ProcessedBookmark>>,
    ) {
        let items: Vec<_> = items.into_iter().flatten().collect();
        if items.is_empty() {
            return;
        }
        self.get_or_create(key).record_bookmarks(items);
    }

    #[must_use]
    pub fn processed_strategies(&self, key: &SessionKey) -> Vec<ProcessedStrategy> {
        self.get(key)
            .map(|entry| entry.strategies())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn processed_bookmarks(&self, key: &SessionKey) -> Vec<ProcessedBookmark> {
        self.get(key)
            .map(|entry| entry.bookmarks())
            .unwrap_or_default()
    }

    // === Cache queries ===

    /// Payload of the last cached message of a type.
    #[must_use]
    pub fn last_payload(&self, key: &SessionKey, message_type: MessageType) -> Option<Payload> {
        let entry = self.get(key)?;
        entry.with_messages(|cache| cache.last_payload(message_type))
    }

    #[must_use]
    pub fn last_learner_state(&self, key: &SessionKey) -> Option<LearnerState> {
        let entry = self.get(key)?;
        entry.with_messages(|cache| cache.last_learner_state().cloned())
    }

    #[must_use]
    pub fn latest_timestamp(&self, key: &SessionKey) -> Option<i64> {
        let entry = self.get(key)?;
        entry.with_messages(|cache| cache.latest_timestamp())
    }

    #[must_use]
    pub fn task_timers(&self, key: &SessionKey) -> HashMap<NodeId, TaskTimer> {
        self.get(key)
            .map(|entry| entry.with_messages(|cache| cache.task_timers()))
            .unwrap_or_default()
    }

    // === Connections ===

    pub fn set_session_connected(&self, session_id: i32, connected: bool) {
        let mut sessions = self
            .connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if connected {
            sessions.insert(session_id);
        } else {
            sessions.remove(&session_id);
        }
    }

    #[must_use]
    pub fn is_session_connected(&self, session_id: i32) -> bool {
        self.connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&session_id)
    }

    /// Whether any cached session is owned by `address`.
    #[must_use]
    pub fn is_address_referenced(&self, address: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|entry| entry.owner_address() == Some(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoSnapshots;

    #[async_trait]
    impl SnapshotSource for NoSnapshots {
        async fn request_snapshot(
            &self,
            _key: &SessionKey,
        ) -> std::result::Result<Option<SessionSnapshot>, String> {
            Ok(None)
        }
    }

    fn store() -> SessionCacheStore {
        SessionCacheStore::new(CacheConfig::default(), Arc::new(NoSnapshots))
    }

    fn key() -> SessionKey {
        SessionKey::new(7, 3, Some("alice".into()))
    }

    fn message(id: u64, timestamp: i64, payload: Payload) -> Message {
        Message::new(7, "domain-1", timestamp, payload)
            .with_event_id(id)
            .with_user(3, "alice")
    }

    fn from_module(module: ModuleType, sender: &str, id: u64, payload: Payload) -> Message {
        let mut msg = message(id, id as i64 * 10, payload);
        msg.sender_module = module;
        msg.sender_address = sender.to_string();
        msg
    }

    // ==================== Directory Tests ====================

    #[test]
    fn get_or_create_is_idempotent() {
        let store = store();
        let first = store.get_or_create(&key());
        let second = store.get_or_create(&key());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_clears_entry_and_throttle_records() {
        let store = store();
        store.get_or_create(&key());
        assert!(store.throttle().allow(&key(), "tank", true, 0));

        assert!(store.remove(&key()).is_some());
        assert!(store.get(&key()).is_none());
        assert_eq!(store.throttle().tracked(), 0);
        assert!(store.remove(&key()).is_none());
    }

    #[test]
    fn reset_empties_store() {
        let store = store();
        store.get_or_create(&key());
        store.set_session_connected(7, true);
        store.reset();
        assert!(store.is_empty());
        assert!(!store.is_session_connected(7));
    }

    // ==================== Dispatch Tests ====================

    #[test]
    fn dispatch_reports_duplicates() {
        let store = store();
        let msg = message(1, 10, Payload::LessonStarted);
        assert!(!store.dispatch(&msg).unwrap());
        assert!(store.dispatch(&msg).unwrap());
        assert_eq!(store.latest_timestamp(&key()), Some(10));
    }

    #[test]
    fn dispatch_records_domain_owner_once() {
        let store = store();
        let gateway = from_module(ModuleType::Gateway, "gateway-1", 1, Payload::LessonStarted);
        store.dispatch(&gateway).unwrap();
        assert_eq!(store.owner_address(&key()), None);

        let domain = from_module(ModuleType::Domain, "domain-1", 2, Payload::LessonCompleted);
        store.dispatch(&domain).unwrap();
        assert_eq!(store.owner_address(&key()).as_deref(), Some("domain-1"));
        assert!(store.is_address_referenced("domain-1"));
        assert!(!store.is_address_referenced("domain-2"));
    }

    #[test]
    fn blank_domain_sender_is_rejected_before_caching() {
        let store = store();
        let session = UserSession::new(3).with_username("alice");
        let mut blank = from_module(ModuleType::Domain, " ", 1, Payload::LessonStarted);
        blank.user_session = Some(session.clone());

        let result = store.dispatch(&blank);
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
        assert_eq!(store.latest_timestamp(&key()), None);
        assert_eq!(store.user_session(&key()), None);

        let mut fixed = from_module(ModuleType::Domain, "domain-1", 1, Payload::LessonStarted);
        fixed.user_session = Some(session.clone());
        assert!(!store.dispatch(&fixed).unwrap());
        assert_eq!(store.user_session(&key()), Some(session));
        assert_eq!(store.owner_address(&key()).as_deref(), Some("domain-1"));
    }

    #[test]
    fn second_domain_sender_does_not_abort_dispatch() {
        let store = store();
        store.cache_snapshot(SessionSnapshot::new(key(), "live", SessionMode::Live));
        let first = from_module(ModuleType::Domain, "domain-1", 1, Payload::LessonCompleted);
        store.dispatch(&first).unwrap();

        let session = UserSession::new(3);
        let mut second = from_module(ModuleType::Domain, "domain-2", 2, Payload::LessonStarted);
        second.user_session = Some(session.clone());
        assert!(!store.dispatch(&second).unwrap());

        assert_eq!(store.owner_address(&key()).as_deref(), Some("domain-1"));
        assert_eq!(store.user_session(&key()), Some(session));
        assert!(store.cached_snapshot(&key()).is_none());
        assert!(store.dispatch(&second).unwrap());
    }

    #[test]
    fn conflicting_user_session_keeps_first() {
        let store = store();
        let mut first = message(1, 10, Payload::LessonStarted);
        first.user_session = Some(UserSession::new(3));
        let mut second = message(2, 20, Payload::LessonCompleted);
        second.user_session = Some(UserSession::new(4));

        assert!(!store.dispatch(&first).unwrap());
        assert!(!store.dispatch(&second).unwrap());
        assert_eq!(store.user_session(&key()).map(|s| s.user_id), Some(3));
        assert_eq!(store.latest_timestamp(&key()), Some(20));
    }

    #[test]
    fn dispatch_records_user_session() {
        let store = store();
        let msg = message(1, 10, Payload::LessonStarted)
            .with_user_session(UserSession::new(3).with_username("alice"));
        store.dispatch(&msg).unwrap();
        assert_eq!(store.user_session(&key()).unwrap().user_id, 3);
    }

    #[test]
    fn lesson_started_drops_live_snapshot() {
        let store = store();
        store.cache_snapshot(SessionSnapshot::new(key(), "live", SessionMode::Live));
        let started = message(1, 10, Payload::LessonStarted);
        store.dispatch(&started).unwrap();
        assert!(store.cached_snapshot(&key()).is_none());
    }

    #[test]
    fn lesson_started_keeps_past_snapshot() {
        let store = store();
        store.cache_snapshot(SessionSnapshot::new(key(), "replay", SessionMode::Past));
        let started = message(1, 10, Payload::LessonStarted);
        store.dispatch(&started).unwrap();
        assert!(store.cached_snapshot(&key()).is_some());
    }

    // ==================== Side Cache Tests ====================

    #[test]
    fn empty_strategy_batch_creates_nothing() {
        let store = store();
        store.record_processed_strategy(&key(), Vec::new());
        store.record_processed_strategy(&key(), [None]);
        assert!(store.get(&key()).is_none());
    }

    #[test]
    fn strategies_and_bookmarks_are_appended() {
        let store = store();
        let bookmark = ProcessedBookmark::new(5).with_comment("nice");
        store.record_processed_strategy(&key(), [Some(ProcessedStrategy::new("a", 1)), None]);
        store.record_processed_strategy(&key(), [Some(ProcessedStrategy::new("b", 2))]);
        store.record_processed_bookmark(&key(), [Some(bookmark)]);

        assert_eq!(store.processed_strategies(&key()).len(), 2);
        let bookmarks = store.processed_bookmarks(&key());
        assert_eq!(bookmarks[0].comment.as_deref(), Some("nice"));
    }

    #[test]
    fn blank_owner_address_is_rejected() {
        let store = store();
        assert!(matches!(
            store.set_owner_address(&key(), ""),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    // ==================== Snapshot Tests ====================

    #[tokio::test]
    async fn cached_snapshot_resolves_without_request() {
        let store = store();
        let seeded = store.cache_snapshot(SessionSnapshot::new(key(), "s", SessionMode::Live));
        let fetched = store.fetch_snapshot(&key()).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&seeded, &fetched));
    }

    #[tokio::test]
    async fn unknown_session_resolves_to_none() {
        let store = store();
        assert_eq!(store.fetch_snapshot(&key()).await, Ok(None));
        assert_eq!(store.get(&key()).unwrap().pending_waiters(), 0);
    }

    #[test]
    fn fetch_outside_runtime_fails() {
        let store = store();
        let result = store.fetch_snapshot(&key()).blocking_wait();
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
        assert_eq!(store.get(&key()).unwrap().pending_waiters(), 0);
    }
}
