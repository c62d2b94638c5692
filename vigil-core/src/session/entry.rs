//! Per-session cache bundle.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::oneshot;

use crate::cache::MessageCache;
use crate::error::{CacheError, Result};
use crate::events::{MessageType, ProcessedBookmark, ProcessedStrategy, UserSession};

use super::key::SessionKey;
use super::snapshot::{SessionSnapshot, SnapshotResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything cached for one session.
///
/// Each field is guarded separately so message delivery, snapshot fetches
/// and side-cache updates for the same session only contend where they
/// actually share state.
pub struct SessionCacheEntry {
    key: SessionKey,
    messages: Mutex<MessageCache>,
    snapshot: Mutex<Option<Arc<SessionSnapshot>>>,
    /// Callers waiting on the in-flight snapshot fetch; non-empty while one is outstanding.
    waiters: Mutex<Vec<oneshot::Sender<SnapshotResult>>>,
    strategies: Mutex<Vec<ProcessedStrategy>>,
    bookmarks: Mutex<Vec<ProcessedBookmark>>,
    owner_address: OnceLock<String>,
    user_session: OnceLock<UserSession>,
}

/// What a caller of [`SessionCacheEntry::register_waiter`] must do next.
pub(crate) enum Registration {
    /// A snapshot is already cached.
    Cached(Arc<SessionSnapshot>),
    /// Another caller's fetch is outstanding; wait on it.
    Joined(oneshot::Receiver<SnapshotResult>),
    /// This caller must issue the fetch.
    Leader(oneshot::Receiver<SnapshotResult>),
}

impl SessionCacheEntry {
    pub(crate) fn new(key: SessionKey, cached_types: BTreeSet<MessageType>) -> Self {
        Self {
            key,
            messages: Mutex::new(MessageCache::new(cached_types)),
            snapshot: Mutex::new(None),
            waiters: Mutex::new(Vec::new()),
            strategies: Mutex::new(Vec::new()),
            bookmarks: Mutex::new(Vec::new()),
            owner_address: OnceLock::new(),
            user_session: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Run `f` with exclusive access to the message cache.
    ///
    /// Readers going through here never observe a half-processed message.
    pub fn with_messages<R>(&self, f: impl FnOnce(&mut MessageCache) -> R) -> R {
        f(&mut lock(&self.messages))
    }

    // === Snapshot ===

    #[must_use]
    pub fn cached_snapshot(&self) -> Option<Arc<SessionSnapshot>> {
        lock(&self.snapshot).clone()
    }

    pub fn set_snapshot(&self, snapshot: Option<Arc<SessionSnapshot>>) {
        *lock(&self.snapshot) = snapshot;
    }

    pub(crate) fn register_waiter(&self) -> Registration {
        let mut waiters = lock(&self.waiters);

        // Re-checked under the waiter lock so a fetch that just completed is not repeated.
        if let Some(snapshot) = self.cached_snapshot() {
            return Registration::Cached(snapshot);
        }

        let (tx, rx) = oneshot::channel();
        let leader = waiters.is_empty();
        waiters.push(tx);
        let pending = waiters.len();
        tracing::debug!(session = %self.key, pending, leader, "Waiting on snapshot fetch");

        if leader {
            Registration::Leader(rx)
        } else {
            Registration::Joined(rx)
        }
    }

    /// Store the fetch outcome and resolve every waiter with it.
    pub(crate) fn complete_fetch(&self, result: SnapshotResult) {
        if let Ok(snapshot) = &result {
            if snapshot.is_none() {
                tracing::debug!(session = %self.key, "Session owner returned no snapshot");
            }
            self.set_snapshot(snapshot.clone());
        }

        let drained: Vec<_> = lock(&self.waiters).drain(..).collect();
        let pending = drained.len();
        tracing::debug!(session = %self.key, pending, "Resolving snapshot waiters");
        for waiter in drained {
            // A waiter whose future was dropped is not an error.
            let _ = waiter.send(result.clone());
        }
    }

    #[must_use]
    pub fn pending_waiters(&self) -> usize {
        lock(&self.waiters).len()
    }

    // === Set-once fields ===

    #[must_use]
    pub fn owner_address(&self) -> Option<&str> {
        self.owner_address.get().map(String::as_str)
    }

    /// Record the address of the session owner. Setting the same value again is a no-op.
    pub fn set_owner_address(&self, address: impl Into<String>) -> Result<()> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(CacheError::InvalidArgument("blank owner address".into()));
        }
        match self.owner_address.set(address) {
            Ok(()) => Ok(()),
            Err(attempted) => {
                let existing = self.owner_address.get().cloned().unwrap_or_default();
                if existing == attempted {
                    Ok(())
                } else {
                    Err(CacheError::DuplicateSetOnce {
                        field: "owner address",
                        existing,
                        attempted,
                    })
                }
            }
        }
    }

    #[must_use]
    pub fn user_session(&self) -> Option<&UserSession> {
        self.user_session.get()
    }

    /// Record the user session. Setting the same value again is a no-op.
    pub fn set_user_session(&self, session: UserSession) -> Result<()> {
        match self.user_session.set(session) {
            Ok(()) => Ok(()),
            Err(attempted) => match self.user_session.get() {
                Some(existing) if *existing == attempted => Ok(()),
                existing => Err(CacheError::DuplicateSetOnce {
                    field: "user session",
                    existing: format!("{:?}", existing),
                    attempted: format!("{:?}", attempted),
                }),
            },
        }
    }

    // === Side caches ===

    pub fn record_strategies(&self, items: impl IntoIterator<Item = ProcessedStrategy>) {
        lock(&self.strategies).extend(items);
    }

    pub fn record_bookmarks(&self, items: impl IntoIterator<Item = ProcessedBookmark>) {
        lock(&self.bookmarks).extend(items);
    }

    /// Copy of the processed strategies, oldest first.
    #[must_use]
    pub fn strategies(&self) -> Vec<ProcessedStrategy> {
        lock(&self.strategies).clone()
    }

    /// Copy of the processed bookmarks, oldest first.
    #[must_use]
    pub fn bookmarks(&self) -> Vec<ProcessedBookmark> {
        lock(&self.bookmarks).clone()
    }

    /// Drop strategies performed after `timestamp`, newest first, stopping at
    /// the first one that is not in the future.
    pub(crate) fn prune_strategies_after(&self, timestamp: i64) -> usize {
        let mut strategies = lock(&self.strategies);
        let before = strategies.len();
        while let Some(last) = strategies.last() {
            if last.time_performed <= timestamp {
                break;
            }
            strategies.pop();
        }
        before - strategies.len()
    }
}
