//! Session snapshots fetched from the remote session owner.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{CacheError, Result};
use crate::events::PerformanceState;

use super::key::SessionKey;

/// Whether a session is running now or being replayed from a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Live,
    /// Replayed from a log; timestamps may move backwards.
    Past,
}

/// A participant in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMember {
    pub username: String,
    /// Team role the member plays, if any.
    pub role: Option<String>,
}

/// Full description of a session as known by its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub key: SessionKey,
    pub session_name: String,
    pub mode: SessionMode,
    pub scenario_name: Option<String>,
    #[serde(default)]
    pub members: Vec<SessionMember>,
    /// Current hierarchy state, when the owner has one.
    pub performance: Option<PerformanceState>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn new(key: SessionKey, session_name: impl Into<String>, mode: SessionMode) -> Self {
        Self {
            key,
            session_name: session_name.into(),
            mode,
            scenario_name: None,
            members: Vec::new(),
            performance: None,
        }
    }

    #[must_use]
    pub fn with_member(mut self, username: impl Into<String>, role: Option<String>) -> Self {
        self.members.push(SessionMember {
            username: username.into(),
            role,
        });
        self
    }

    #[must_use]
    pub fn with_performance(mut self, performance: PerformanceState) -> Self {
        self.performance = Some(performance);
        self
    }

    #[must_use]
    pub fn is_past(&self) -> bool {
        self.mode == SessionMode::Past
    }
}

/// The remote owner of session state.
///
/// Implementations perform the actual request; the cache guarantees at most
/// one request per session is outstanding at a time.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Request the current snapshot of a session.
    ///
    /// `Ok(None)` means the owner answered but knows no such session.
    async fn request_snapshot(
        &self,
        key: &SessionKey,
    ) -> std::result::Result<Option<SessionSnapshot>, String>;
}

/// Outcome delivered to every caller waiting on a snapshot fetch.
pub type SnapshotResult = Result<Option<Arc<SessionSnapshot>>>;

/// Future returned by [`crate::SessionCacheStore::fetch_snapshot`].
///
/// Resolves exactly once. Dropping it does not cancel the underlying fetch.
#[must_use = "a pending snapshot does nothing unless awaited"]
pub struct PendingSnapshot {
    inner: PendingInner,
}

enum PendingInner {
    Ready(Option<SnapshotResult>),
    Waiting(oneshot::Receiver<SnapshotResult>),
}

fn abandoned() -> SnapshotResult {
    Err(CacheError::FetchAbandoned)
}

impl PendingSnapshot {
    pub(crate) fn ready(result: SnapshotResult) -> Self {
        Self {
            inner: PendingInner::Ready(Some(result)),
        }
    }

    pub(crate) fn waiting(rx: oneshot::Receiver<SnapshotResult>) -> Self {
        Self {
            inner: PendingInner::Waiting(rx),
        }
    }

    /// Block the current thread until the fetch completes.
    ///
    /// For host threads outside the async runtime; panics if called from
    /// within an async execution context.
    pub fn blocking_wait(self) -> SnapshotResult {
        match self.inner {
            PendingInner::Ready(result) => result.unwrap_or_else(abandoned),
            PendingInner::Waiting(rx) => rx.blocking_recv().unwrap_or_else(|_| abandoned()),
        }
    }
}

impl Future for PendingSnapshot {
    type Output = SnapshotResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            PendingInner::Ready(result) => Poll::Ready(result.take().unwrap_or_else(abandoned)),
            PendingInner::Waiting(rx) => {
                let received = ready!(Pin::new(rx).poll(cx));
                Poll::Ready(received.unwrap_or_else(|_| abandoned()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot::new(SessionKey::new(1, 1, None), "Patrol", SessionMode::Past)
            .with_member("alice", Some("squad lead".into()))
    }

    #[tokio::test]
    async fn ready_resolves_immediately() {
        let value = Arc::new(snapshot());
        let pending = PendingSnapshot::ready(Ok(Some(value.clone())));
        let result = pending.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&result, &value));
    }

    #[tokio::test]
    async fn dropped_sender_is_abandoned() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let err = PendingSnapshot::waiting(rx).await.unwrap_err();
        assert_eq!(err, CacheError::FetchAbandoned);
    }

    #[test]
    fn blocking_wait_receives_value() {
        let (tx, rx) = oneshot::channel();
        tx.send(Ok(None)).unwrap();
        assert_eq!(PendingSnapshot::waiting(rx).blocking_wait(), Ok(None));
    }

    #[test]
    fn snapshot_mode_helpers() {
        assert!(snapshot().is_past());
        assert_eq!(snapshot().members.len(), 1);
    }
}
