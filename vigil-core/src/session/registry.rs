//! Process-wide session cache store.
//!
//! Hosts call [`init`] once at startup; code that cannot be handed the store
//! directly looks it up with [`global`]. Tests should prefer owning their own
//! [`SessionCacheStore`] and use [`reset`] when they do touch the registry.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{CacheError, Result};

use super::store::SessionCacheStore;

static REGISTRY: RwLock<Option<Arc<SessionCacheStore>>> = RwLock::new(None);

/// Install `store` as the process-wide store, replacing any previous one.
pub fn init(store: SessionCacheStore) -> Arc<SessionCacheStore> {
    let store = Arc::new(store);
    let previous = REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(Arc::clone(&store));
    if previous.is_some() {
        tracing::debug!("Replaced process-wide session cache store");
    }
    store
}

/// The process-wide store.
pub fn global() -> Result<Arc<SessionCacheStore>> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(CacheError::NotInitialized)
}

/// Remove the process-wide store. Holders of an `Arc` keep theirs alive.
pub fn reset() {
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::session::{SessionKey, SessionSnapshot, SnapshotSource};
    use async_trait::async_trait;

    struct Empty;

    #[async_trait]
    impl SnapshotSource for Empty {
        async fn request_snapshot(
            &self,
            _key: &SessionKey,
        ) -> std::result::Result<Option<SessionSnapshot>, String> {
            Ok(None)
        }
    }

    // Single test so parallel test threads never race on the shared static.
    #[test]
    fn init_global_reset_lifecycle() {
        reset();
        assert_eq!(global().err(), Some(CacheError::NotInitialized));

        let store = SessionCacheStore::new(CacheConfig::default(), Arc::new(Empty));
        let installed = init(store);
        let found = global().unwrap();
        assert!(Arc::ptr_eq(&installed, &found));

        reset();
        assert!(global().is_err());
        assert!(installed.is_empty());
    }
}
