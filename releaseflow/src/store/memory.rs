//! In-memory context store.

use super::ContextStore;
use crate::context::{PersistedContext, Progress};
use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Keeps serialised contexts in memory.
///
/// Records go through JSON like the filesystem store, so a context that
/// cannot round-trip fails here too.
#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    records: DashMap<PathBuf, String>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl InMemoryContextStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes subsequent saves fail with an I/O error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Returns true if no context is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn serde_error(key: &Path, err: &serde_json::Error) -> StoreError {
    StoreError::Serialization {
        path: key.to_path_buf(),
        message: err.to_string(),
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn load(&self, key: &Path) -> Result<Option<PersistedContext>, StoreError> {
        self.records
            .get(key)
            .map(|json| serde_json::from_str(json.value()).map_err(|err| serde_error(key, &err)))
            .transpose()
    }

    async fn load_progress(&self, key: &Path) -> Result<Option<Progress>, StoreError> {
        Ok(self.load(key).await?.map(|ctx| ctx.progress()))
    }

    async fn save(&self, context: &PersistedContext) -> Result<(), StoreError> {
        let key = context.config_directory();
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: key.to_path_buf(),
                message: "injected save failure".to_string(),
            });
        }
        let json = serde_json::to_string(context).map_err(|err| serde_error(key, &err))?;
        self.records.insert(key.to_path_buf(), json);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self, key: &Path) -> Result<(), StoreError> {
        self.records.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_failure_injection() {
        let store = InMemoryContextStore::new();
        let ctx = PersistedContext::new("/c", "sig");
        store.save(&ctx).await.unwrap();
        assert_eq!(store.load(Path::new("/c")).await.unwrap(), Some(ctx.clone()));
        assert_eq!(store.save_count(), 1);

        store.fail_saves(true);
        assert!(store.save(&ctx).await.is_err());
        assert_eq!(store.save_count(), 1);
    }
}
