//! Filesystem-backed context store.

use super::ContextStore;
use crate::context::{PersistedContext, Progress, SCHEMA_VERSION};
use crate::errors::StoreError;
use crate::utils::sha256_hex;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const CONTEXT_FILE: &str = "context.json";
const PROGRESS_FILE: &str = "progress.json";

/// Directory name of the store inside a target directory.
pub const STATE_DIR: &str = ".releaseflow";

/// Stores contexts as JSON files.
///
/// Layout: `<root>/<first 16 hex of sha256(config dir)>/{context,progress}.json`
#[derive(Debug, Clone)]
pub struct FsContextStore {
    root: PathBuf,
}

#[derive(Deserialize)]
struct SchemaProbe {
    schema_version: u32,
}

impl FsContextStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the store kept inside a release target directory.
    #[must_use]
    pub fn in_target_dir(target_dir: impl AsRef<Path>) -> Self {
        Self::new(target_dir.as_ref().join(STATE_DIR))
    }

    /// The store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, key: &Path) -> PathBuf {
        let digest = sha256_hex(key.to_string_lossy().as_bytes());
        self.root.join(&digest[..16])
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(path, &err)),
        };

        let probe: SchemaProbe = serde_json::from_str(&content).map_err(|err| serde_error(path, &err))?;
        if probe.schema_version > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: probe.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| serde_error(path, &err))
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn serde_error(path: &Path, err: &serde_json::Error) -> StoreError {
    StoreError::Serialization {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| io_error(path, &std::io::Error::other("path has no parent")))?;
    std::fs::create_dir_all(dir).map_err(|err| io_error(dir, &err))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| io_error(dir, &err))?;
    tmp.write_all(content).map_err(|err| io_error(path, &err))?;
    tmp.as_file().sync_all().map_err(|err| io_error(path, &err))?;
    tmp.persist(path).map_err(|err| io_error(path, &err.error))?;
    Ok(())
}

#[async_trait]
impl ContextStore for FsContextStore {
    async fn load(&self, key: &Path) -> Result<Option<PersistedContext>, StoreError> {
        Self::read_json(&self.entry_dir(key).join(CONTEXT_FILE)).await
    }

    async fn load_progress(&self, key: &Path) -> Result<Option<Progress>, StoreError> {
        Self::read_json(&self.entry_dir(key).join(PROGRESS_FILE)).await
    }

    async fn save(&self, context: &PersistedContext) -> Result<(), StoreError> {
        let dir = self.entry_dir(context.config_directory());
        let context_path = dir.join(CONTEXT_FILE);
        let progress_path = dir.join(PROGRESS_FILE);
        let full = serde_json::to_vec_pretty(context).map_err(|err| serde_error(&context_path, &err))?;
        let progress = serde_json::to_vec_pretty(&context.progress())
            .map_err(|err| serde_error(&progress_path, &err))?;

        debug!(
            path = %context_path.display(),
            revision = context.revision(),
            "Writing pipeline checkpoint"
        );
        tokio::task::spawn_blocking(move || {
            write_atomic(&context_path, &full)?;
            write_atomic(&progress_path, &progress)
        })
        .await
        .map_err(|err| StoreError::Io {
            path: dir,
            message: err.to_string(),
        })?
    }

    async fn clear(&self, key: &Path) -> Result<(), StoreError> {
        let dir = self.entry_dir(key);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&dir, &err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextDelta;
    use crate::core::StageId;
    use pretty_assertions::assert_eq;

    fn make_store() -> (tempfile::TempDir, FsContextStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContextStore::in_target_dir(dir.path());
        (dir, store)
    }

    fn sample_context() -> PersistedContext {
        let mut ctx = PersistedContext::new("/configs/demo", "sig");
        ctx.apply(ContextDelta::new().with_full_version("1.0.0.CR1")).unwrap();
        ctx.mark_completed(StageId::Configure);
        ctx.next_revision();
        ctx
    }

    #[tokio::test]
    async fn test_missing_context_loads_as_none() {
        let (_dir, store) = make_store();
        assert!(store.load(Path::new("/configs/demo")).await.unwrap().is_none());
        assert!(store.load_progress(Path::new("/configs/demo")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let (_dir, store) = make_store();
        let ctx = sample_context();
        store.save(&ctx).await.unwrap();

        let loaded = store.load(Path::new("/configs/demo")).await.unwrap().unwrap();
        assert_eq!(loaded, ctx);

        let progress = store
            .load_progress(Path::new("/configs/demo"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress, ctx.progress());
    }

    #[tokio::test]
    async fn test_contexts_are_keyed_by_directory() {
        let (_dir, store) = make_store();
        store.save(&sample_context()).await.unwrap();
        assert!(store.load(Path::new("/configs/other")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let (_dir, store) = make_store();
        let ctx = sample_context();
        store.save(&ctx).await.unwrap();

        let path = store.entry_dir(ctx.config_directory()).join(CONTEXT_FILE);
        let mut value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        value["schema_version"] = serde_json::json!(SCHEMA_VERSION + 1);
        std::fs::write(&path, value.to_string()).unwrap();

        let err = store.load(ctx.config_directory()).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::UnsupportedSchema {
                found: SCHEMA_VERSION + 1,
                supported: SCHEMA_VERSION
            }
        );
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let (_dir, store) = make_store();
        let ctx = sample_context();
        store.save(&ctx).await.unwrap();
        let path = store.entry_dir(ctx.config_directory()).join(CONTEXT_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        let err = store.load(ctx.config_directory()).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_clear() {
        let (_dir, store) = make_store();
        let ctx = sample_context();
        store.save(&ctx).await.unwrap();
        store.clear(ctx.config_directory()).await.unwrap();
        store.clear(ctx.config_directory()).await.unwrap();
        assert!(store.load(ctx.config_directory()).await.unwrap().is_none());
    }
}
