//! Durable storage of pipeline contexts.
//!
//! A store keeps one context per configuration directory. The full record is
//! authoritative; the progress index is a small projection that can be read
//! without deserialising build results and manifests.

mod fs;
mod memory;

pub use fs::FsContextStore;
pub use memory::InMemoryContextStore;

use crate::context::{PersistedContext, Progress};
use crate::errors::StoreError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

/// Storage of persisted contexts keyed by configuration directory.
#[async_trait]
pub trait ContextStore: Send + Sync + Debug {
    /// Loads the full context recorded for a configuration directory.
    async fn load(&self, key: &Path) -> Result<Option<PersistedContext>, StoreError>;

    /// Loads only the progress index.
    async fn load_progress(&self, key: &Path) -> Result<Option<Progress>, StoreError>;

    /// Writes a checkpoint. Either the whole record is written or the previous
    /// one remains readable.
    async fn save(&self, context: &PersistedContext) -> Result<(), StoreError>;

    /// Removes the recorded context.
    async fn clear(&self, key: &Path) -> Result<(), StoreError>;
}
