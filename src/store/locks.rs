//! Per-image sharded locking (spec §5, §9 REDESIGN FLAG).
//!
//! The source does a non-atomic `rmdir; write` on manifest PUT and a
//! read-then-delete during cleanup, both racy under concurrent requests.
//! Here every manifest PUT and `CleanupImage` takes the per-image lock
//! exclusively; every blob PUT/GET takes it shared. No IO happens across the
//! lock boundary to an external client — only the filesystem mutation itself
//! is guarded.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Default)]
pub struct ImageLocks {
    shards: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl ImageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn shard(&self, image: &str) -> Arc<RwLock<()>> {
        let mut shards = self.shards.lock().await;
        shards
            .entry(image.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Shared lock for blob PUT/GET against `image`.
    pub async fn read(&self, image: &str) -> OwnedRwLockReadGuard<()> {
        self.shard(image).await.read_owned().await
    }

    /// Exclusive lock for manifest PUT and `CleanupImage` against `image`.
    pub async fn write(&self, image: &str) -> OwnedRwLockWriteGuard<()> {
        self.shard(image).await.write_owned().await
    }
}
