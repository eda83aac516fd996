/*
 * Copyright 2019-2021 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;

use super::blob_store::{BlobId, BlobStore};
use super::open_store::OpenStore;

type BlobMap = Arc<Mutex<HashMap<BlobId, Vec<u8>>>>;

fn lock_blobs(blobs: &BlobMap) -> anyhow::Result<MutexGuard<'_, HashMap<BlobId, Vec<u8>>>> {
    blobs
        .lock()
        .map_err(|_| anyhow!("The memory store was poisoned by a panicking thread."))
}

/// The configuration for opening a [`MemoryStore`].
///
/// Every store opened from the same `MemoryConfig`, or from a clone of it, shares the same blobs.
/// This makes it possible to open a repository, drop it, and then open it again.
///
/// [`MemoryStore`]: crate::store::MemoryStore
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    blobs: BlobMap,
}

impl MemoryConfig {
    /// Create a new `MemoryConfig` backed by an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OpenStore for MemoryConfig {
    type Store = MemoryStore;

    fn open(&self) -> crate::Result<Self::Store> {
        Ok(MemoryStore {
            blobs: Arc::clone(&self.blobs),
        })
    }
}

/// A `BlobStore` which stores data in memory.
///
/// Unlike other `BlobStore` implementations, data in a `MemoryStore` is not stored persistently
/// and is only accessible to the current process. This blob store is useful for testing.
///
/// You can use [`MemoryConfig`] to open a blob store of this type.
///
/// [`MemoryConfig`]: crate::store::MemoryConfig
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: BlobMap,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn put_blob(&mut self, id: &BlobId, data: &[u8]) -> anyhow::Result<()> {
        lock_blobs(&self.blobs)?.insert(id.clone(), data.to_vec());
        Ok(())
    }

    fn get_blob(&mut self, id: &BlobId) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(lock_blobs(&self.blobs)?.get(id).cloned())
    }

    fn delete_blob(&mut self, id: &BlobId) -> anyhow::Result<()> {
        lock_blobs(&self.blobs)?.remove(id);
        Ok(())
    }

    fn list_blobs(&mut self) -> anyhow::Result<Vec<BlobId>> {
        Ok(lock_blobs(&self.blobs)?.keys().cloned().collect())
    }
}
