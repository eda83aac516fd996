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

//! In-memory caching of control blobs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::trace;

use crate::store::BlobId;

/// A thread-safe cache of blob contents keyed by blob ID.
///
/// Entries never expire. An entry stays valid until it is explicitly removed with [`invalidate`],
/// so every operation which changes a blob in the store must invalidate its entry, or readers will
/// keep seeing the old contents.
///
/// [`invalidate`]: crate::format::BlobCache::invalidate
#[derive(Debug, Default)]
pub struct BlobCache {
    entries: RwLock<HashMap<BlobId, Vec<u8>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlobCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the contents of the blob with the given `id` from the cache.
    ///
    /// Returns `None` if the blob is not cached.
    pub fn get(&self, id: &BlobId) -> Option<Vec<u8>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(id) {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(bytes.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store the contents of the blob with the given `id` in the cache.
    pub fn put(&self, id: BlobId, bytes: Vec<u8>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, bytes);
    }

    /// Remove the blobs with the given `ids` from the cache.
    pub fn invalidate<'a>(&self, ids: impl IntoIterator<Item = &'a BlobId>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            if entries.remove(id).is_some() {
                trace!(blob = %id, "invalidated cached blob");
            }
        }
    }

    /// Remove all blobs from the cache.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Get cache statistics for monitoring and debugging.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// The number of cached blobs.
    pub entries: usize,

    /// The number of lookups which found a cached blob.
    pub hits: u64,

    /// The number of lookups which did not find a cached blob.
    pub misses: u64,
}
