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

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::bail;

use repo_format::store::{BlobId, BlobStore, MemoryStore};

/// Failures to inject into a `FaultyStore`, and counters of the calls it received.
#[derive(Debug, Default)]
pub struct Faults {
    puts: AtomicUsize,
    gets: AtomicUsize,
    failing_ids: Mutex<HashSet<BlobId>>,
    remaining_puts: Mutex<Option<usize>>,
}

impl Faults {
    /// Make every write of the blob with the given `id` fail.
    pub fn fail_puts_to(&self, id: BlobId) {
        self.failing_ids.lock().unwrap().insert(id);
    }

    /// Allow `count` more writes to succeed and make every write after that fail.
    pub fn fail_puts_after(&self, count: usize) {
        *self.remaining_puts.lock().unwrap() = Some(count);
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.failing_ids.lock().unwrap().clear();
        *self.remaining_puts.lock().unwrap() = None;
    }

    /// The number of writes attempted.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// The number of reads attempted.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn check_put(&self, id: &BlobId) -> anyhow::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);

        if self.failing_ids.lock().unwrap().contains(id) {
            bail!("injected write failure for {}", id);
        }

        let mut remaining = self.remaining_puts.lock().unwrap();
        match remaining.as_mut() {
            Some(0) => bail!("injected write failure for {}", id),
            Some(count) => *count -= 1,
            None => {}
        }

        Ok(())
    }
}

/// A `MemoryStore` which counts calls and fails on demand.
#[derive(Debug, Clone)]
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Arc<Faults>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore, faults: Arc<Faults>) -> Self {
        FaultyStore { inner, faults }
    }
}

impl BlobStore for FaultyStore {
    fn put_blob(&mut self, id: &BlobId, data: &[u8]) -> anyhow::Result<()> {
        self.faults.check_put(id)?;
        self.inner.put_blob(id, data)
    }

    fn get_blob(&mut self, id: &BlobId) -> anyhow::Result<Option<Vec<u8>>> {
        self.faults.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_blob(id)
    }

    fn delete_blob(&mut self, id: &BlobId) -> anyhow::Result<()> {
        self.inner.delete_blob(id)
    }

    fn list_blobs(&mut self) -> anyhow::Result<Vec<BlobId>> {
        self.inner.list_blobs()
    }
}
