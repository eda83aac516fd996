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

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rstest::*;

use repo_format::format::{CreateOptions, FormatManager};
use repo_format::signing::SigningKeyCallback;
use repo_format::store::{BlobStore, MemoryConfig, OpenStore, CONTROL_BLOB_IDS};
use repo_format::Secret;

pub use self::store::{FaultyStore, Faults};

mod store;

pub const OLD_PASSWORD: &str = "old-pw";
pub const NEW_PASSWORD: &str = "new-pw";

/// Install a subscriber which prints log output from the crate when a test fails.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A repository in a memory store which can be made to fail.
pub struct TestRepo {
    pub store_config: MemoryConfig,
    pub faults: Arc<Faults>,
    pub manager: FormatManager,
}

impl TestRepo {
    pub fn create(options: &CreateOptions) -> anyhow::Result<Self> {
        init_logging();
        repo_format::init();

        let store_config = MemoryConfig::new();
        let faults = Arc::new(Faults::default());
        let store = FaultyStore::new(store_config.open()?, Arc::clone(&faults));
        let manager = options.create(store, Secret::new(OLD_PASSWORD))?;
        Ok(TestRepo {
            store_config,
            faults,
            manager,
        })
    }

    /// Open the repository again in a separate store handle.
    pub fn reopen(&self, password: &str) -> repo_format::Result<FormatManager> {
        FormatManager::open(self.store_config.open()?, Secret::new(password))
    }

    /// Return the current contents of both control blobs in the store.
    pub fn control_blobs(&self) -> anyhow::Result<Vec<Option<Vec<u8>>>> {
        let mut store = self.store_config.open()?;
        CONTROL_BLOB_IDS
            .iter()
            .map(|id| store.get_blob(id))
            .collect()
    }
}

#[fixture]
pub fn repo() -> TestRepo {
    TestRepo::create(&CreateOptions::new()).unwrap()
}

#[fixture]
pub fn locked_repo() -> TestRepo {
    TestRepo::create(CreateOptions::new().enable_password_change(false)).unwrap()
}

/// A signing key callback which records the passwords it is called with.
#[derive(Debug, Default)]
pub struct RecordingCallback {
    calls: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingCallback {
    pub fn failing() -> Self {
        let callback = Self::default();
        callback.set_failing(true);
        callback
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl SigningKeyCallback for RecordingCallback {
    fn update_signing_key(
        &self,
        old_password: &Secret,
        new_password: &Secret,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push((
            old_password.reveal().to_string(),
            new_password.reveal().to_string(),
        ));
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("signing key update failed");
        }
        Ok(())
    }
}

/// Return a pair of strings for asserting on recorded callback calls.
pub fn call(old: &str, new: &str) -> (String, String) {
    (old.to_string(), new.to_string())
}
