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

use crate::store::BlobStore;
use crate::Secret;

use super::config::{BlobLayout, HashAlgorithm, RepoConfig, Retention};
use super::encryption::{Encryption, ResourceLimit};
use super::manager::FormatManager;

/// Options and flags which can be used to create a new repository.
///
/// This type provides a builder API for creating a repository in a [`BlobStore`]. Start with
/// [`new`], chain calls to methods to configure the repository, and finish with [`create`] to
/// write the control blobs and get a [`FormatManager`].
///
/// Existing repositories are opened with [`FormatManager::open`].
///
/// # Examples
/// ```
/// use repo_format::format::{CreateOptions, ResourceLimit};
/// use repo_format::store::{MemoryConfig, OpenStore};
/// use repo_format::Secret;
///
/// let store_config = MemoryConfig::new();
/// let manager = CreateOptions::new()
///     .memory_limit(ResourceLimit::Interactive)
///     .enable_password_change(false)
///     .create(store_config.open().unwrap(), Secret::new("password"))
///     .unwrap();
///
/// assert!(!manager.supports_password_change());
/// ```
///
/// [`BlobStore`]: crate::store::BlobStore
/// [`new`]: crate::format::CreateOptions::new
/// [`create`]: crate::format::CreateOptions::create
/// [`FormatManager`]: crate::format::FormatManager
/// [`FormatManager::open`]: crate::format::FormatManager::open
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    config: RepoConfig,
    blob_layout: BlobLayout,
}

impl CreateOptions {
    /// Create a new `CreateOptions` with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given `config` instead of the default `RepoConfig`.
    pub fn config(&mut self, config: RepoConfig) -> &mut Self {
        self.config = config;
        self
    }

    /// Overwrite the encryption method specified in [`RepoConfig::encryption`].
    ///
    /// [`RepoConfig::encryption`]: crate::format::RepoConfig::encryption
    pub fn encryption(&mut self, method: Encryption) -> &mut Self {
        self.config.encryption = method;
        self
    }

    /// Overwrite the memory limit specified in [`RepoConfig::memory_limit`].
    ///
    /// [`RepoConfig::memory_limit`]: crate::format::RepoConfig::memory_limit
    pub fn memory_limit(&mut self, limit: ResourceLimit) -> &mut Self {
        self.config.memory_limit = limit;
        self
    }

    /// Overwrite the operations limit specified in [`RepoConfig::operations_limit`].
    ///
    /// [`RepoConfig::operations_limit`]: crate::format::RepoConfig::operations_limit
    pub fn operations_limit(&mut self, limit: ResourceLimit) -> &mut Self {
        self.config.operations_limit = limit;
        self
    }

    /// Overwrite the hash algorithm specified in [`RepoConfig::hash`].
    ///
    /// [`RepoConfig::hash`]: crate::format::RepoConfig::hash
    pub fn hash(&mut self, algorithm: HashAlgorithm) -> &mut Self {
        self.config.hash = algorithm;
        self
    }

    /// Overwrite the maximum pack size specified in [`RepoConfig::max_pack_size`].
    ///
    /// [`RepoConfig::max_pack_size`]: crate::format::RepoConfig::max_pack_size
    pub fn max_pack_size(&mut self, size: u32) -> &mut Self {
        self.config.max_pack_size = size;
        self
    }

    /// Set whether the password of the repository can be changed.
    pub fn enable_password_change(&mut self, enable: bool) -> &mut Self {
        self.config.enable_password_change = enable;
        self
    }

    /// Use the given `layout` instead of the default `BlobLayout`.
    pub fn blob_layout(&mut self, layout: BlobLayout) -> &mut Self {
        self.blob_layout = layout;
        self
    }

    /// Overwrite the retention policy specified in [`BlobLayout::retention`].
    ///
    /// [`BlobLayout::retention`]: crate::format::BlobLayout::retention
    pub fn retention(&mut self, retention: Option<Retention>) -> &mut Self {
        self.blob_layout.retention = retention;
        self
    }

    /// Create a new repository in `store` protected by `password`.
    ///
    /// # Errors
    /// - `Error::AlreadyExists`: There is already a repository in the blob store.
    /// - `Error::EmptyPassword`: The password is empty.
    /// - `Error::Derivation`: The key could not be derived from the password.
    /// - `Error::Encoding`: The control blobs could not be encoded.
    /// - `Error::Persistence`: A control blob could not be written.
    /// - `Error::Store`: An error occurred with the blob store.
    pub fn create(
        &self,
        store: impl BlobStore + 'static,
        password: Secret,
    ) -> crate::Result<FormatManager> {
        FormatManager::create(
            store,
            password,
            self.config.clone(),
            self.blob_layout.clone(),
        )
    }
}
