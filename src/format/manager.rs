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

use std::fmt::{self, Debug, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::signing::SigningKeyCallback;
use crate::store::{
    is_control_blob, BlobId, BlobStore, BLOB_LAYOUT_BLOB_ID, CONTROL_BLOB_IDS, REPOSITORY_BLOB_ID,
};
use crate::Secret;

use super::cache::{BlobCache, CacheStats};
use super::codec::{decode_repository_blob, layout_digest, ControlBlobCodec, EncodedControlBlobs};
use super::config::{BlobLayout, RepoConfig};
use super::encryption::{EncryptionKey, KdfParams};
use super::metadata::{RepoInfo, RepositoryBlob, FORMAT_VERSION};

/// A step of [`FormatManager::rotate_password`].
///
/// Errors returned by a password rotation can be mapped to the step which failed with
/// [`Error::phase`].
///
/// [`FormatManager::rotate_password`]: crate::format::FormatManager::rotate_password
/// [`Error::phase`]: crate::Error::phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotationPhase {
    /// Checking whether the repository supports password changes.
    Capability,

    /// Deriving the new format encryption key.
    Derivation,

    /// Serializing and encrypting the control blobs.
    Encoding,

    /// Writing the blob-layout blob.
    BlobLayoutWrite,

    /// Writing the repository blob.
    RepositoryWrite,

    /// Notifying the signing key callback.
    Callback,
}

/// The state of a repository which is guarded by the manager's lock.
struct FormatState {
    /// The current password.
    password: Secret,

    /// The format encryption key derived from `password`.
    key: EncryptionKey,

    /// The repository blob as it was last written or read.
    header: RepositoryBlob,

    /// The decrypted repository configuration.
    config: RepoConfig,

    /// The decrypted blob-layout configuration.
    blob_layout: BlobLayout,

    /// The encrypted blob-layout blob as it was last written or read.
    blob_layout_bytes: Vec<u8>,

    /// The password to pass as the old password to the next signing key callback.
    ///
    /// This is set when the control blobs were rewritten but the signing key callback failed.
    pending_signing_update: Option<Secret>,
}

/// The repository state read from the control blobs.
struct LoadedFormat {
    header: RepositoryBlob,
    key: EncryptionKey,
    config: RepoConfig,
    blob_layout: BlobLayout,
    blob_layout_bytes: Vec<u8>,
}

impl LoadedFormat {
    /// Read and decrypt both control blobs from `store`.
    ///
    /// If `known_key` is the key derived from `password` with the given parameters and those
    /// parameters match the ones in the store, it is used instead of deriving the key again.
    fn read(
        store: &mut dyn BlobStore,
        password: &Secret,
        known_key: Option<(&KdfParams, &EncryptionKey)>,
    ) -> crate::Result<Self> {
        let repository_bytes = store
            .get_blob(&REPOSITORY_BLOB_ID)
            .map_err(crate::Error::Store)?
            .ok_or(crate::Error::NotFound)?;
        let header = decode_repository_blob(&repository_bytes)?;

        let key = match known_key {
            Some((params, key)) if *params == header.kdf => key.clone(),
            _ => header
                .kdf
                .derive_key(password, header.encryption.key_size())?,
        };

        let codec = ControlBlobCodec::new(header.encryption, &key);
        let config = codec.decrypt_config(&header.encrypted_config)?;

        // The plaintext copy of these parameters is what the key was derived with, so it must
        // agree with the authenticated copy.
        if config.encryption != header.encryption
            || config.memory_limit != header.kdf.memory_limit
            || config.operations_limit != header.kdf.operations_limit
        {
            return Err(crate::Error::Corrupt);
        }

        let blob_layout_bytes = store
            .get_blob(&BLOB_LAYOUT_BLOB_ID)
            .map_err(crate::Error::Store)?
            .ok_or(crate::Error::Corrupt)?;
        if layout_digest(&blob_layout_bytes) != header.blob_layout_digest {
            return Err(crate::Error::Corrupt);
        }
        let blob_layout = codec.decode_blob_layout(&blob_layout_bytes)?;

        Ok(LoadedFormat {
            header,
            key,
            config,
            blob_layout,
            blob_layout_bytes,
        })
    }
}

/// The authority over the control blobs of a repository.
///
/// A `FormatManager` owns the repository's current password, the format encryption key derived
/// from it, and the decrypted repository configuration. It is the only thing which reads or writes
/// the repository's control blobs.
///
/// All of the mutable state is guarded by a single lock. Password rotation holds the write side of
/// the lock for its entire duration, including all I/O and the signing key callback, and every
/// method which reads the state takes the read side. This means readers always observe either the
/// old password, key, and configuration or the new ones, never a mix of the two.
///
/// A `FormatManager` is `Send` and `Sync`, so it can be shared between threads with an `Arc`.
pub struct FormatManager {
    state: RwLock<FormatState>,
    store: Mutex<Box<dyn BlobStore>>,
    cache: BlobCache,
}

impl FormatManager {
    /// Create a new repository in `store` with the given `config` and `blob_layout`.
    pub(super) fn create(
        mut store: impl BlobStore + 'static,
        password: Secret,
        config: RepoConfig,
        blob_layout: BlobLayout,
    ) -> crate::Result<Self> {
        if password.is_empty() {
            return Err(crate::Error::EmptyPassword);
        }

        // Check if the repository already exists.
        if store
            .get_blob(&REPOSITORY_BLOB_ID)
            .map_err(crate::Error::Store)?
            .is_some()
        {
            return Err(crate::Error::AlreadyExists);
        }

        let kdf = KdfParams::generate(config.memory_limit, config.operations_limit);
        let key = kdf.derive_key(&password, config.encryption.key_size())?;

        let template = RepositoryBlob {
            format_version: FORMAT_VERSION,
            unique_id: Uuid::new_v4(),
            encryption: config.encryption,
            kdf,
            blob_layout_digest: [0u8; 32],
            encrypted_config: Vec::new(),
        };
        let EncodedControlBlobs {
            repository,
            repository_bytes,
            blob_layout_bytes,
        } = ControlBlobCodec::new(config.encryption, &key).encode_control_blobs(
            &template,
            &config,
            &blob_layout,
        )?;

        // The repository blob is written last because it signifies that the repository is done
        // being created.
        store
            .put_blob(&BLOB_LAYOUT_BLOB_ID, &blob_layout_bytes)
            .map_err(|source| crate::Error::Persistence {
                blob: BLOB_LAYOUT_BLOB_ID,
                source,
            })?;
        store
            .put_blob(&REPOSITORY_BLOB_ID, &repository_bytes)
            .map_err(|source| crate::Error::Persistence {
                blob: REPOSITORY_BLOB_ID,
                source,
            })?;

        info!(repository = %repository.unique_id, "created repository");

        Ok(Self::from_parts(
            Box::new(store),
            password,
            LoadedFormat {
                header: repository,
                key,
                config,
                blob_layout,
                blob_layout_bytes,
            },
        ))
    }

    /// Open the repository in `store` with the given `password`.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no repository in the blob store.
    /// - `Error::EmptyPassword`: The password is empty.
    /// - `Error::Password`: The password is invalid.
    /// - `Error::Corrupt`: The repository is corrupt. This is most likely unrecoverable.
    /// - `Error::UnsupportedFormat`: The repository is an unsupported format.
    /// - `Error::Derivation`: The key could not be derived from the password.
    /// - `Error::Store`: An error occurred with the blob store.
    pub fn open(mut store: impl BlobStore + 'static, password: Secret) -> crate::Result<Self> {
        if password.is_empty() {
            return Err(crate::Error::EmptyPassword);
        }

        let loaded = LoadedFormat::read(&mut store, &password, None)?;
        debug!(repository = %loaded.header.unique_id, "opened repository");

        Ok(Self::from_parts(Box::new(store), password, loaded))
    }

    fn from_parts(store: Box<dyn BlobStore>, password: Secret, loaded: LoadedFormat) -> Self {
        FormatManager {
            state: RwLock::new(FormatState {
                password,
                key: loaded.key,
                header: loaded.header,
                config: loaded.config,
                blob_layout: loaded.blob_layout,
                blob_layout_bytes: loaded.blob_layout_bytes,
                pending_signing_update: None,
            }),
            store: Mutex::new(store),
            cache: BlobCache::new(),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, FormatState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, FormatState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_store(&self) -> crate::Result<MutexGuard<'_, Box<dyn BlobStore>>> {
        self.store.lock().map_err(|_| {
            crate::Error::Store(anyhow!(
                "The blob store was poisoned by a panicking thread."
            ))
        })
    }

    /// Change the password of the repository to `new_password`.
    ///
    /// This derives a new format encryption key from `new_password` using the repository's existing
    /// key derivation parameters, rewrites the blob-layout blob and then the repository blob
    /// encrypted with the new key, invalidates the cached copies of both blobs, and finally calls
    /// `callback` with the old and new passwords so that signing keys derived from the password can
    /// be updated.
    ///
    /// The manager's lock is held for the whole operation, so `callback` must not call back into
    /// this `FormatManager`.
    ///
    /// The new password and key are only adopted once both control blobs have been written. If
    /// writing the repository blob fails, the previous blob-layout blob is restored, so a failed
    /// rotation leaves the repository readable with the old password.
    ///
    /// If `callback` fails, the password has already been changed in the store and in memory, and
    /// `Error::Callback` is returned. Calling this method again with the same `new_password` calls
    /// `callback` again with the same old password without rewriting the control blobs. Rotating to
    /// the current password when no callback is pending does nothing.
    ///
    /// # Errors
    /// - `Error::Capability`: The repository does not support changing its password. Nothing is
    /// changed.
    /// - `Error::EmptyPassword`: `new_password` is empty. Nothing is changed.
    /// - `Error::Derivation`: The new key could not be derived.
    /// - `Error::Encoding`: The control blobs could not be encoded.
    /// - `Error::Persistence`: A control blob could not be written.
    /// - `Error::Callback`: `callback` failed after the control blobs were written.
    pub fn rotate_password(
        &self,
        new_password: Secret,
        callback: &dyn SigningKeyCallback,
    ) -> crate::Result<()> {
        let mut state = self.write_state();
        let repository = state.header.unique_id;

        if !state.config.enable_password_change {
            warn!(
                %repository,
                "refused to change the password of a repository which does not support it"
            );
            return Err(crate::Error::Capability);
        }

        if new_password.is_empty() {
            return Err(crate::Error::EmptyPassword);
        }

        // Whatever the signing subsystem last successfully updated to.
        let signing_password = state
            .pending_signing_update
            .clone()
            .unwrap_or_else(|| state.password.clone());

        if state.password == new_password {
            if state.pending_signing_update.is_none() {
                debug!(%repository, "the password is unchanged");
                return Ok(());
            }
            info!(%repository, "retrying the signing key update for the current password");
            return Self::update_signing_key(&mut state, signing_password, new_password, callback);
        }

        let new_key = state
            .header
            .kdf
            .derive_key(&new_password, state.header.encryption.key_size())?;

        let encoded = ControlBlobCodec::new(state.header.encryption, &new_key)
            .encode_control_blobs(&state.header, &state.config, &state.blob_layout)?;

        let persisted = self.persist_control_blobs(&encoded, &state.blob_layout_bytes);

        // The store may have changed even if persisting failed.
        self.cache.invalidate(&CONTROL_BLOB_IDS);
        persisted?;

        let EncodedControlBlobs {
            repository: header,
            blob_layout_bytes,
            ..
        } = encoded;
        state.header = header;
        state.blob_layout_bytes = blob_layout_bytes;
        state.key = new_key;
        state.password = new_password.clone();

        info!(%repository, "changed the repository password");

        Self::update_signing_key(&mut state, signing_password, new_password, callback)
    }

    /// Write both control blobs, restoring the previous blob-layout blob if the repository blob
    /// can't be written.
    fn persist_control_blobs(
        &self,
        encoded: &EncodedControlBlobs,
        previous_blob_layout: &[u8],
    ) -> crate::Result<()> {
        let mut store = self.lock_store()?;

        store
            .put_blob(&BLOB_LAYOUT_BLOB_ID, &encoded.blob_layout_bytes)
            .map_err(|source| crate::Error::Persistence {
                blob: BLOB_LAYOUT_BLOB_ID,
                source,
            })?;

        if let Err(source) = store.put_blob(&REPOSITORY_BLOB_ID, &encoded.repository_bytes) {
            match store.put_blob(&BLOB_LAYOUT_BLOB_ID, previous_blob_layout) {
                Ok(()) => warn!(
                    error = %source,
                    "failed to write the repository blob; restored the previous blob-layout blob"
                ),
                Err(restore_error) => error!(
                    error = %source,
                    restore_error = %restore_error,
                    "failed to write the repository blob and to restore the previous blob-layout \
                    blob; the repository can not be opened until the blob-layout blob is restored"
                ),
            }
            return Err(crate::Error::Persistence {
                blob: REPOSITORY_BLOB_ID,
                source,
            });
        }

        Ok(())
    }

    fn update_signing_key(
        state: &mut FormatState,
        old_password: Secret,
        new_password: Secret,
        callback: &dyn SigningKeyCallback,
    ) -> crate::Result<()> {
        // Recorded up front so a panicking callback is still retried.
        state.pending_signing_update = Some(old_password.clone());

        match callback.update_signing_key(&old_password, &new_password) {
            Ok(()) => {
                state.pending_signing_update = None;
                Ok(())
            }
            Err(error) => {
                warn!(
                    repository = %state.header.unique_id,
                    %error,
                    "the password was changed but the signing key could not be updated"
                );
                Err(crate::Error::Callback(error))
            }
        }
    }

    /// Re-read both control blobs from the store.
    ///
    /// This discards the cached control blobs and replaces the in-memory configuration with what is
    /// currently in the store. This is useful when the control blobs may have been changed by
    /// another process.
    ///
    /// # Errors
    /// - `Error::NotFound`: The repository blob no longer exists.
    /// - `Error::Password`: The control blobs can no longer be decrypted with the current password.
    /// - `Error::Corrupt`: The repository is corrupt.
    /// - `Error::UnsupportedFormat`: The repository is an unsupported format.
    /// - `Error::Store`: An error occurred with the blob store.
    pub fn refresh(&self) -> crate::Result<()> {
        let mut state = self.write_state();
        self.cache.invalidate(&CONTROL_BLOB_IDS);

        let loaded = {
            let mut store = self.lock_store()?;
            LoadedFormat::read(
                &mut **store,
                &state.password,
                Some((&state.header.kdf, &state.key)),
            )?
        };

        state.key = loaded.key;
        state.header = loaded.header;
        state.config = loaded.config;
        state.blob_layout = loaded.blob_layout;
        state.blob_layout_bytes = loaded.blob_layout_bytes;

        debug!(repository = %state.header.unique_id, "refreshed the control blobs");
        Ok(())
    }

    /// Return the contents of the control blob with the given `id`.
    ///
    /// This returns the cached copy if there is one; otherwise it reads the blob from the store and
    /// caches it.
    ///
    /// # Errors
    /// - `Error::NotControlBlob`: `id` does not identify a control blob.
    /// - `Error::NotFound`: The blob does not exist.
    /// - `Error::Store`: An error occurred with the blob store.
    pub fn read_control_blob(&self, id: &BlobId) -> crate::Result<Vec<u8>> {
        if !is_control_blob(id) {
            return Err(crate::Error::NotControlBlob(id.clone()));
        }

        // Hold the read lock so a rotation can't invalidate the cache between reading the store
        // and populating the cache.
        let _state = self.read_state();

        if let Some(bytes) = self.cache.get(id) {
            return Ok(bytes);
        }

        let bytes = self
            .lock_store()?
            .get_blob(id)
            .map_err(crate::Error::Store)?
            .ok_or(crate::Error::NotFound)?;
        self.cache.put(id.clone(), bytes.clone());
        Ok(bytes)
    }

    /// Call `f` with the current password, format encryption key, and configuration.
    ///
    /// The three values are read under the same lock, so they always belong together.
    pub fn with_credentials<T>(
        &self,
        f: impl FnOnce(&Secret, &EncryptionKey, &RepoConfig) -> T,
    ) -> T {
        let state = self.read_state();
        f(&state.password, &state.key, &state.config)
    }

    /// Call `f` with the current format encryption key.
    pub fn with_key<T>(&self, f: impl FnOnce(&EncryptionKey) -> T) -> T {
        f(&self.read_state().key)
    }

    /// Return whether `password` is the current password of the repository.
    pub fn verify_password(&self, password: &Secret) -> bool {
        self.read_state().password == *password
    }

    /// Return a copy of the repository configuration.
    pub fn config(&self) -> RepoConfig {
        self.read_state().config.clone()
    }

    /// Return a copy of the blob-layout configuration.
    pub fn blob_layout(&self) -> BlobLayout {
        self.read_state().blob_layout.clone()
    }

    /// Return the parameters used to derive the format encryption key.
    pub fn kdf_params(&self) -> KdfParams {
        self.read_state().header.kdf.clone()
    }

    /// Return information about the repository.
    pub fn info(&self) -> RepoInfo {
        self.read_state().header.to_info()
    }

    /// Return the unique ID of the repository.
    pub fn unique_id(&self) -> Uuid {
        self.read_state().header.unique_id
    }

    /// Return whether the password of the repository can be changed.
    pub fn supports_password_change(&self) -> bool {
        self.read_state().config.enable_password_change
    }

    /// Return whether a signing key update failed and has not been retried successfully.
    pub fn has_pending_signing_update(&self) -> bool {
        self.read_state().pending_signing_update.is_some()
    }

    /// Return the cache of control blobs.
    pub fn cache(&self) -> &BlobCache {
        &self.cache
    }

    /// Return statistics about the cache of control blobs.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Debug for FormatManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.read_state();
        f.debug_struct("FormatManager")
            .field("repository", &state.header.unique_id)
            .field("config", &state.config)
            .field("blob_layout", &state.blob_layout)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}
