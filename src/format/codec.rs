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

use rmp_serde::{from_read, to_vec};

use crate::store::{BLOB_LAYOUT_BLOB_ID, REPOSITORY_BLOB_ID};

use super::config::{BlobLayout, RepoConfig};
use super::encryption::{Encryption, EncryptionKey};
use super::metadata::{RepositoryBlob, FORMAT_VERSION};

/// Return the digest of the serialized blob-layout blob which is recorded in the repository blob.
pub(super) fn layout_digest(blob_layout_bytes: &[u8]) -> [u8; 32] {
    *blake3::hash(blob_layout_bytes).as_bytes()
}

/// Serialize the repository blob.
pub(super) fn encode_repository_blob(blob: &RepositoryBlob) -> crate::Result<Vec<u8>> {
    to_vec(blob).map_err(|error| crate::Error::Encoding(error.to_string()))
}

/// Deserialize the repository blob and check its format version.
///
/// # Errors
/// - `Error::Corrupt`: The blob could not be deserialized.
/// - `Error::UnsupportedFormat`: The blob was written with a different format version.
pub(super) fn decode_repository_blob(bytes: &[u8]) -> crate::Result<RepositoryBlob> {
    let blob: RepositoryBlob = from_read(bytes).map_err(|_| crate::Error::Corrupt)?;
    if blob.format_version != FORMAT_VERSION {
        return Err(crate::Error::UnsupportedFormat);
    }
    Ok(blob)
}

/// Encrypts and decrypts the contents of the control blobs with a format encryption key.
///
/// Each ciphertext is authenticated together with the ID of the control blob it belongs to, so a
/// blob-layout ciphertext can't be passed off as a repository configuration or vice versa.
#[derive(Debug)]
pub(super) struct ControlBlobCodec<'a> {
    encryption: Encryption,
    key: &'a EncryptionKey,
}

impl<'a> ControlBlobCodec<'a> {
    pub fn new(encryption: Encryption, key: &'a EncryptionKey) -> Self {
        ControlBlobCodec { encryption, key }
    }

    /// Serialize and encrypt the repository configuration.
    pub fn encrypt_config(&self, config: &RepoConfig) -> crate::Result<Vec<u8>> {
        let serialized = to_vec(config).map_err(|error| crate::Error::Encoding(error.to_string()))?;
        self.encryption
            .seal(self.key, REPOSITORY_BLOB_ID.as_str().as_bytes(), &serialized)
    }

    /// Decrypt and deserialize the repository configuration.
    ///
    /// # Errors
    /// - `Error::Password`: The configuration could not be decrypted with this key.
    /// - `Error::Corrupt`: The decrypted configuration could not be deserialized.
    pub fn decrypt_config(&self, encrypted_config: &[u8]) -> crate::Result<RepoConfig> {
        let serialized = self
            .encryption
            .open(
                self.key,
                REPOSITORY_BLOB_ID.as_str().as_bytes(),
                encrypted_config,
            )
            .ok_or(crate::Error::Password)?;
        from_read(serialized.as_slice()).map_err(|_| crate::Error::Corrupt)
    }

    /// Serialize and encrypt the blob-layout blob.
    pub fn encode_blob_layout(&self, layout: &BlobLayout) -> crate::Result<Vec<u8>> {
        let serialized = to_vec(layout).map_err(|error| crate::Error::Encoding(error.to_string()))?;
        self.encryption
            .seal(self.key, BLOB_LAYOUT_BLOB_ID.as_str().as_bytes(), &serialized)
    }

    /// Decrypt and deserialize the blob-layout blob.
    ///
    /// # Errors
    /// - `Error::Corrupt`: The blob could not be decrypted with this key or deserialized.
    pub fn decode_blob_layout(&self, bytes: &[u8]) -> crate::Result<BlobLayout> {
        let serialized = self
            .encryption
            .open(self.key, BLOB_LAYOUT_BLOB_ID.as_str().as_bytes(), bytes)
            .ok_or(crate::Error::Corrupt)?;
        from_read(serialized.as_slice()).map_err(|_| crate::Error::Corrupt)
    }

    /// Encode both control blobs for the given state.
    ///
    /// The plaintext fields of the repository blob are copied from `header`.
    pub fn encode_control_blobs(
        &self,
        header: &RepositoryBlob,
        config: &RepoConfig,
        layout: &BlobLayout,
    ) -> crate::Result<EncodedControlBlobs> {
        let blob_layout_bytes = self.encode_blob_layout(layout)?;
        let repository = RepositoryBlob {
            blob_layout_digest: layout_digest(&blob_layout_bytes),
            encrypted_config: self.encrypt_config(config)?,
            ..header.clone()
        };
        let repository_bytes = encode_repository_blob(&repository)?;
        Ok(EncodedControlBlobs {
            repository,
            repository_bytes,
            blob_layout_bytes,
        })
    }
}

/// Both control blobs, encoded and ready to be written.
///
/// The blob-layout blob must be written before the repository blob, because the repository blob
/// records the digest of the blob-layout blob.
#[derive(Debug)]
pub(super) struct EncodedControlBlobs {
    /// The repository blob.
    pub repository: RepositoryBlob,

    /// The serialized repository blob.
    pub repository_bytes: Vec<u8>,

    /// The encrypted blob-layout blob.
    pub blob_layout_bytes: Vec<u8>,
}
