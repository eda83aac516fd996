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

use hex_literal::hex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{BlobStore, REPOSITORY_BLOB_ID};

use super::codec::decode_repository_blob;
use super::encryption::{Encryption, KdfParams, ResourceLimit};

/// The current repository format version ID.
///
/// This must be changed any time a backwards-incompatible change is made to the format of the
/// control blobs.
pub(super) const FORMAT_VERSION: Uuid =
    Uuid::from_bytes(hex!("5c3a1e0e 6a43 11ee 9d6f 7b2d0c4f8a11"));

/// The contents of the repository blob.
///
/// Everything except `encrypted_config` is stored in plaintext, since it is needed to derive the
/// key which decrypts the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct RepositoryBlob {
    /// The version of the format of the control blobs.
    pub format_version: Uuid,

    /// The unique ID of this repository.
    pub unique_id: Uuid,

    /// The encryption method used for the control blobs.
    pub encryption: Encryption,

    /// The parameters used to derive the format encryption key from the password.
    pub kdf: KdfParams,

    /// The BLAKE3 hash of the current contents of the blob-layout blob.
    pub blob_layout_digest: [u8; 32],

    /// The serialized `RepoConfig`, encrypted with the format encryption key.
    pub encrypted_config: Vec<u8>,
}

impl RepositoryBlob {
    /// Create a `RepoInfo` using the plaintext metadata in this blob.
    pub fn to_info(&self) -> RepoInfo {
        RepoInfo {
            id: self.unique_id,
            encryption: self.encryption,
            memory_limit: self.kdf.memory_limit,
            operations_limit: self.kdf.operations_limit,
        }
    }
}

/// Information about a repository which can be read without its password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    id: Uuid,
    encryption: Encryption,
    memory_limit: ResourceLimit,
    operations_limit: ResourceLimit,
}

impl RepoInfo {
    /// The unique ID for this repository.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The encryption method used for the control blobs.
    pub fn encryption(&self) -> Encryption {
        self.encryption
    }

    /// The memory limit used to derive the format encryption key.
    pub fn memory_limit(&self) -> ResourceLimit {
        self.memory_limit
    }

    /// The operations limit used to derive the format encryption key.
    pub fn operations_limit(&self) -> ResourceLimit {
        self.operations_limit
    }
}

/// Return information about the repository in `store` without opening it.
///
/// This does not require the password and does not derive any keys.
///
/// # Errors
/// - `Error::NotFound`: There is no repository in the blob store.
/// - `Error::Corrupt`: The repository is corrupt.
/// - `Error::UnsupportedFormat`: The repository is an unsupported format.
/// - `Error::Store`: An error occurred with the blob store.
pub fn peek_info(store: &mut impl BlobStore) -> crate::Result<RepoInfo> {
    let bytes = store
        .get_blob(&REPOSITORY_BLOB_ID)
        .map_err(crate::Error::Store)?
        .ok_or(crate::Error::NotFound)?;
    Ok(decode_repository_blob(&bytes)?.to_info())
}
