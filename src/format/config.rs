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

use serde::{Deserialize, Serialize};

use super::encryption::{Encryption, ResourceLimit};

/// A hash algorithm used to compute the IDs of content blobs.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[non_exhaustive]
pub enum HashAlgorithm {
    /// The 256-bit BLAKE3 hash of the blob contents.
    Blake3,
}

/// The configuration for a repository.
///
/// This type is used to configure a repository when it is created. Once a repository is created,
/// the config values provided cannot be changed. This type implements `Default` to provide a
/// reasonable default configuration.
///
/// The configuration is stored in the repository blob encrypted with the format encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RepoConfig {
    /// The encryption method used for the control blobs.
    ///
    /// The default value is `Encryption::XChaCha20Poly1305`.
    pub encryption: Encryption,

    /// The maximum amount of memory key derivation will use.
    ///
    /// The default value is `ResourceLimit::Interactive`.
    pub memory_limit: ResourceLimit,

    /// The maximum number of computations key derivation will perform.
    ///
    /// The default value is `ResourceLimit::Interactive`.
    pub operations_limit: ResourceLimit,

    /// The hash algorithm used to address content blobs.
    ///
    /// The default value is `HashAlgorithm::Blake3`.
    pub hash: HashAlgorithm,

    /// The maximum size of a pack of content blobs in bytes.
    ///
    /// The default value is 20 MiB.
    pub max_pack_size: u32,

    /// Whether the password of the repository can be changed.
    ///
    /// The default value is `true`.
    pub enable_password_change: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig {
            encryption: Encryption::XChaCha20Poly1305,
            memory_limit: ResourceLimit::Interactive,
            operations_limit: ResourceLimit::Interactive,
            hash: HashAlgorithm::Blake3,
            max_pack_size: 20 * 1024 * 1024,
            enable_password_change: true,
        }
    }
}

/// The retention mode applied to blobs by a blob store which supports object locking.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum RetentionMode {
    /// Retention can be removed by users with special permissions.
    Governance,

    /// Retention can not be removed by anyone until it expires.
    Compliance,
}

/// A retention policy for blobs.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Retention {
    /// The retention mode.
    pub mode: RetentionMode,

    /// How long blobs are retained after they are written, in seconds.
    pub period_secs: u64,
}

/// The blob-layout configuration of a repository.
///
/// This describes how blobs are laid out in the blob store. It is stored in its own control blob,
/// encrypted with the same key as the repository blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobLayout {
    /// The lengths of the ID prefixes used to shard content blobs into directories.
    ///
    /// The default value is `[1, 3]`.
    pub shards: Vec<u8>,

    /// The retention policy for blobs, if the blob store supports one.
    ///
    /// The default value is `None`.
    pub retention: Option<Retention>,
}

impl Default for BlobLayout {
    fn default() -> Self {
        BlobLayout {
            shards: vec![1, 3],
            retention: None,
        }
    }
}
