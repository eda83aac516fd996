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

//! The repository format: control blobs, their encryption, and password rotation.
//!
//! A repository is described by two control blobs. The repository blob holds the plaintext
//! parameters needed to derive the format encryption key from the password, along with the
//! repository configuration encrypted with that key. The blob-layout blob holds the blob-layout
//! configuration, encrypted with the same key.
//!
//! [`FormatManager`] is the only thing which reads and writes these blobs. New repositories are
//! created with [`CreateOptions`].

pub use self::cache::{BlobCache, CacheStats};
pub use self::config::{BlobLayout, HashAlgorithm, RepoConfig, Retention, RetentionMode};
pub use self::encryption::{Encryption, EncryptionKey, KdfParams, KeySalt, ResourceLimit};
pub use self::manager::{FormatManager, RotationPhase};
pub use self::metadata::{peek_info, RepoInfo};
pub use self::options::CreateOptions;

mod cache;
mod codec;
mod config;
mod encryption;
mod manager;
mod metadata;
mod options;
