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

use std::borrow::Cow;
use std::fmt;

use static_assertions::assert_obj_safe;

/// The ID of the control blob which stores the repository format and encrypted configuration.
pub const REPOSITORY_BLOB_ID: BlobId = BlobId::from_static("repository.format");

/// The ID of the control blob which stores the blob-layout configuration.
pub const BLOB_LAYOUT_BLOB_ID: BlobId = BlobId::from_static("repository.blobcfg");

/// The IDs of all control blobs in a repository.
pub const CONTROL_BLOB_IDS: [BlobId; 2] = [REPOSITORY_BLOB_ID, BLOB_LAYOUT_BLOB_ID];

/// Return whether `id` identifies one of the repository's control blobs.
pub fn is_control_blob(id: &BlobId) -> bool {
    CONTROL_BLOB_IDS.contains(id)
}

/// The ID of a blob in a [`BlobStore`].
///
/// Content blobs are identified by the hex-encoded BLAKE3 hash of their contents. Control blobs are
/// identified by fixed names; see [`REPOSITORY_BLOB_ID`] and [`BLOB_LAYOUT_BLOB_ID`].
///
/// [`BlobStore`]: crate::store::BlobStore
/// [`REPOSITORY_BLOB_ID`]: crate::store::REPOSITORY_BLOB_ID
/// [`BLOB_LAYOUT_BLOB_ID`]: crate::store::BLOB_LAYOUT_BLOB_ID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId(Cow<'static, str>);

impl BlobId {
    /// Create a new `BlobId` from a static string.
    pub const fn from_static(id: &'static str) -> Self {
        BlobId(Cow::Borrowed(id))
    }

    /// Create a new `BlobId` from the given string.
    pub fn new(id: impl Into<String>) -> Self {
        BlobId(Cow::Owned(id.into()))
    }

    /// Create the content-addressed `BlobId` of the given `data`.
    pub fn for_content(data: &[u8]) -> Self {
        BlobId::new(blake3::hash(data).to_hex().to_string())
    }

    /// Return this ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BlobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A persistent store for blobs of data.
///
/// A `BlobStore` persistently stores blobs of data uniquely identified by [`BlobId`] values. Blob
/// stores are used as the storage backend for repositories in the [`crate::format`] module.
///
/// [`BlobId`]: crate::store::BlobId
pub trait BlobStore: fmt::Debug + Send {
    /// Write the given `data` as a blob with the given `id`.
    ///
    /// If this method returns `Ok`, the blob is stored persistently until it is removed with
    /// `delete_blob`. If this method returns `Err`, the blob is not stored persistently and any
    /// previous blob with the same `id` is left unchanged; it is up to the implementation to ensure
    /// that any data which may have been written is cleaned up.
    ///
    /// If a blob with the given `id` already exists, it is overwritten.
    ///
    /// This is an atomic operation.
    fn put_blob(&mut self, id: &BlobId, data: &[u8]) -> anyhow::Result<()>;

    /// Return the bytes of the blob with the given `id`.
    ///
    /// If there is no blob with the given `id`, this returns `Ok(None)`.
    fn get_blob(&mut self, id: &BlobId) -> anyhow::Result<Option<Vec<u8>>>;

    /// Remove the blob with the given `id` from the store.
    ///
    /// If there is no blob with the given `id`, this method does nothing and returns `Ok`.
    ///
    /// This is an atomic operation.
    fn delete_blob(&mut self, id: &BlobId) -> anyhow::Result<()>;

    /// Return a list of the IDs of all blobs in the store.
    fn list_blobs(&mut self) -> anyhow::Result<Vec<BlobId>>;
}

assert_obj_safe!(BlobStore);

impl BlobStore for Box<dyn BlobStore> {
    fn put_blob(&mut self, id: &BlobId, data: &[u8]) -> anyhow::Result<()> {
        self.as_mut().put_blob(id, data)
    }

    fn get_blob(&mut self, id: &BlobId) -> anyhow::Result<Option<Vec<u8>>> {
        self.as_mut().get_blob(id)
    }

    fn delete_blob(&mut self, id: &BlobId) -> anyhow::Result<()> {
        self.as_mut().delete_blob(id)
    }

    fn list_blobs(&mut self) -> anyhow::Result<Vec<BlobId>> {
        self.as_mut().list_blobs()
    }
}
