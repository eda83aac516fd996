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

//! Low-level backends for blob storage.
//!
//! This module provides low-level storage backends called blob stores. A blob store provides only
//! the most basic storage operations: writing, reading, deleting, and listing opaque blobs of data
//! identified by a [`BlobId`]. It doesn't have to worry about encryption or consistency; those are
//! implemented at a higher level.
//!
//! All blob stores implement the [`BlobStore`] trait.
//!
//! For each blob store, there is a corresponding type which provides the necessary configuration to
//! open that blob store. These config types implement [`OpenStore`].
//!
//! [`BlobId`]: crate::store::BlobId
//! [`BlobStore`]: crate::store::BlobStore
//! [`OpenStore`]: crate::store::OpenStore

pub use self::blob_store::{
    is_control_blob, BlobId, BlobStore, BLOB_LAYOUT_BLOB_ID, CONTROL_BLOB_IDS, REPOSITORY_BLOB_ID,
};
pub use self::directory_store::{DirectoryConfig, DirectoryStore};
pub use self::memory_store::{MemoryConfig, MemoryStore};
pub use self::open_store::OpenStore;

mod blob_store;
mod directory_store;
mod memory_store;
mod open_store;
