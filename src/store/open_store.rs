/*
 * Copyright 2019-2020 Wren Powell
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

/// A value which can be used to open a `BlobStore`.
pub trait OpenStore {
    /// The type of `BlobStore` which this value can be used to open.
    type Store: BlobStore + 'static;

    /// Open or create a blob store of type `Store`.
    ///
    /// This opens the blob store, creating it if it does not already exist.
    ///
    /// # Errors
    /// - `Error::UnsupportedStore`: The blob store is an unsupported format. This can happen if
    /// the serialized data format changed or if the storage represented by this value does not
    /// contain a valid blob store.
    /// - `Error::Store`: An error occurred with the blob store.
    /// - `Error::Io`: An I/O error occurred.
    fn open(&self) -> crate::Result<Self::Store>;
}
