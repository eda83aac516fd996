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

use std::io;
use std::result;

use thiserror::Error as DeriveError;

use crate::format::RotationPhase;
use crate::store::{BlobId, BLOB_LAYOUT_BLOB_ID};

/// The error type for operations in this crate.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// A repository already exists in the blob store.
    #[error("A repository already exists in the blob store.")]
    AlreadyExists,

    /// There is no repository in the blob store.
    #[error("There is no repository in the blob store.")]
    NotFound,

    /// The provided password was invalid.
    #[error("The provided password was invalid.")]
    Password,

    /// The provided password was empty.
    #[error("The provided password was empty.")]
    EmptyPassword,

    /// The repository does not support changing its password.
    ///
    /// Repositories created without password changes enabled can never have their password
    /// changed.
    #[error("This repository does not support changing its password.")]
    Capability,

    /// A key could not be derived from the password.
    #[error("Unable to derive the format encryption key: {0}")]
    Derivation(String),

    /// A control blob could not be serialized or encrypted.
    #[error("Unable to encode a control blob: {0}")]
    Encoding(String),

    /// A control blob could not be written to the blob store.
    #[error("Unable to write the control blob '{blob}': {source}")]
    Persistence {
        /// The ID of the control blob which could not be written.
        blob: BlobId,

        /// The error returned by the blob store.
        source: anyhow::Error,
    },

    /// The signing key callback failed after the control blobs were written.
    ///
    /// When this error is returned, the password has already been changed in the blob store.
    #[error("Unable to update the signing key: {0}")]
    Callback(anyhow::Error),

    /// The client configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The given blob ID does not identify a control blob.
    #[error("The blob '{0}' is not a control blob.")]
    NotControlBlob(BlobId),

    /// The repository is corrupt.
    #[error("The repository is corrupt.")]
    Corrupt,

    /// This repository format is not supported by this version of the library.
    #[error("This repository format is not supported by this version of the library.")]
    UnsupportedFormat,

    /// The blob store is an unsupported format.
    #[error("The blob store is an unsupported format.")]
    UnsupportedStore,

    /// A secret could not be evaluated.
    #[error("Unable to evaluate a secret: {0}")]
    Secret(String),

    /// An error occurred while reading from the blob store.
    #[error("{0}")]
    Store(anyhow::Error),

    /// An error occurred while sending a request to the server.
    #[error("Unable to send a request to the server: {0}")]
    Transport(anyhow::Error),

    /// An I/O error occurred.
    #[error("{0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The phase of a password rotation which produced this error.
    ///
    /// This returns `None` for errors which are not produced by a password rotation.
    pub fn phase(&self) -> Option<RotationPhase> {
        match self {
            Error::Capability => Some(RotationPhase::Capability),
            Error::Derivation(_) => Some(RotationPhase::Derivation),
            Error::Encoding(_) => Some(RotationPhase::Encoding),
            Error::Persistence { blob, .. } if *blob == BLOB_LAYOUT_BLOB_ID => {
                Some(RotationPhase::BlobLayoutWrite)
            }
            Error::Persistence { .. } => Some(RotationPhase::RepositoryWrite),
            Error::Callback(_) => Some(RotationPhase::Callback),
            _ => None,
        }
    }
}

/// The result type for operations in this crate.
pub type Result<T> = result::Result<T, Error>;
