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

//! `repo-format` manages the control metadata of an encrypted, content-addressable backup
//! repository.
//!
//! A repository keeps two well-known control blobs in its [`BlobStore`]: the repository blob,
//! which holds the repository configuration encrypted with a key derived from the repository
//! password, and the blob-layout blob, which describes how blobs are laid out in the store. The
//! [`FormatManager`] is the only thing which reads or writes these blobs. It owns the current
//! password, the key derived from it, and the decrypted configuration, and it implements the
//! protocol for rotating the password without leaving the repository unreadable.
//!
//! This crate provides:
//! - [`FormatManager`], which creates, opens, refreshes, and rotates the password of a repository.
//! - [`Secret`], a container for passwords which is redacted when formatted.
//! - [`SigningKeyCallback`], which is notified when the password changes so that signing keys
//!   derived from the password can be updated, and [`SigningKeyring`], which implements it.
//! - [`BlobStore`], the storage backend trait, with [`MemoryStore`] and [`DirectoryStore`].
//! - The [`admin`] module, which configures clients of the administrative HTTP API of a running
//!   repository server.
//!
//! The function `init` is used to initialize the environment and should be called before any other
//! functions in this crate.
//!
//! # Examples
//! ```
//! use repo_format::format::{CreateOptions, FormatManager};
//! use repo_format::store::{MemoryConfig, OpenStore};
//! use repo_format::{init, Secret};
//!
//! fn main() -> repo_format::Result<()> {
//!     init();
//!
//!     let store_config = MemoryConfig::new();
//!     let manager = CreateOptions::new().create(store_config.open()?, Secret::new("old-pw"))?;
//!
//!     let callback = |_: &Secret, _: &Secret| -> anyhow::Result<()> { Ok(()) };
//!     manager.rotate_password(Secret::new("new-pw"), &callback)?;
//!     drop(manager);
//!
//!     let reopened = FormatManager::open(store_config.open()?, Secret::new("new-pw"))?;
//!     assert!(reopened.supports_password_change());
//!     Ok(())
//! }
//! ```
//!
//! [`BlobStore`]: crate::store::BlobStore
//! [`MemoryStore`]: crate::store::MemoryStore
//! [`DirectoryStore`]: crate::store::DirectoryStore
//! [`FormatManager`]: crate::format::FormatManager
//! [`SigningKeyCallback`]: crate::signing::SigningKeyCallback
//! [`SigningKeyring`]: crate::signing::SigningKeyring

pub use uuid;

pub use env::init;
pub use error::{Error, Result};
pub use secret::Secret;

mod env;
mod error;
mod secret;

pub mod admin;
pub mod format;
pub mod signing;
pub mod store;
