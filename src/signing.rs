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

//! Signing keys which are derived from the repository password.
//!
//! Some subsystems derive their own key material from the repository password. When the password
//! is rotated with [`FormatManager::rotate_password`], they are notified through a
//! [`SigningKeyCallback`] so they can derive their keys again.
//!
//! [`FormatManager::rotate_password`]: crate::format::FormatManager::rotate_password

use std::fmt::{self, Debug, Formatter};
use std::sync::{PoisonError, RwLock};

use anyhow::bail;
use secrecy::zeroize::Zeroize;
use secrecy::{DebugSecret, ExposeSecret, Secret as SecretBytes};
use static_assertions::assert_obj_safe;
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use crate::Secret;

/// A subsystem which must be notified when the repository password changes.
///
/// This is called by [`FormatManager::rotate_password`] after both control blobs have been written
/// with the new key. Any closure of the form `Fn(&Secret, &Secret) -> anyhow::Result<()>` can be
/// used as a `SigningKeyCallback`.
///
/// The callback is called while the `FormatManager` holds its lock, so it must not call any methods
/// on the `FormatManager`.
///
/// [`FormatManager::rotate_password`]: crate::format::FormatManager::rotate_password
pub trait SigningKeyCallback {
    /// Update signing keys derived from `old_password` to be derived from `new_password`.
    fn update_signing_key(&self, old_password: &Secret, new_password: &Secret)
        -> anyhow::Result<()>;
}

assert_obj_safe!(SigningKeyCallback);

impl<F> SigningKeyCallback for F
where
    F: Fn(&Secret, &Secret) -> anyhow::Result<()>,
{
    fn update_signing_key(
        &self,
        old_password: &Secret,
        new_password: &Secret,
    ) -> anyhow::Result<()> {
        self(old_password, new_password)
    }
}

/// The size of a signing key in bytes.
const SIGNING_KEY_SIZE: usize = blake3::KEY_LEN;

/// A 256-bit key used to authenticate payloads with a keyed BLAKE3 hash.
struct SigningKey(SecretBytes<[u8; SIGNING_KEY_SIZE]>);

impl DebugSecret for SigningKey {}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Self::debug_secret(f)
    }
}

impl SigningKey {
    /// Derive a signing key from `password` for the repository with the given `repository_id`.
    fn derive(context: &str, repository_id: Uuid, password: &Secret) -> Self {
        let mut material = Vec::with_capacity(16 + password.reveal().len());
        material.extend_from_slice(repository_id.as_bytes());
        material.extend_from_slice(password.reveal().as_bytes());
        let key = blake3::derive_key(context, &material);
        material.zeroize();
        SigningKey(SecretBytes::new(key))
    }

    fn sign(&self, payload: &[u8]) -> [u8; blake3::OUT_LEN] {
        *blake3::keyed_hash(self.0.expose_secret(), payload).as_bytes()
    }
}

/// The current password and the key derived from it.
#[derive(Debug)]
struct KeyringState {
    password: Secret,
    key: SigningKey,
}

/// A signing key which is kept in sync with the repository password.
///
/// A `SigningKeyring` derives a signing key from the repository's unique ID and password using a
/// context string which separates it from keys used by other subsystems. It implements
/// [`SigningKeyCallback`], so it can be passed to [`FormatManager::rotate_password`] to derive a
/// new key whenever the password changes.
///
/// # Examples
/// ```
/// use repo_format::format::CreateOptions;
/// use repo_format::signing::SigningKeyring;
/// use repo_format::store::{MemoryConfig, OpenStore};
/// use repo_format::Secret;
///
/// let manager = CreateOptions::new()
///     .create(MemoryConfig::new().open().unwrap(), Secret::new("old-pw"))
///     .unwrap();
/// let keyring = SigningKeyring::new(
///     "repo-format 2021 manifest signing",
///     manager.unique_id(),
///     Secret::new("old-pw"),
/// );
/// let signature = keyring.sign(b"manifest");
///
/// manager.rotate_password(Secret::new("new-pw"), &keyring).unwrap();
///
/// assert!(!keyring.verify(b"manifest", &signature));
/// assert!(keyring.verify(b"manifest", &keyring.sign(b"manifest")));
/// ```
///
/// [`FormatManager::rotate_password`]: crate::format::FormatManager::rotate_password
pub struct SigningKeyring {
    context: String,
    repository_id: Uuid,
    state: RwLock<KeyringState>,
}

impl SigningKeyring {
    /// Create a new keyring for the repository with the given `repository_id`.
    ///
    /// `context` should be a hardcoded, globally unique string describing what the key is used for.
    pub fn new(context: impl Into<String>, repository_id: Uuid, password: Secret) -> Self {
        let context = context.into();
        let key = SigningKey::derive(&context, repository_id, &password);
        SigningKeyring {
            context,
            repository_id,
            state: RwLock::new(KeyringState { password, key }),
        }
    }

    /// Return the signature of `payload` with the current signing key.
    pub fn sign(&self, payload: &[u8]) -> [u8; blake3::OUT_LEN] {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .key
            .sign(payload)
    }

    /// Return whether `signature` is a valid signature of `payload` with the current signing key.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        self.sign(payload)[..].ct_eq(signature).into()
    }
}

impl Debug for SigningKeyring {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyring")
            .field("context", &self.context)
            .field("repository_id", &self.repository_id)
            .finish_non_exhaustive()
    }
}

impl SigningKeyCallback for SigningKeyring {
    fn update_signing_key(
        &self,
        old_password: &Secret,
        new_password: &Secret,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.password != *old_password {
            bail!("The old password does not match the password of this signing key.");
        }

        state.key = SigningKey::derive(&self.context, self.repository_id, new_password);
        state.password = new_password.clone();

        debug!(
            context = %self.context,
            repository = %self.repository_id,
            "derived a new signing key"
        );
        Ok(())
    }
}
