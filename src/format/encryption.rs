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

use std::fmt::{self, Debug, Formatter};

use secrecy::{DebugSecret, ExposeSecret, Secret as SecretBox, SecretVec};
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::aead::xchacha20poly1305_ietf as xchacha;
use sodiumoxide::crypto::pwhash::argon2id13 as argon2;
use subtle::ConstantTimeEq;

use crate::env::init;
use crate::Secret;

/// A limit on the resources used to derive the format encryption key from a password.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum ResourceLimit {
    /// Suitable for interactive use.
    Interactive,

    /// Suitable for moderately sensitive data.
    Moderate,

    /// Suitable for highly sensitive data.
    Sensitive,
}

impl ResourceLimit {
    fn memory(self) -> argon2::MemLimit {
        match self {
            ResourceLimit::Interactive => argon2::MEMLIMIT_INTERACTIVE,
            ResourceLimit::Moderate => argon2::MEMLIMIT_MODERATE,
            ResourceLimit::Sensitive => argon2::MEMLIMIT_SENSITIVE,
        }
    }

    fn operations(self) -> argon2::OpsLimit {
        match self {
            ResourceLimit::Interactive => argon2::OPSLIMIT_INTERACTIVE,
            ResourceLimit::Moderate => argon2::OPSLIMIT_MODERATE,
            ResourceLimit::Sensitive => argon2::OPSLIMIT_SENSITIVE,
        }
    }
}

/// The authenticated encryption method used for the control blobs.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Encryption {
    /// XChaCha20-Poly1305 with a random 192-bit nonce prepended to each ciphertext.
    XChaCha20Poly1305,
}

impl Encryption {
    /// Seal `plaintext` with `key`, authenticating `associated_data` along with it.
    pub(crate) fn seal(
        &self,
        key: &EncryptionKey,
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> crate::Result<Vec<u8>> {
        init();
        match self {
            Encryption::XChaCha20Poly1305 => {
                let key = xchacha::Key::from_slice(key.expose_secret()).ok_or_else(|| {
                    crate::Error::Encoding(format!(
                        "The key must be {} bytes, but it is {} bytes.",
                        xchacha::KEYBYTES,
                        key.expose_secret().len()
                    ))
                })?;
                let nonce = xchacha::gen_nonce();
                let sealed = xchacha::seal(plaintext, Some(associated_data), &nonce, &key);

                let mut output = Vec::with_capacity(xchacha::NONCEBYTES + sealed.len());
                output.extend_from_slice(nonce.as_ref());
                output.extend_from_slice(&sealed);
                Ok(output)
            }
        }
    }

    /// Open a value sealed with [`seal`].
    ///
    /// Returns `None` if `sealed` is malformed or could not be authenticated with `key` and
    /// `associated_data`.
    ///
    /// [`seal`]: Encryption::seal
    pub(crate) fn open(
        &self,
        key: &EncryptionKey,
        associated_data: &[u8],
        sealed: &[u8],
    ) -> Option<Vec<u8>> {
        init();
        match self {
            Encryption::XChaCha20Poly1305 => {
                if sealed.len() < xchacha::NONCEBYTES {
                    return None;
                }
                let (nonce, ciphertext) = sealed.split_at(xchacha::NONCEBYTES);
                let nonce = xchacha::Nonce::from_slice(nonce)?;
                let key = xchacha::Key::from_slice(key.expose_secret())?;
                xchacha::open(ciphertext, Some(associated_data), &nonce, &key).ok()
            }
        }
    }

    /// The size of the keys used by this encryption method.
    pub(crate) fn key_size(&self) -> usize {
        match self {
            Encryption::XChaCha20Poly1305 => xchacha::KEYBYTES,
        }
    }
}

/// The random salt mixed into the password when deriving the format encryption key.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySalt(Vec<u8>);

impl KeySalt {
    /// Generate a new random salt.
    pub fn generate() -> Self {
        init();
        KeySalt(argon2::gen_salt().as_ref().to_vec())
    }

    fn to_argon2(&self) -> crate::Result<argon2::Salt> {
        argon2::Salt::from_slice(&self.0).ok_or_else(|| {
            crate::Error::Derivation(format!(
                "The salt must be {} bytes, but it is {} bytes.",
                argon2::SALTBYTES,
                self.0.len()
            ))
        })
    }
}

/// The stored parameters used to derive the format encryption key from the password.
///
/// These are chosen when a repository is created and are never changed afterwards. Rotating the
/// password only changes the password which is fed into the key derivation function.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    /// The salt mixed into the password.
    pub salt: KeySalt,

    /// The maximum amount of memory key derivation will use.
    pub memory_limit: ResourceLimit,

    /// The maximum number of computations key derivation will perform.
    pub operations_limit: ResourceLimit,
}

impl KdfParams {
    /// Create new parameters with a random salt and the given limits.
    pub fn generate(memory_limit: ResourceLimit, operations_limit: ResourceLimit) -> Self {
        KdfParams {
            salt: KeySalt::generate(),
            memory_limit,
            operations_limit,
        }
    }

    /// Derive a key of `size` bytes from `password` with Argon2id.
    ///
    /// # Errors
    /// - `Error::Derivation`: The salt is malformed or the key derivation function failed.
    pub fn derive_key(&self, password: &Secret, size: usize) -> crate::Result<EncryptionKey> {
        init();
        let salt = self.salt.to_argon2()?;
        let mut bytes = vec![0u8; size];
        argon2::derive_key(
            &mut bytes,
            password.reveal().as_bytes(),
            &salt,
            self.operations_limit.operations(),
            self.memory_limit.memory(),
        )
        .map_err(|()| {
            crate::Error::Derivation(String::from("The key derivation function failed."))
        })?;
        Ok(EncryptionKey::new(bytes))
    }
}

/// The format encryption key, which encrypts the control blobs.
///
/// The key is zeroed in memory when it is dropped and is never printed by `Debug`. Comparing two
/// keys with `==` takes constant time.
pub struct EncryptionKey(SecretVec<u8>);

impl EncryptionKey {
    /// Wrap the given key `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        EncryptionKey(SecretBox::new(bytes))
    }
}

impl ExposeSecret<Vec<u8>> for EncryptionKey {
    fn expose_secret(&self) -> &Vec<u8> {
        self.0.expose_secret()
    }
}

impl DebugSecret for EncryptionKey {}

impl Debug for EncryptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Self::debug_secret(f)
    }
}

impl Clone for EncryptionKey {
    fn clone(&self) -> Self {
        EncryptionKey::new(self.expose_secret().to_vec())
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose_secret()[..]
            .ct_eq(&other.expose_secret()[..])
            .into()
    }
}

impl Eq for EncryptionKey {}
