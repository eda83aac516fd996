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

use std::convert::Infallible;
use std::fmt::{self, Debug, Display, Formatter};
use std::fs::read_to_string;
use std::path::Path;
use std::str::FromStr;

use secrecy::{DebugSecret, ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// The text printed in place of the value of a [`Secret`].
const REDACTED: &str = "***";

/// A sensitive string, such as a password.
///
/// The value of a `Secret` is never printed by its `Debug` or `Display` implementations; it can
/// only be read with [`reveal`], which should only be called at the point where the value is
/// actually used, like key derivation or building a request. The memory holding the value is
/// zeroed when the `Secret` is dropped.
///
/// Comparing two secrets with `==` takes the same amount of time regardless of where they differ.
///
/// [`reveal`]: crate::Secret::reveal
pub struct Secret(SecretString);

impl Secret {
    /// Create a new `Secret` holding `value`.
    pub fn new(value: impl Into<String>) -> Self {
        Secret(SecretString::new(value.into()))
    }

    /// Create a new `Secret` from the value of the environment variable `name`.
    ///
    /// # Errors
    /// - `Error::Secret`: The environment variable is not set or is not valid unicode.
    pub fn from_env(name: &str) -> crate::Result<Self> {
        std::env::var(name)
            .map(Secret::new)
            .map_err(|error| crate::Error::Secret(format!("{}: {}", name, error)))
    }

    /// Create a new `Secret` from the contents of the file at `path`.
    ///
    /// A single trailing newline is removed from the contents of the file.
    ///
    /// # Errors
    /// - `Error::Secret`: The file could not be read.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let mut contents = read_to_string(path)
            .map_err(|error| crate::Error::Secret(format!("{}: {}", path.display(), error)))?;
        if contents.ends_with('\n') {
            contents.pop();
            if contents.ends_with('\r') {
                contents.pop();
            }
        }
        Ok(Secret::new(contents))
    }

    /// Return the value of this secret.
    pub fn reveal(&self) -> &str {
        self.0.expose_secret().as_str()
    }

    /// Return whether the value of this secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Secret::new(self.reveal())
    }
}

impl Default for Secret {
    fn default() -> Self {
        Secret::new(String::new())
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.reveal()
            .as_bytes()
            .ct_eq(other.reveal().as_bytes())
            .into()
    }
}

impl Eq for Secret {}

impl DebugSecret for Secret {}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Self::debug_secret(f)
    }
}

impl Display for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value)
    }
}

impl FromStr for Secret {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Secret::new(value))
    }
}
