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

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use clap::Args;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::Url;

use crate::Secret;

use super::client::{AdminClient, Transport};

/// The address of the repository server when none is given.
pub const DEFAULT_SERVER_ADDRESS: &str = "http://127.0.0.1:51515";

/// The username used to control the repository server when none is given.
pub const DEFAULT_CONTROL_USERNAME: &str = "server-control";

/// The username used to access repository data through the server when none is given.
pub const DEFAULT_SERVER_USERNAME: &str = "repository";

/// The size of a SHA-256 certificate fingerprint in bytes.
const FINGERPRINT_SIZE: usize = 32;

/// Flags used by commands which control a running repository server.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ServerClientFlags {
    /// Server address
    #[arg(long, env = "REPO_SERVER_ADDRESS", default_value = DEFAULT_SERVER_ADDRESS)]
    pub address: String,

    /// Server control username
    #[arg(
        long = "server-control-username",
        alias = "server-username",
        env = "REPO_SERVER_USERNAME",
        default_value = DEFAULT_CONTROL_USERNAME
    )]
    pub control_username: String,

    /// Server control password
    #[arg(
        long = "server-control-password",
        alias = "server-password",
        env = "REPO_SERVER_PASSWORD",
        hide_env_values = true
    )]
    pub control_password: Option<Secret>,

    /// Server certificate fingerprint
    #[arg(long = "server-cert-fingerprint", env = "REPO_SERVER_CERT_FINGERPRINT")]
    pub cert_fingerprint: Option<String>,
}

impl Default for ServerClientFlags {
    fn default() -> Self {
        ServerClientFlags {
            address: DEFAULT_SERVER_ADDRESS.to_string(),
            control_username: DEFAULT_CONTROL_USERNAME.to_string(),
            control_password: None,
            cert_fingerprint: None,
        }
    }
}

impl ServerClientFlags {
    /// Validate these flags and return the options for connecting to the server.
    ///
    /// This does not make any network requests.
    ///
    /// A missing control password is sent as an empty password.
    ///
    /// # Errors
    /// - `Error::Configuration`: The address is missing or invalid, or the certificate fingerprint
    /// is invalid.
    pub fn api_client_options(&self) -> crate::Result<ApiClientOptions> {
        let base_url = parse_address(&self.address)?;
        let password = self.control_password.clone().unwrap_or_default();

        let fingerprint = self
            .cert_fingerprint
            .as_deref()
            .map(str::parse::<CertificateFingerprint>)
            .transpose()?;

        Ok(ApiClientOptions {
            base_url,
            username: self.control_username.clone(),
            password,
            fingerprint,
        })
    }

    /// Validate these flags and return a client which sends requests through `transport`.
    ///
    /// # Errors
    /// - `Error::Configuration`: The flags are invalid. `transport` is never used.
    pub fn client<T: Transport>(&self, transport: T) -> crate::Result<AdminClient<T>> {
        Ok(AdminClient::new(self.api_client_options()?, transport))
    }
}

/// Flags used by the command which starts a repository server.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ServerFlags {
    /// Server address
    #[arg(long, default_value = DEFAULT_SERVER_ADDRESS)]
    pub address: String,

    /// HTTP server username (basic auth)
    #[arg(
        long = "server-username",
        env = "REPO_SERVER_USERNAME",
        default_value = DEFAULT_SERVER_USERNAME
    )]
    pub username: String,

    /// HTTP server password (basic auth)
    #[arg(
        long = "server-password",
        env = "REPO_SERVER_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<Secret>,
}

impl ServerFlags {
    /// Return the address the server should listen on.
    ///
    /// # Errors
    /// - `Error::Configuration`: The address is missing or invalid.
    pub fn listen_url(&self) -> crate::Result<Url> {
        parse_address(&self.address)
    }
}

/// Parse a server address, making sure its path ends with a slash so API paths can be joined to it.
fn parse_address(address: &str) -> crate::Result<Url> {
    if address.trim().is_empty() {
        return Err(crate::Error::Configuration(
            "The server address is required.".into(),
        ));
    }

    let mut url = Url::parse(address).map_err(|error| {
        crate::Error::Configuration(format!("Invalid server address '{}': {}", address, error))
    })?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(crate::Error::Configuration(format!(
                "Unsupported server address scheme '{}'.",
                scheme
            )))
        }
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Validated options for connecting to the administrative API of a repository server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiClientOptions {
    /// The base URL of the server.
    pub base_url: Url,

    /// The username used for basic authentication.
    pub username: String,

    /// The password used for basic authentication.
    pub password: Secret,

    /// The expected SHA-256 fingerprint of the server's TLS certificate.
    pub fingerprint: Option<CertificateFingerprint>,
}

/// The SHA-256 fingerprint of a TLS certificate.
///
/// This parses from hexadecimal, optionally with the bytes separated by colons, and is displayed as
/// lowercase hexadecimal without separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CertificateFingerprint([u8; FINGERPRINT_SIZE]);

impl CertificateFingerprint {
    /// Compute the fingerprint of the given DER-encoded certificate.
    pub fn of_certificate(der: &[u8]) -> Self {
        CertificateFingerprint(Sha256::digest(der).into())
    }

    /// Return whether `der` is the DER-encoded certificate with this fingerprint.
    pub fn matches(&self, der: &[u8]) -> bool {
        Self::of_certificate(der).0[..].ct_eq(&self.0[..]).into()
    }

    /// Return the bytes of this fingerprint.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }
}

impl FromStr for CertificateFingerprint {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let digits: String = s.trim().chars().filter(|c| *c != ':').collect();
        let bytes = hex::decode(&digits).map_err(|error| {
            crate::Error::Configuration(format!("Invalid certificate fingerprint: {}", error))
        })?;
        let bytes: [u8; FINGERPRINT_SIZE] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            crate::Error::Configuration(format!(
                "Invalid certificate fingerprint: expected {} bytes, got {}",
                FINGERPRINT_SIZE,
                bytes.len()
            ))
        })?;
        Ok(CertificateFingerprint(bytes))
    }
}

impl Display for CertificateFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
