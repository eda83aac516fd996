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

use std::fmt::{self, Debug, Display, Formatter};

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use static_assertions::assert_obj_safe;
use tracing::{debug, warn};
use url::Url;

use crate::Secret;

use super::flags::{ApiClientOptions, CertificateFingerprint};

/// The path of the administrative API relative to the server address.
const CONTROL_API_PATH: &str = "api/v1/control/";

/// An HTTP method used by the administrative API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read a resource.
    Get,

    /// Trigger an action.
    Post,

    /// Replace a resource.
    Put,

    /// Remove a resource.
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// The level of access an ACL entry grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// No access.
    None,

    /// Read existing data.
    Read,

    /// Read existing data and add new data.
    Append,

    /// Read, add, and delete data.
    Full,
}

/// An access control entry on the repository server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    /// The user the entry applies to, like `user@host` or a wildcard pattern.
    pub user: String,

    /// The kind of object the entry applies to.
    pub target: String,

    /// The access granted.
    pub access: AccessLevel,
}

/// Throughput limits on the repository server.
///
/// A limit of `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrottleLimits {
    /// Blob reads per second.
    pub reads_per_second: Option<f64>,

    /// Blob writes per second.
    pub writes_per_second: Option<f64>,

    /// List requests per second.
    pub list_per_second: Option<f64>,

    /// Bytes uploaded per second.
    pub upload_bytes_per_second: Option<f64>,

    /// Bytes downloaded per second.
    pub download_bytes_per_second: Option<f64>,
}

/// An operation of the administrative API of a running repository server.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminOperation {
    /// Get the status of the server and its sources.
    Status,

    /// Make the server refresh its view of the repository.
    Refresh,

    /// Make the server flush pending writes.
    Flush,

    /// Stop the server.
    Shutdown,

    /// Start snapshots of the given sources, or of all sources if empty.
    Upload { sources: Vec<String> },

    /// Cancel in-progress snapshots of the given sources, or of all sources if empty.
    Cancel { sources: Vec<String> },

    /// Pause scheduled snapshots of the given sources, or of all sources if empty.
    Pause { sources: Vec<String> },

    /// Resume scheduled snapshots of the given sources, or of all sources if empty.
    Resume { sources: Vec<String> },

    /// Get the current throughput limits.
    GetThrottle,

    /// Replace the current throughput limits.
    SetThrottle(ThrottleLimits),

    /// List the access control entries.
    ListAcl,

    /// Add an access control entry.
    AddAcl(AclEntry),

    /// Delete the access control entry with the given ID.
    DeleteAcl { id: String },

    /// List the users which can access the server.
    ListUsers,

    /// Add a user which can access the server.
    AddUser { username: String, password: Secret },

    /// Delete a user.
    DeleteUser { username: String },

    /// Change the password of a user.
    SetUserPassword { username: String, password: Secret },
}

impl AdminOperation {
    /// The HTTP method used for this operation.
    pub fn method(&self) -> Method {
        use AdminOperation::*;

        match self {
            Status | GetThrottle | ListAcl | ListUsers => Method::Get,
            Refresh | Flush | Shutdown | Upload { .. } | Cancel { .. } | Pause { .. }
            | Resume { .. } | AddAcl(_) | AddUser { .. } => Method::Post,
            SetThrottle(_) | SetUserPassword { .. } => Method::Put,
            DeleteAcl { .. } | DeleteUser { .. } => Method::Delete,
        }
    }

    /// The path of this operation relative to the control API.
    pub fn path(&self) -> String {
        use AdminOperation::*;

        match self {
            Status => "status".into(),
            Refresh => "refresh".into(),
            Flush => "flush".into(),
            Shutdown => "shutdown".into(),
            Upload { .. } => "trigger-snapshot".into(),
            Cancel { .. } => "cancel".into(),
            Pause { .. } => "pause".into(),
            Resume { .. } => "resume".into(),
            GetThrottle | SetThrottle(_) => "throttle".into(),
            ListAcl | AddAcl(_) => "acl".into(),
            DeleteAcl { id } => format!("acl/{}", escape_segment(id)),
            ListUsers | AddUser { .. } => "users".into(),
            DeleteUser { username } => format!("users/{}", escape_segment(username)),
            SetUserPassword { username, .. } => {
                format!("users/{}/password", escape_segment(username))
            }
        }
    }

    /// The JSON body of the request for this operation, if it has one.
    fn body(&self) -> anyhow::Result<Option<Vec<u8>>> {
        use AdminOperation::*;

        let value = match self {
            Upload { sources } | Cancel { sources } | Pause { sources } | Resume { sources } => {
                json!({ "sources": sources })
            }
            SetThrottle(limits) => serde_json::to_value(limits)?,
            AddAcl(entry) => serde_json::to_value(entry)?,
            AddUser { username, password } => {
                json!({ "username": username, "password": password.reveal() })
            }
            SetUserPassword { password, .. } => json!({ "password": password.reveal() }),
            Status | Refresh | Flush | Shutdown | GetThrottle | ListAcl | DeleteAcl { .. }
            | ListUsers | DeleteUser { .. } => return Ok(None),
        };
        Ok(Some(serde_json::to_vec(&value)?))
    }
}

/// Percent-encode a value so it can be used as a single path segment.
fn escape_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// A request to the administrative API, ready to be sent by a [`Transport`].
#[derive(Clone)]
pub struct AdminRequest {
    /// The HTTP method.
    pub method: Method,

    /// The absolute URL of the request.
    pub url: Url,

    /// The value of the `Authorization` header.
    pub authorization: Secret,

    /// The SHA-256 fingerprint the server's certificate must have, if any.
    pub fingerprint: Option<CertificateFingerprint>,

    /// The JSON body of the request.
    ///
    /// This may contain passwords, so it is never printed by `Debug`.
    pub body: Option<Vec<u8>>,
}

impl Debug for AdminRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("authorization", &self.authorization)
            .field("fingerprint", &self.fingerprint)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish()
    }
}

/// A way of sending requests to the administrative API of a repository server.
///
/// Implementations are responsible for checking the server's certificate against
/// [`AdminRequest::fingerprint`] when it is set.
pub trait Transport {
    /// Send `request` and return the body of a successful response.
    fn send(&self, request: &AdminRequest) -> anyhow::Result<Vec<u8>>;
}

assert_obj_safe!(Transport);

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &AdminRequest) -> anyhow::Result<Vec<u8>> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &AdminRequest) -> anyhow::Result<Vec<u8>> {
        (**self).send(request)
    }
}

/// A client for the administrative API of a running repository server.
///
/// `AdminClient` builds authenticated requests and sends them through a [`Transport`].
#[derive(Debug)]
pub struct AdminClient<T> {
    control_url: Url,
    authorization: Secret,
    fingerprint: Option<CertificateFingerprint>,
    transport: T,
}

impl<T: Transport> AdminClient<T> {
    /// Create a new client with the given `options` which sends requests through `transport`.
    pub fn new(options: ApiClientOptions, transport: T) -> Self {
        let ApiClientOptions {
            base_url,
            username,
            password,
            fingerprint,
        } = options;

        // The base URL always ends with a slash, so this can't fail.
        let control_url = base_url.join(CONTROL_API_PATH).unwrap_or(base_url);

        let credentials = format!("{}:{}", username, password.reveal());
        let authorization = Secret::new(format!("Basic {}", STANDARD.encode(credentials)));

        AdminClient {
            control_url,
            authorization,
            fingerprint,
            transport,
        }
    }

    /// Return the URL which operation paths are relative to.
    pub fn control_url(&self) -> &Url {
        &self.control_url
    }

    /// Build the request for `operation` without sending it.
    ///
    /// # Errors
    /// - `Error::Configuration`: The request URL could not be built.
    /// - `Error::Encoding`: The request body could not be serialized.
    pub fn request(&self, operation: &AdminOperation) -> crate::Result<AdminRequest> {
        let url = self.control_url.join(&operation.path()).map_err(|error| {
            crate::Error::Configuration(format!("Invalid request path: {}", error))
        })?;
        let body = operation
            .body()
            .map_err(|error| crate::Error::Encoding(error.to_string()))?;

        Ok(AdminRequest {
            method: operation.method(),
            url,
            authorization: self.authorization.clone(),
            fingerprint: self.fingerprint,
            body,
        })
    }

    /// Send `operation` to the server and return the body of the response.
    ///
    /// # Errors
    /// - `Error::Configuration`: The request URL could not be built.
    /// - `Error::Encoding`: The request body could not be serialized.
    /// - `Error::Transport`: The request failed.
    pub fn execute(&self, operation: &AdminOperation) -> crate::Result<Vec<u8>> {
        let request = self.request(operation)?;
        debug!(method = %request.method, url = %request.url, "sending admin request");

        self.transport.send(&request).map_err(|error| {
            warn!(method = %request.method, url = %request.url, %error, "admin request failed");
            crate::Error::Transport(error)
        })
    }

    /// Send `operation` to the server and deserialize the JSON response.
    ///
    /// # Errors
    /// - `Error::Configuration`: The request URL could not be built.
    /// - `Error::Encoding`: The request body could not be serialized.
    /// - `Error::Transport`: The request failed or the response could not be deserialized.
    pub fn execute_json<R: DeserializeOwned>(
        &self,
        operation: &AdminOperation,
    ) -> crate::Result<R> {
        let response = self.execute(operation)?;
        serde_json::from_slice(&response)
            .with_context(|| format!("invalid response to {}", operation.path()))
            .map_err(crate::Error::Transport)
    }

    /// Get the status of the server.
    pub fn status(&self) -> crate::Result<serde_json::Value> {
        self.execute_json(&AdminOperation::Status)
    }

    /// Get the current throughput limits of the server.
    pub fn throttle(&self) -> crate::Result<ThrottleLimits> {
        self.execute_json(&AdminOperation::GetThrottle)
    }

    /// List the access control entries of the server.
    pub fn acl(&self) -> crate::Result<Vec<AclEntry>> {
        self.execute_json(&AdminOperation::ListAcl)
    }

    /// Stop the server.
    pub fn shutdown(&self) -> crate::Result<()> {
        self.execute(&AdminOperation::Shutdown).map(drop)
    }

    /// Return the transport this client sends requests through.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
