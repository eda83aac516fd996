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

//! Clients of the administrative API of a running repository server.
//!
//! Commands which control a server are configured with [`ServerClientFlags`], which can be
//! flattened into a `clap` parser. Validating the flags with
//! [`ServerClientFlags::api_client_options`] happens before any request is made, so a
//! misconfigured client fails without touching the network.
//!
//! This module does not implement HTTP itself. Requests are sent through a [`Transport`].

pub use self::client::{
    AccessLevel, AclEntry, AdminClient, AdminOperation, AdminRequest, Method, ThrottleLimits,
    Transport,
};
pub use self::flags::{
    ApiClientOptions, CertificateFingerprint, ServerClientFlags, ServerFlags,
    DEFAULT_CONTROL_USERNAME, DEFAULT_SERVER_ADDRESS, DEFAULT_SERVER_USERNAME,
};

mod client;
mod flags;
