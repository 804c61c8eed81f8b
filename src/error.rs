// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the Qilowatt adapter.
//!
//! Two families of failures exist:
//!
//! - [`ProtocolError`] covers the broker session (connect, subscribe,
//!   publish). These are returned to the caller owning the session, which
//!   decides whether to retry.
//! - [`CommandError`] covers inbound command decoding. These never leave the
//!   device: [`Device::handle_command`](crate::Device::handle_command) logs
//!   them and carries on.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while talking to the MQTT broker.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The client configuration is incomplete or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors related to the broker session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client request could not be queued.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// The broker rejected the credentials.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Connection to the broker failed for any other reason.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Waiting for the broker timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors raised while decoding an inbound command payload.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Payload does not start with a known command keyword.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The JSON part of a structured command could not be parsed.
    #[error("invalid command JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON part parsed, but is not an object.
    #[error("command body must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
