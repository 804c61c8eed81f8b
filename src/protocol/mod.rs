// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker-facing side of the adapter.
//!
//! The device and scheduler never talk to MQTT directly. Outbound payloads
//! go through a [`PublishSink`]; the [`TransportAdapter`] is the sink of a
//! live session and forwards to a [`BrokerClient`]. Inbound messages and
//! connection events enter through the adapter as well.
//!
//! # Implementations
//!
//! - [`MqttBroker`]: [`BrokerClient`] over `rumqttc` (feature `mqtt`)
//! - [`TransportAdapter`]: session glue between broker, device and scheduler

mod adapter;
#[cfg(feature = "mqtt")]
mod mqtt_broker;

pub use adapter::TransportAdapter;
#[cfg(feature = "mqtt")]
pub use mqtt_broker::{MqttBroker, MqttBrokerBuilder, MqttBrokerConfig};

use crate::error::ProtocolError;
use crate::telemetry::Payload;

/// Result of handing a payload to a [`PublishSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Payload was queued for the broker.
    Published,
    /// Payload was dropped (no session, not connected, or the broker
    /// refused it). Dropped payloads are not retried.
    Skipped,
}

/// Destination for outbound telemetry.
pub trait PublishSink: Send + Sync {
    /// Publishes `payload` on `topic`.
    ///
    /// Must not block.
    fn publish(&self, topic: &str, payload: &Payload) -> PublishOutcome;
}

/// Minimal MQTT client capability used by the adapter.
///
/// Every method only queues the request and returns immediately.
pub trait BrokerClient: Send + Sync {
    /// Subscribes to a single topic.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    fn subscribe(&self, topic: &str) -> Result<(), ProtocolError>;

    /// Publishes raw bytes on a topic.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ProtocolError>;

    /// Requests disconnection from the broker.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    fn disconnect(&self) -> Result<(), ProtocolError>;
}

/// Interprets an MQTT 3.1.1 CONNACK return code.
///
/// # Errors
///
/// - [`ProtocolError::AuthenticationFailed`] for code 4 (bad username or
///   password) and 5 (not authorized)
/// - [`ProtocolError::ConnectionFailed`] for any other non-zero code
///
/// # Examples
///
/// ```
/// use qilowatt::protocol::connack_result;
/// use qilowatt::ProtocolError;
///
/// assert!(connack_result(0).is_ok());
/// assert!(matches!(connack_result(5), Err(ProtocolError::AuthenticationFailed)));
/// assert!(matches!(connack_result(3), Err(ProtocolError::ConnectionFailed(_))));
/// ```
pub fn connack_result(code: u8) -> Result<(), ProtocolError> {
    match code {
        0 => Ok(()),
        4 | 5 => Err(ProtocolError::AuthenticationFailed),
        other => Err(ProtocolError::ConnectionFailed(format!(
            "broker refused connection (code {other})"
        ))),
    }
}
