// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound telemetry payloads.
//!
//! Devices publish three periodic documents plus, for switches, a binary
//! relay state:
//!
//! - `Q/<id>/SENSOR` - measurements and the active work mode ([`InverterSensor`], [`SwitchSensor`])
//! - `Q/<id>/STATE` - time and uptime ([`StatePayload`])
//! - `Q/<id>/STATUS0` - device, network and broker description ([`Status0`])
//! - `Q/<id>/POWER1` - `1` or `0`
//!
//! Records are turned into a [`Payload`], an immutable JSON document handed
//! to the transport.
//!
//! # Examples
//!
//! ```
//! use qilowatt::telemetry::{EnergyData, Payload};
//!
//! let energy = EnergyData {
//!     power: vec![100.0, 100.0, 100.0],
//!     today: 5.0,
//!     total: 1000.0,
//!     current: vec![5.0, 5.0, 5.0],
//!     voltage: vec![230.0, 230.0, 230.0],
//!     frequency: 50.0,
//! };
//!
//! let payload = Payload::record(&energy);
//! assert_eq!(payload.as_json()["Frequency"], 50.0);
//! assert!(Payload::empty().is_empty());
//! ```

mod sensor;
mod state;
mod status;

pub use sensor::{
    Esp32Data, EnergyData, InverterSensor, MetricsData, PingData, SwitchSensor, VersionData,
};
pub use state::StatePayload;
pub use status::{
    FIRMWARE_VERSION, MQTT_CLIENT_MASK, MqttInfo, Status0, StatusDevice, StatusFirmware,
    StatusLogging, StatusMqtt, StatusNetwork, StatusParameters, StatusTime,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Formats a timestamp the way telemetry `Time` fields expect it.
///
/// Second precision, no offset (e.g., `2024-10-01T12:00:00`).
#[must_use]
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// An immutable, point-in-time JSON document ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(serde_json::Value);

impl Payload {
    /// The sentinel payload produced by devices that are not ready yet.
    #[must_use]
    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Serializes a record into a payload.
    ///
    /// Falls back to [`Payload::empty`] if the record cannot be represented
    /// as JSON; the failure is logged.
    #[must_use]
    pub fn record<T: Serialize>(record: &T) -> Self {
        match serde_json::to_value(record) {
            Ok(value) => Self(value),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize telemetry record");
                Self::empty()
            }
        }
    }

    /// Returns `true` for the sentinel payload (an empty JSON object).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.as_object().is_some_and(serde_json::Map::is_empty)
    }

    /// Returns the underlying JSON value.
    #[must_use]
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    /// Encodes the payload for the wire.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON value cannot be written.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<u8> for Payload {
    fn from(value: u8) -> Self {
        Self(serde_json::Value::from(value))
    }
}
