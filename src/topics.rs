// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT topic names derived from a device identifier.
//!
//! Every device publishes and listens under `Q/<device_id>/`:
//!
//! | Topic | Direction | Content |
//! |-------|-----------|---------|
//! | `Q/<id>/SENSOR` | out | fast telemetry |
//! | `Q/<id>/STATE` | out | medium state |
//! | `Q/<id>/STATUS0` | out | slow status snapshot |
//! | `Q/<id>/POWER1` | out | switch relay state (`1`/`0`) |
//! | `Q/<id>/cmnd/backlog` | in | commands |

use std::fmt;

/// Topic prefix shared by all Qilowatt devices.
pub const TOPIC_PREFIX: &str = "Q";

/// The fixed set of topics belonging to one device.
///
/// # Examples
///
/// ```
/// use qilowatt::DeviceTopics;
///
/// let topics = DeviceTopics::new("inv-42");
/// assert_eq!(topics.sensor(), "Q/inv-42/SENSOR");
/// assert_eq!(topics.command(), "Q/inv-42/cmnd/backlog");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    device_id: String,
    sensor: String,
    state: String,
    status0: String,
    power: String,
    command: String,
}

impl DeviceTopics {
    /// Derives all topics for the given device identifier.
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        let device_id = device_id.into();
        let base = format!("{TOPIC_PREFIX}/{device_id}");
        Self {
            sensor: format!("{base}/SENSOR"),
            state: format!("{base}/STATE"),
            status0: format!("{base}/STATUS0"),
            power: format!("{base}/POWER1"),
            command: format!("{base}/cmnd/backlog"),
            device_id,
        }
    }

    /// Returns the device identifier the topics were derived from.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Fast telemetry topic.
    #[must_use]
    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    /// Medium state topic.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Slow status snapshot topic.
    #[must_use]
    pub fn status0(&self) -> &str {
        &self.status0
    }

    /// Binary relay state topic (switch devices only).
    #[must_use]
    pub fn power(&self) -> &str {
        &self.power
    }

    /// Inbound command topic.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl fmt::Display for DeviceTopics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TOPIC_PREFIX}/{}", self.device_id)
    }
}
