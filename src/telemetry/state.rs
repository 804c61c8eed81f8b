// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STATE telemetry record.

use serde::Serialize;

use crate::types::PowerState;

/// The STATE document: time, uptime and, for switches, the relay state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatePayload {
    /// Snapshot time.
    #[serde(rename = "Time")]
    pub time: String,
    /// Seconds since device startup.
    #[serde(rename = "Uptime")]
    pub uptime: u64,
    /// Relay state (`ON`/`OFF`), switches only.
    #[serde(rename = "POWER1", skip_serializing_if = "Option::is_none")]
    pub power1: Option<&'static str>,
}

impl StatePayload {
    /// Builds a STATE document without relay state.
    #[must_use]
    pub fn new(time: String, uptime: u64) -> Self {
        Self {
            time,
            uptime,
            power1: None,
        }
    }

    /// Adds the relay state.
    #[must_use]
    pub fn with_power(mut self, state: PowerState) -> Self {
        self.power1 = Some(state.as_str());
        self
    }
}
