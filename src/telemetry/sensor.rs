// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SENSOR telemetry records.

use serde::{Deserialize, Serialize};

use crate::command::WorkModeCommand;
use crate::types::PowerState;

/// Grid-side energy readings of an inverter.
///
/// Per-phase values are listed in phase order (L1, L2, L3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnergyData {
    /// Active power per phase (W).
    pub power: Vec<f64>,
    /// Energy produced today (kWh).
    pub today: f64,
    /// Total energy produced (kWh).
    pub total: f64,
    /// Current per phase (A).
    pub current: Vec<f64>,
    /// Voltage per phase (V).
    pub voltage: Vec<f64>,
    /// Grid frequency (Hz).
    pub frequency: f64,
}

/// PV, load and battery metrics of an inverter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricsData {
    /// Power per PV string (W).
    pub pv_power: Vec<f64>,
    /// Voltage per PV string (V).
    pub pv_voltage: Vec<f64>,
    /// Current per PV string (A).
    pub pv_current: Vec<f64>,
    /// Load power per phase (W).
    pub load_power: Vec<f64>,
    /// Battery state of charge (%).
    #[serde(rename = "BatterySOC")]
    pub battery_soc: i32,
    /// Load current per phase (A).
    pub load_current: Vec<f64>,
    /// Battery power (W), positive when charging.
    pub battery_power: Vec<f64>,
    /// Battery current (A).
    pub battery_current: Vec<f64>,
    /// Battery voltage (V).
    pub battery_voltage: Vec<f64>,
    /// Configured grid export limit (W).
    pub grid_export_limit: f64,
    /// Battery temperatures (°C).
    pub battery_temperature: Vec<f64>,
    /// Inverter temperature (°C).
    pub inverter_temperature: f64,
    /// Active alarm codes.
    #[serde(default = "default_alarm_codes")]
    pub alarm_codes: Vec<i32>,
    /// Inverter status code.
    #[serde(default = "default_inverter_status")]
    pub inverter_status: i32,
}

fn default_alarm_codes() -> Vec<i32> {
    vec![0; 6]
}

const fn default_inverter_status() -> i32 {
    2
}

impl Default for MetricsData {
    fn default() -> Self {
        Self {
            pv_power: Vec::new(),
            pv_voltage: Vec::new(),
            pv_current: Vec::new(),
            load_power: Vec::new(),
            battery_soc: 0,
            load_current: Vec::new(),
            battery_power: Vec::new(),
            battery_current: Vec::new(),
            battery_voltage: Vec::new(),
            grid_export_limit: 0.0,
            battery_temperature: Vec::new(),
            inverter_temperature: 0.0,
            alarm_codes: default_alarm_codes(),
            inverter_status: default_inverter_status(),
        }
    }
}

/// Reachability block of the SENSOR document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PingData {
    /// Always `true` while the adapter is publishing.
    pub reachable: bool,
}

impl Default for PingData {
    fn default() -> Self {
        Self { reachable: true }
    }
}

/// Controller temperature block expected by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Esp32Data {
    /// Controller temperature (°C).
    pub temperature: f64,
}

impl Default for Esp32Data {
    fn default() -> Self {
        Self { temperature: 64.4 }
    }
}

/// Component versions reported to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionData {
    /// Filesystem version.
    pub fs: &'static str,
    /// LED firmware version.
    pub led: &'static str,
    /// Inverter firmware version.
    pub inverter: &'static str,
    /// Qilowatt firmware version.
    pub qilowatt: &'static str,
    /// Register map version.
    pub registers: f64,
}

impl Default for VersionData {
    fn default() -> Self {
        Self {
            fs: "24.7.1",
            led: "24.3.1",
            inverter: "24.10.2",
            qilowatt: "24.8.1",
            registers: 2.5,
        }
    }
}

/// The inverter's SENSOR document.
///
/// Borrows the device's measurement sets so a snapshot is serialized
/// without copying them.
#[derive(Debug, Serialize)]
pub struct InverterSensor<'a> {
    /// Snapshot time.
    #[serde(rename = "Time")]
    pub time: String,
    /// Relay state; inverters report `0`.
    #[serde(rename = "POWER1")]
    pub power1: u8,
    /// Reachability.
    #[serde(rename = "PING")]
    pub ping: PingData,
    /// Controller temperature.
    #[serde(rename = "ESP32")]
    pub esp32: Esp32Data,
    /// Grid energy readings.
    #[serde(rename = "ENERGY")]
    pub energy: &'a EnergyData,
    /// PV, load and battery metrics.
    #[serde(rename = "METRICS")]
    pub metrics: &'a MetricsData,
    /// Component versions.
    #[serde(rename = "VERSION")]
    pub version: VersionData,
    /// Temperature unit.
    #[serde(rename = "TempUnit")]
    pub temp_unit: &'static str,
    /// Active work mode.
    #[serde(rename = "WORKMODE")]
    pub work_mode: &'a WorkModeCommand,
}

impl<'a> InverterSensor<'a> {
    /// Builds the document from the current measurements and work mode.
    #[must_use]
    pub fn new(
        time: String,
        energy: &'a EnergyData,
        metrics: &'a MetricsData,
        work_mode: &'a WorkModeCommand,
    ) -> Self {
        Self {
            time,
            power1: 0,
            ping: PingData::default(),
            esp32: Esp32Data::default(),
            energy,
            metrics,
            version: VersionData::default(),
            temp_unit: "C",
            work_mode,
        }
    }
}

/// The switch's SENSOR document.
#[derive(Debug, Serialize)]
pub struct SwitchSensor {
    /// Snapshot time.
    #[serde(rename = "Time")]
    pub time: String,
    /// Relay state (`ON`/`OFF`).
    #[serde(rename = "Switch1")]
    pub switch1: &'static str,
}

impl SwitchSensor {
    /// Builds the document for the given relay state.
    #[must_use]
    pub fn new(time: String, state: PowerState) -> Self {
        Self {
            time,
            switch1: state.as_str(),
        }
    }
}
