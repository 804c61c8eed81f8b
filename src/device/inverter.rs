// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inverter device.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::command::{Command, WorkModeCommand};
use crate::device::{Device, DeviceCore};
use crate::environment::EnvironmentInfo;
use crate::telemetry::{
    EnergyData, InverterSensor, MetricsData, Payload, StatePayload, format_time,
};
use crate::types::StartupInfo;

/// Device name reported in STATUS0.
const DEVICE_NAME: &str = "Qilowatt Inverter";

type WorkModeCallback = Arc<dyn Fn(WorkModeCommand) + Send + Sync>;

/// A measurement set an inverter must receive before it can publish.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    /// Grid energy readings.
    Energy(EnergyData),
    /// PV, load and battery metrics.
    Metrics(MetricsData),
}

impl Measurement {
    /// Returns which set this measurement belongs to.
    #[must_use]
    pub fn kind(&self) -> MeasurementKind {
        match self {
            Self::Energy(_) => MeasurementKind::Energy,
            Self::Metrics(_) => MeasurementKind::Metrics,
        }
    }
}

/// Names of the inverter measurement sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    /// `ENERGY` block.
    Energy,
    /// `METRICS` block.
    Metrics,
}

impl MeasurementKind {
    /// Returns the telemetry block name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Energy => "ENERGY",
            Self::Metrics => "METRICS",
        }
    }
}

#[derive(Default)]
struct InverterState {
    energy: Option<EnergyData>,
    metrics: Option<MetricsData>,
    work_mode: WorkModeCommand,
    callback: Option<WorkModeCallback>,
}

/// An inverter publishing grid energy, PV/battery metrics and its work mode.
///
/// The inverter becomes ready once both [`EnergyData`] and [`MetricsData`]
/// have been set at least once; until then fast and medium snapshots are
/// empty. The backend controls it with `WORKMODE <json>` commands.
///
/// # Examples
///
/// ```
/// use qilowatt::{Device, InverterDevice};
///
/// let inverter = InverterDevice::new("inv-1");
/// inverter.set_command_callback(|cmd| println!("new mode: {:?}", cmd.mode()));
///
/// inverter.handle_command(br#"WORKMODE {"Mode":"eco"}"#);
/// assert_eq!(inverter.work_mode().mode(), Some("eco"));
///
/// // Malformed commands are ignored.
/// inverter.handle_command(b"WORKMODE nope");
/// assert_eq!(inverter.work_mode().mode(), Some("eco"));
/// ```
pub struct InverterDevice {
    core: DeviceCore,
    state: Mutex<InverterState>,
}

impl InverterDevice {
    /// Creates an inverter with the given device identifier.
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            core: DeviceCore::new(device_id, DEVICE_NAME, false),
            state: Mutex::new(InverterState::default()),
        }
    }

    /// Replaces the environment provider used for STATUS0.
    #[must_use]
    pub fn with_environment(mut self, environment: Arc<dyn EnvironmentInfo>) -> Self {
        self.core = self.core.with_environment(environment);
        self
    }

    /// Replaces the startup metadata reported in STATUS0.
    #[must_use]
    pub fn with_startup(mut self, startup: StartupInfo) -> Self {
        self.core = self.core.with_startup(startup);
        self
    }

    /// Stores a measurement set, replacing the previous value of that set.
    ///
    /// Returns `true` only for the call that made the device ready.
    pub fn set_measurement(&self, measurement: Measurement) -> bool {
        let kind = measurement.kind();
        let mut state = self.state.lock();
        match measurement {
            Measurement::Energy(energy) => state.energy = Some(energy),
            Measurement::Metrics(metrics) => state.metrics = Some(metrics),
        }
        tracing::trace!(device = %self.core.device_id(), set = kind.as_str(), "Measurement updated");

        if state.energy.is_some() && state.metrics.is_some() {
            self.core.mark_ready()
        } else {
            false
        }
    }

    /// Stores the energy readings.
    ///
    /// Returns `true` only for the call that made the device ready.
    pub fn set_energy_data(&self, energy: EnergyData) -> bool {
        self.set_measurement(Measurement::Energy(energy))
    }

    /// Stores the metrics.
    ///
    /// Returns `true` only for the call that made the device ready.
    pub fn set_metrics_data(&self, metrics: MetricsData) -> bool {
        self.set_measurement(Measurement::Metrics(metrics))
    }

    /// Registers the callback invoked after each accepted work mode command.
    ///
    /// Replaces any previously registered callback. The callback runs on the
    /// thread that delivered the command and must not block.
    pub fn set_command_callback<F>(&self, callback: F)
    where
        F: Fn(WorkModeCommand) + Send + Sync + 'static,
    {
        self.state.lock().callback = Some(Arc::new(callback));
    }

    /// Returns the current work mode.
    #[must_use]
    pub fn work_mode(&self) -> WorkModeCommand {
        self.state.lock().work_mode.clone()
    }
}

impl Device for InverterDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn snapshot_fast(&self) -> Payload {
        let state = self.state.lock();
        let (Some(energy), Some(metrics)) = (&state.energy, &state.metrics) else {
            return Payload::empty();
        };
        Payload::record(&InverterSensor::new(
            format_time(Utc::now()),
            energy,
            metrics,
            &state.work_mode,
        ))
    }

    fn snapshot_medium(&self) -> Payload {
        if !self.core.is_ready() {
            return Payload::empty();
        }
        let now = Utc::now();
        Payload::record(&StatePayload::new(
            format_time(now),
            self.core.startup().uptime_secs(now),
        ))
    }

    fn handle_command(&self, payload: &[u8]) {
        let command = match WorkModeCommand::decode(payload) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    device = %self.core.device_id(),
                    error = %e,
                    "Ignoring invalid work mode command"
                );
                return;
            }
        };

        let callback = {
            let mut state = self.state.lock();
            state.work_mode = command.clone();
            state.callback.clone()
        };
        tracing::info!(
            device = %self.core.device_id(),
            mode = command.mode().unwrap_or_default(),
            "Work mode updated"
        );

        if let Some(callback) = callback {
            callback(command);
        }
    }
}

impl std::fmt::Debug for InverterDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InverterDevice")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn energy() -> EnergyData {
        EnergyData {
            power: vec![100.0, 100.0, 100.0],
            today: 5.0,
            total: 1000.0,
            current: vec![5.0, 5.0, 5.0],
            voltage: vec![230.0, 230.0, 230.0],
            frequency: 50.0,
        }
    }

    #[test]
    fn not_ready_until_both_sets_present() {
        let inverter = InverterDevice::new("inv");
        assert!(!inverter.is_ready());
        assert!(inverter.snapshot_fast().is_empty());
        assert!(inverter.snapshot_medium().is_empty());

        assert!(!inverter.set_energy_data(energy()));
        assert!(!inverter.is_ready());
        assert!(inverter.snapshot_fast().is_empty());

        assert!(inverter.set_metrics_data(MetricsData::default()));
        assert!(inverter.is_ready());
        assert!(!inverter.snapshot_fast().is_empty());
        assert!(!inverter.snapshot_medium().is_empty());
    }

    #[test]
    fn ready_transition_reported_once() {
        let inverter = InverterDevice::new("inv");
        assert!(!inverter.set_metrics_data(MetricsData::default()));
        assert!(inverter.set_energy_data(energy()));
        assert!(!inverter.set_energy_data(energy()));
        assert!(!inverter.set_metrics_data(MetricsData::default()));
        assert!(inverter.is_ready());
    }

    #[test]
    fn concurrent_measurements_become_ready_exactly_once() {
        let inverter = Arc::new(InverterDevice::new("inv"));
        let transitions = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let inverter = Arc::clone(&inverter);
                let transitions = Arc::clone(&transitions);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let ready = if i % 2 == 0 {
                            inverter.set_energy_data(energy())
                        } else {
                            inverter.set_metrics_data(MetricsData::default())
                        };
                        if ready {
                            transitions.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(transitions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn latest_measurement_wins() {
        let inverter = InverterDevice::new("inv");
        inverter.set_metrics_data(MetricsData::default());
        inverter.set_energy_data(energy());
        inverter.set_energy_data(EnergyData {
            frequency: 49.9,
            ..energy()
        });

        let payload = inverter.snapshot_fast();
        assert_eq!(payload.as_json()["ENERGY"]["Frequency"], 49.9);
    }

    #[test]
    fn sensor_snapshot_carries_work_mode() {
        let inverter = InverterDevice::new("inv");
        inverter.set_energy_data(energy());
        inverter.set_metrics_data(MetricsData::default());
        inverter.handle_command(br#"WORKMODE {"Mode":"sell","PowerLimit":3000}"#);

        let json = inverter.snapshot_fast().as_json().clone();
        assert_eq!(json["WORKMODE"]["Mode"], "sell");
        assert_eq!(json["WORKMODE"]["PowerLimit"], 3000);
        assert_eq!(json["POWER1"], 0);
    }

    #[test]
    fn fractional_work_mode_values_are_accepted() {
        let inverter = InverterDevice::new("inv");
        inverter.handle_command(br#"WORKMODE {"Mode":"eco","BatterySoc":95.5}"#);

        let work_mode = inverter.work_mode();
        assert_eq!(work_mode.mode(), Some("eco"));
        assert_eq!(
            work_mode.battery_soc.as_ref().and_then(serde_json::Number::as_f64),
            Some(95.5)
        );
    }

    #[test]
    fn medium_snapshot_reports_uptime() {
        let inverter = InverterDevice::new("inv");
        inverter.set_energy_data(energy());
        inverter.set_metrics_data(MetricsData::default());

        let json = inverter.snapshot_medium().as_json().clone();
        assert!(json["Uptime"].is_u64());
        assert!(json["Time"].is_string());
        assert!(json.get("POWER1").is_none());
    }

    #[test]
    fn slow_snapshot_available_before_ready() {
        let inverter = InverterDevice::new("inv");
        let json = inverter.snapshot_slow().as_json().clone();
        assert_eq!(json["Status"]["DeviceName"], DEVICE_NAME);
        assert_eq!(json["Status"]["Topic"], "inv");
    }

    #[test]
    fn default_work_mode_is_normal() {
        let inverter = InverterDevice::new("inv");
        assert_eq!(inverter.work_mode(), WorkModeCommand::default());
    }

    #[test]
    fn valid_command_replaces_state_and_fires_callback() {
        let inverter = InverterDevice::new("inv");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        inverter.set_command_callback(move |cmd| sink.lock().push(cmd));

        inverter.handle_command(br#"WORKMODE {"Mode":"buy","BatterySoc":95}"#);

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].mode(), Some("buy"));
        assert_eq!(received[0].battery_soc, Some(serde_json::Number::from(95)));
        assert_eq!(inverter.work_mode(), received[0]);
    }

    #[test]
    fn invalid_commands_leave_state_untouched() {
        let inverter = InverterDevice::new("inv");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        inverter.set_command_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        inverter.handle_command(b"WORKMODE {not json");
        inverter.handle_command(br#"WORKMODE ["buy"]"#);
        inverter.handle_command(b"POWER1 1");
        inverter.handle_command(&[0xff, 0xfe]);
        inverter.handle_command(b"");

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(inverter.work_mode(), WorkModeCommand::default());
    }

    #[test]
    fn last_registered_callback_wins() {
        let inverter = InverterDevice::new("inv");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        inverter.set_command_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&second);
        inverter.set_command_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        inverter.handle_command(br#"WORKMODE {"Mode":"eco"}"#);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_read_device_state() {
        let inverter = Arc::new(InverterDevice::new("inv"));
        let seen = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&inverter);
        let slot = Arc::clone(&seen);
        inverter.set_command_callback(move |_| {
            if let Some(inverter) = weak.upgrade() {
                *slot.lock() = inverter.work_mode().mode().map(str::to_string);
            }
        });

        inverter.handle_command(br#"WORKMODE {"Mode":"eco"}"#);
        assert_eq!(seen.lock().as_deref(), Some("eco"));
    }
}
