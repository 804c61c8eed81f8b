// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Switch device.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::command::{Command, SwitchCommand};
use crate::device::{Device, DeviceCore};
use crate::environment::EnvironmentInfo;
use crate::telemetry::{Payload, StatePayload, SwitchSensor, format_time};
use crate::types::{PowerState, StartupInfo};

const DEVICE_NAME: &str = "Qilowatt Switch";

type PowerCallback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct SwitchState {
    power: PowerState,
    callback: Option<PowerCallback>,
}

/// A single-relay switch.
///
/// A switch has no required measurements and is ready as soon as it is
/// created. Every state change, local or commanded, is pushed immediately
/// as SENSOR, STATE and `POWER1` (`1`/`0`) on top of the periodic
/// publications.
///
/// # Examples
///
/// ```
/// use qilowatt::{Device, SwitchDevice};
///
/// let switch = SwitchDevice::new("sw-1");
/// assert!(switch.is_ready());
/// assert!(!switch.is_on());
///
/// switch.handle_command(b"POWER1 1");
/// assert!(switch.is_on());
///
/// switch.turn_off();
/// assert!(!switch.is_on());
/// ```
pub struct SwitchDevice {
    core: DeviceCore,
    state: Mutex<SwitchState>,
    // Held across mutate, publish and notify so reports follow state order.
    update: Mutex<()>,
}

impl SwitchDevice {
    /// Creates a switch with the given device identifier, initially off.
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            core: DeviceCore::new(device_id, DEVICE_NAME, true),
            state: Mutex::new(SwitchState::default()),
            update: Mutex::new(()),
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

    /// Registers the callback invoked after each relay change.
    ///
    /// Replaces any previously registered callback. The callback receives
    /// `true` when the relay is on. Changes are reported one at a time, in
    /// the order they were applied; the callback may read the switch but
    /// must not change it.
    pub fn set_command_callback<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.state.lock().callback = Some(Arc::new(callback));
    }

    /// Returns `true` when the relay is on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.state.lock().power.is_on()
    }

    /// Returns the relay state.
    #[must_use]
    pub fn power(&self) -> PowerState {
        self.state.lock().power
    }

    /// Turns the relay on.
    pub fn turn_on(&self) {
        self.set_power(PowerState::On);
    }

    /// Turns the relay off.
    pub fn turn_off(&self) {
        self.set_power(PowerState::Off);
    }

    /// Sets the relay, pushes the update and notifies the callback.
    pub fn set_power(&self, power: PowerState) {
        let _update = self.update.lock();
        let (sensor, state, callback) = {
            let mut guard = self.state.lock();
            guard.power = power;
            let now = Utc::now();
            (
                sensor_payload(power, now),
                self.state_payload(power, now),
                guard.callback.clone(),
            )
        };
        tracing::info!(device = %self.core.device_id(), power = %power, "Switch state changed");

        let topics = self.core.topics();
        self.core.publish(topics.sensor(), &sensor);
        self.core.publish(topics.state(), &state);
        self.core.publish(topics.power(), &Payload::from(power.as_num()));

        if let Some(callback) = callback {
            callback(power.is_on());
        }
    }

    fn state_payload(&self, power: PowerState, now: DateTime<Utc>) -> Payload {
        Payload::record(
            &StatePayload::new(format_time(now), self.core.startup().uptime_secs(now))
                .with_power(power),
        )
    }
}

fn sensor_payload(power: PowerState, now: DateTime<Utc>) -> Payload {
    Payload::record(&SwitchSensor::new(format_time(now), power))
}

impl Device for SwitchDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn snapshot_fast(&self) -> Payload {
        let power = self.state.lock().power;
        sensor_payload(power, Utc::now())
    }

    fn snapshot_medium(&self) -> Payload {
        let power = self.state.lock().power;
        self.state_payload(power, Utc::now())
    }

    fn handle_command(&self, payload: &[u8]) {
        match SwitchCommand::decode(payload) {
            Ok(command) => self.set_power(command.state()),
            Err(e) => tracing::warn!(
                device = %self.core.device_id(),
                error = %e,
                "Ignoring invalid switch command"
            ),
        }
    }
}

impl std::fmt::Debug for SwitchDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchDevice")
            .field("core", &self.core)
            .field("power", &self.power())
            .finish_non_exhaustive()
    }
}
