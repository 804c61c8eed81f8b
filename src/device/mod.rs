// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Devices published to Qilowatt.
//!
//! A device owns its measurements and command state, decides when it is
//! ready to publish, and builds point-in-time payloads for the scheduler.
//! Every variant implements the [`Device`] trait and embeds a
//! [`DeviceCore`] carrying what all variants share: topics, startup
//! metadata, the readiness signal and the session the device is attached
//! to.
//!
//! # Variants
//!
//! - [`InverterDevice`]: ready once both ENERGY and METRICS were set,
//!   accepts `WORKMODE` commands
//! - [`SwitchDevice`]: ready immediately, accepts `POWER1 1` / `POWER1 0`
//!
//! # Examples
//!
//! ```
//! use qilowatt::{Device, InverterDevice};
//! use qilowatt::telemetry::{EnergyData, MetricsData};
//!
//! let inverter = InverterDevice::new("inv-1");
//! assert!(!inverter.is_ready());
//!
//! inverter.set_energy_data(EnergyData::default());
//! assert!(inverter.snapshot_fast().is_empty());
//!
//! assert!(inverter.set_metrics_data(MetricsData::default()));
//! assert!(inverter.is_ready());
//! ```

mod inverter;
mod switch;

pub use inverter::{InverterDevice, Measurement, MeasurementKind};
pub use switch::SwitchDevice;

use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::environment::{EnvironmentInfo, SystemEnvironment};
use crate::protocol::{PublishOutcome, PublishSink};
use crate::telemetry::{MqttInfo, Payload, Status0, StatusDevice};
use crate::topics::DeviceTopics;
use crate::types::StartupInfo;

/// Telemetry period reported in STATUS0 until a session sets one.
const DEFAULT_TELE_PERIOD_SECS: u64 = 10;

/// Capabilities every publishable device provides.
///
/// The scheduler and the transport adapter only see devices through this
/// trait. All methods must return quickly and never wait on I/O.
pub trait Device: Send + Sync + 'static {
    /// Returns the shared device core.
    fn core(&self) -> &DeviceCore;

    /// Builds the fast (SENSOR) snapshot.
    ///
    /// Returns [`Payload::empty`] while the device is not ready.
    fn snapshot_fast(&self) -> Payload;

    /// Builds the medium (STATE) snapshot.
    ///
    /// Returns [`Payload::empty`] while the device is not ready.
    fn snapshot_medium(&self) -> Payload;

    /// Decodes and applies an inbound command.
    ///
    /// Never fails: malformed commands are logged and ignored.
    fn handle_command(&self, payload: &[u8]);

    /// Builds the slow (STATUS0) snapshot.
    ///
    /// Available regardless of readiness.
    fn snapshot_slow(&self) -> Payload {
        Payload::record(&self.core().status0())
    }

    /// Returns the device's topics.
    fn topics(&self) -> &DeviceTopics {
        self.core().topics()
    }

    /// Returns whether all required measurements have been set.
    fn is_ready(&self) -> bool {
        self.core().is_ready()
    }

    /// Returns a receiver observing the readiness flag.
    fn readiness(&self) -> watch::Receiver<bool> {
        self.core().readiness()
    }
}

/// Session details a device reports and publishes through.
struct SessionContext {
    sink: Option<Weak<dyn PublishSink>>,
    mqtt: Option<MqttInfo>,
    tele_period: u64,
}

/// State and identity shared by all device variants.
pub struct DeviceCore {
    topics: DeviceTopics,
    device_name: String,
    startup: StartupInfo,
    environment: Arc<dyn EnvironmentInfo>,
    ready_tx: watch::Sender<bool>,
    session: RwLock<SessionContext>,
}

impl DeviceCore {
    /// Creates a core for the given device identifier.
    ///
    /// Devices without required measurements pass `ready = true`.
    #[must_use]
    pub fn new(device_id: impl Into<String>, device_name: impl Into<String>, ready: bool) -> Self {
        let (ready_tx, _) = watch::channel(ready);
        Self {
            topics: DeviceTopics::new(device_id),
            device_name: device_name.into(),
            startup: StartupInfo::now(),
            environment: Arc::new(SystemEnvironment),
            ready_tx,
            session: RwLock::new(SessionContext {
                sink: None,
                mqtt: None,
                tele_period: DEFAULT_TELE_PERIOD_SECS,
            }),
        }
    }

    /// Replaces the environment provider.
    #[must_use]
    pub fn with_environment(mut self, environment: Arc<dyn EnvironmentInfo>) -> Self {
        self.environment = environment;
        self
    }

    /// Replaces the startup metadata.
    #[must_use]
    pub fn with_startup(mut self, startup: StartupInfo) -> Self {
        self.startup = startup;
        self
    }

    /// Returns the device's topics.
    #[must_use]
    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }

    /// Returns the device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        self.topics.device_id()
    }

    /// Returns the device name reported in STATUS0.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Returns the startup metadata.
    #[must_use]
    pub fn startup(&self) -> &StartupInfo {
        &self.startup
    }

    /// Returns whether the device is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Returns a receiver observing the readiness flag.
    #[must_use]
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// Flips readiness from false to true.
    ///
    /// Returns `true` only for the call that performed the transition.
    /// Variants call this while holding their state lock.
    pub(crate) fn mark_ready(&self) -> bool {
        let transitioned = self.ready_tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        });
        if transitioned {
            tracing::info!(device = %self.device_id(), "Device is ready to publish");
        }
        transitioned
    }

    /// Attaches the device to a broker session.
    pub(crate) fn attach(&self, sink: Weak<dyn PublishSink>, mqtt: MqttInfo, tele_period: u64) {
        let mut session = self.session.write();
        session.sink = Some(sink);
        session.mqtt = Some(mqtt);
        session.tele_period = tele_period;
    }

    /// Detaches the device from its broker session.
    pub(crate) fn detach(&self) {
        self.session.write().sink = None;
    }

    /// Publishes a payload through the attached session.
    ///
    /// Skipped when no session is attached or the session is gone.
    pub fn publish(&self, topic: &str, payload: &Payload) -> PublishOutcome {
        let sink = self.session.read().sink.as_ref().and_then(Weak::upgrade);
        match sink {
            Some(sink) => sink.publish(topic, payload),
            None => {
                tracing::debug!(
                    device = %self.device_id(),
                    topic = %topic,
                    "No session attached, dropping publish"
                );
                PublishOutcome::Skipped
            }
        }
    }

    /// Builds the STATUS0 document for the current time.
    #[must_use]
    pub fn status0(&self) -> Status0 {
        let (mqtt, tele_period) = {
            let session = self.session.read();
            (session.mqtt.clone(), session.tele_period)
        };
        Status0::build(
            StatusDevice::new(&self.device_name, self.device_id()),
            &self.startup,
            tele_period,
            self.environment.network(),
            self.environment.hardware(),
            mqtt.as_ref(),
            Utc::now(),
        )
    }
}

impl std::fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCore")
            .field("device_id", &self.device_id())
            .field("device_name", &self.device_name)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}
