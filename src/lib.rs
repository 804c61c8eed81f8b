// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Qilowatt device adapter.
//!
//! This library publishes the telemetry of an energy device to the Qilowatt
//! backend over MQTT and delivers the backend's commands to it, speaking the
//! Tasmota-style topic convention the backend expects:
//!
//! | Topic | Direction | Cadence |
//! |-------|-----------|---------|
//! | `Q/<id>/SENSOR` | out | every 10 s |
//! | `Q/<id>/STATE` | out | every 60 s |
//! | `Q/<id>/STATUS0` | out | on start, then every hour |
//! | `Q/<id>/POWER1` | out | on switch state change |
//! | `Q/<id>/cmnd/backlog` | in | `WORKMODE <json>`, `POWER1 1`, `POWER1 0` |
//!
//! # Supported Devices
//!
//! - [`InverterDevice`]: grid energy, PV/battery metrics, work mode control
//! - [`SwitchDevice`]: single relay
//!
//! Periodic publishing only starts once the device is ready (for an
//! inverter: after both ENERGY and METRICS were set).
//!
//! # Quick Start
//!
//! ```no_run
//! use qilowatt::{InverterDevice, QilowattClient};
//! use qilowatt::telemetry::{EnergyData, MetricsData};
//!
//! #[tokio::main]
//! async fn main() -> qilowatt::Result<()> {
//!     let client = QilowattClient::builder(InverterDevice::new("inverter-id"))
//!         .host("mqtt.qilowatt.it")
//!         .credentials("username", "password")
//!         .build()?;
//!
//!     client.device().set_command_callback(|cmd| {
//!         println!("Switching to {:?}", cmd.mode());
//!     });
//!     client.connect().await?;
//!
//!     // Feed readings as they arrive; the scheduler publishes the latest.
//!     client.device().set_energy_data(EnergyData::default());
//!     client.device().set_metrics_data(MetricsData::default());
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!     client.disconnect().await
//! }
//! ```
//!
//! # Custom Transports
//!
//! The session logic does not depend on `rumqttc`: implement
//! [`protocol::BrokerClient`] and drive a [`protocol::TransportAdapter`]
//! from your own event loop. Disable the default `mqtt` feature to drop the
//! `rumqttc` dependency.

#[cfg(feature = "mqtt")]
mod client;
pub mod command;
pub mod device;
pub mod environment;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod telemetry;
pub mod topics;
pub mod types;

#[cfg(feature = "mqtt")]
pub use client::{QilowattClient, QilowattClientBuilder};
pub use command::{Command, SwitchCommand, WorkModeCommand};
pub use device::{Device, DeviceCore, InverterDevice, Measurement, MeasurementKind, SwitchDevice};
pub use error::{CommandError, Error, ProtocolError, Result};
#[cfg(feature = "mqtt")]
pub use protocol::{MqttBroker, MqttBrokerBuilder, MqttBrokerConfig};
pub use protocol::{BrokerClient, PublishOutcome, PublishSink, TransportAdapter};
pub use scheduler::{Cadence, PublishIntervals, PublishScheduler, SchedulerState};
pub use topics::DeviceTopics;
pub use types::{PowerState, StartupInfo};
