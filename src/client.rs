// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker session for one device.

use std::sync::Arc;
use std::time::Duration;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::protocol::{MqttBroker, MqttBrokerBuilder, TransportAdapter};
use crate::scheduler::{PublishIntervals, PublishScheduler};

/// Connects one device to Qilowatt.
///
/// The client owns the broker connection, the [`TransportAdapter`] and the
/// [`PublishScheduler`]. Once connected, telemetry is published on the
/// configured cadences and backend commands are delivered to the device.
///
/// # Examples
///
/// ```no_run
/// use qilowatt::{InverterDevice, QilowattClient};
/// use qilowatt::telemetry::{EnergyData, MetricsData};
///
/// # async fn example() -> qilowatt::Result<()> {
/// let client = QilowattClient::builder(InverterDevice::new("inverter-id"))
///     .credentials("username", "password")
///     .build()?;
///
/// client.device().set_command_callback(|cmd| {
///     println!("work mode: {:?}", cmd.mode());
/// });
/// client.connect().await?;
///
/// client.device().set_energy_data(EnergyData::default());
/// client.device().set_metrics_data(MetricsData::default());
///
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct QilowattClient<D: Device> {
    device: Arc<D>,
    broker: MqttBroker,
    adapter: Arc<TransportAdapter>,
}

impl<D: Device> QilowattClient<D> {
    /// Creates a builder for a session publishing `device`.
    #[must_use]
    pub fn builder(device: D) -> QilowattClientBuilder<D> {
        QilowattClientBuilder::new(Arc::new(device))
    }

    /// Returns the device.
    #[must_use]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Returns the broker connection.
    #[must_use]
    pub fn broker(&self) -> &MqttBroker {
        &self.broker
    }

    /// Returns the session adapter.
    #[must_use]
    pub fn adapter(&self) -> &Arc<TransportAdapter> {
        &self.adapter
    }

    /// Returns whether the session is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    /// Connects to the broker and waits for the session to be established.
    ///
    /// Publishing starts once the device is ready. A client can connect
    /// again after [`disconnect`](Self::disconnect) or a lost connection;
    /// there is no automatic reconnect.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::AuthenticationFailed`](crate::ProtocolError::AuthenticationFailed)
    ///   if the broker rejects the credentials
    /// - [`ProtocolError::ConnectionFailed`](crate::ProtocolError::ConnectionFailed)
    ///   if the broker cannot be reached or refuses the session
    /// - [`ProtocolError::Timeout`](crate::ProtocolError::Timeout) if the
    ///   broker does not answer in time
    pub async fn connect(&self) -> Result<()> {
        self.broker.start(Arc::clone(&self.adapter)).await?;
        Ok(())
    }

    /// Stops publishing, then closes the broker connection.
    ///
    /// Returns once no activity can publish anymore. Safe to call when not
    /// connected.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Mqtt`](crate::ProtocolError::Mqtt) if the
    /// disconnect request cannot be queued. Publishing is stopped regardless.
    pub async fn disconnect(&self) -> Result<()> {
        self.adapter.on_disconnect().await;
        self.broker.shutdown().await?;
        Ok(())
    }
}

impl<D: Device> std::fmt::Debug for QilowattClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QilowattClient")
            .field("device", &self.device.topics().device_id())
            .field("broker", &self.broker)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builder for [`QilowattClient`].
///
/// Broker settings default to the Qilowatt test broker over TLS
/// (`test-mqtt.qilowatt.it:8883`).
#[derive(Debug)]
pub struct QilowattClientBuilder<D: Device> {
    device: Arc<D>,
    broker: MqttBrokerBuilder,
    intervals: PublishIntervals,
}

impl<D: Device> QilowattClientBuilder<D> {
    fn new(device: Arc<D>) -> Self {
        Self {
            device,
            broker: MqttBroker::builder(),
            intervals: PublishIntervals::default(),
        }
    }

    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.broker = self.broker.host(host);
        self
    }

    /// Sets the broker port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.broker = self.broker.port(port);
        self
    }

    /// Enables or disables TLS.
    #[must_use]
    pub fn tls(mut self, tls: bool) -> Self {
        self.broker = self.broker.tls(tls);
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.broker = self.broker.credentials(username, password);
        self
    }

    /// Sets the keep-alive interval.
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.broker = self.broker.keep_alive(duration);
        self
    }

    /// Sets how long [`QilowattClient::connect`] waits for the broker.
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.broker = self.broker.connection_timeout(duration);
        self
    }

    /// Sets the client identifier.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.broker = self.broker.client_id(client_id);
        self
    }

    /// Sets the publishing periods.
    #[must_use]
    pub fn intervals(mut self, intervals: PublishIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Builds the client without connecting.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`] if a publishing period is zero
    /// - [`ProtocolError::InvalidAddress`](crate::ProtocolError::InvalidAddress)
    ///   if the broker address is invalid
    pub fn build(self) -> Result<QilowattClient<D>> {
        self.intervals.validate()?;
        let broker = self.broker.build().map_err(Error::from)?;

        let device: Arc<dyn Device> = self.device.clone();
        let adapter = Arc::new(TransportAdapter::new(
            device,
            Arc::new(broker.clone()),
            PublishScheduler::new(self.intervals),
            broker.mqtt_info(),
        ));

        Ok(QilowattClient {
            device: self.device,
            broker,
            adapter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{InverterDevice, SwitchDevice};
    use crate::error::ProtocolError;
    use crate::scheduler::SchedulerState;

    #[test]
    fn build_wires_device_and_broker() {
        let client = QilowattClient::builder(SwitchDevice::new("sw"))
            .host("127.0.0.1")
            .port(1883)
            .tls(false)
            .credentials("user", "pw")
            .client_id("QWAPI_00C0DE")
            .build()
            .unwrap();

        assert!(!client.is_connected());
        assert_eq!(client.broker().client_id(), "QWAPI_00C0DE");
        assert_eq!(client.device().topics().command(), "Q/sw/cmnd/backlog");
        assert_eq!(client.adapter().scheduler().state(), SchedulerState::Idle);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let result = QilowattClient::builder(InverterDevice::new("inv"))
            .intervals(PublishIntervals::default().with_fast(Duration::ZERO))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn empty_host_is_rejected() {
        let result = QilowattClient::builder(InverterDevice::new("inv"))
            .host("")
            .build();
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::InvalidAddress(_)))
        ));
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_noop() {
        let client = QilowattClient::builder(SwitchDevice::new("sw"))
            .host("127.0.0.1")
            .tls(false)
            .build()
            .unwrap();
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn connect_to_unreachable_broker_fails() {
        let client = QilowattClient::builder(SwitchDevice::new("sw"))
            .host("127.0.0.1")
            .port(1)
            .tls(false)
            .connection_timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ConnectionFailed(_) | ProtocolError::Timeout(_))
        ));
        assert!(!client.is_connected());
    }
}
