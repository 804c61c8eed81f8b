// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT broker connection to Qilowatt.
//!
//! [`MqttBroker`] wraps a `rumqttc` client. Building it performs no I/O;
//! the connection is opened when a session starts polling the event loop,
//! and every connection event is forwarded to a [`TransportAdapter`].
//!
//! # Examples
//!
//! ```
//! use qilowatt::protocol::MqttBroker;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), qilowatt::ProtocolError> {
//! let broker = MqttBroker::builder()
//!     .host("mqtt.qilowatt.it")
//!     .credentials("user", "password")
//!     .keep_alive(Duration::from_secs(60))
//!     .build()?;
//!
//! assert_eq!(broker.port(), 8883);
//! assert!(broker.client_id().starts_with("QWAPI_"));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, Transport,
};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::error::ProtocolError;
use crate::protocol::{BrokerClient, TransportAdapter, connack_result};
use crate::telemetry::MqttInfo;

/// Broker used when no host is configured.
pub const DEFAULT_HOST: &str = "test-mqtt.qilowatt.it";

/// Port used when none is configured (MQTT over TLS).
pub const DEFAULT_PORT: u16 = 8883;

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 64;

/// Configuration for an MQTT broker connection.
#[derive(Debug, Clone)]
pub struct MqttBrokerConfig {
    host: String,
    port: u16,
    tls: bool,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
    client_id: Option<String>,
}

impl Default for MqttBrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: true,
            credentials: None,
            keep_alive: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(10),
            client_id: None,
        }
    }
}

impl MqttBrokerConfig {
    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns whether TLS is enabled.
    #[must_use]
    pub fn tls(&self) -> bool {
        self.tls
    }

    /// Returns the configured username, if any.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|(user, _)| user.as_str())
    }

    /// Returns the keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Returns how long a session waits for the broker's CONNACK.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }
}

/// Generates a client identifier of the form `QWAPI_XXXXXX`.
fn generate_client_id() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let suffix = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
    format!("QWAPI_{suffix:06X}")
}

/// Maps a CONNACK return code to its wire value.
fn return_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

enum Connection {
    Idle(EventLoop),
    Running {
        handle: JoinHandle<EventLoop>,
        cancel: oneshot::Sender<()>,
    },
    Closed,
}

/// Stops a session task and takes its event loop back.
async fn reclaim(handle: JoinHandle<EventLoop>, cancel: oneshot::Sender<()>) -> Connection {
    let _ = cancel.send(());
    match handle.await {
        Ok(event_loop) => Connection::Idle(event_loop),
        Err(e) => {
            tracing::error!(error = %e, "MQTT event loop task failed");
            Connection::Closed
        }
    }
}

/// An MQTT connection to the Qilowatt broker.
///
/// `MqttBroker` is cheaply cloneable (via `Arc`). All [`BrokerClient`]
/// operations only queue requests for the event loop and never wait.
#[derive(Clone)]
pub struct MqttBroker {
    inner: Arc<MqttBrokerInner>,
}

struct MqttBrokerInner {
    /// The MQTT async client used to queue requests.
    client: AsyncClient,
    /// Configuration used for this connection.
    config: MqttBrokerConfig,
    /// Client identifier sent in CONNECT.
    client_id: String,
    /// Event loop, or the task currently polling it.
    connection: Mutex<Connection>,
}

impl MqttBroker {
    /// Creates a new builder for configuring an MQTT broker connection.
    #[must_use]
    pub fn builder() -> MqttBrokerBuilder {
        MqttBrokerBuilder::default()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MqttBrokerConfig {
        &self.inner.config
    }

    /// Returns the host address of the broker.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Returns the port of the broker.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Returns the client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Returns the session details reported in STATUS0.
    #[must_use]
    pub fn mqtt_info(&self) -> MqttInfo {
        MqttInfo {
            host: self.inner.config.host.clone(),
            port: self.inner.config.port,
            client_id: self.inner.client_id.clone(),
            user: self
                .inner
                .config
                .username()
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Starts polling the event loop on behalf of `adapter` and waits for
    /// the broker's CONNACK.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::AuthenticationFailed`] or
    ///   [`ProtocolError::ConnectionFailed`] if the broker refuses the session
    /// - [`ProtocolError::Timeout`] if no CONNACK arrives in time
    /// - [`ProtocolError::ConnectionFailed`] if a session is already running
    pub(crate) async fn start(&self, adapter: Arc<TransportAdapter>) -> Result<(), ProtocolError> {
        let mut connection = self.inner.connection.lock().await;
        let mut event_loop = match std::mem::replace(&mut *connection, Connection::Closed) {
            Connection::Idle(event_loop) => event_loop,
            Connection::Running { handle, cancel } if !handle.is_finished() => {
                *connection = Connection::Running { handle, cancel };
                return Err(ProtocolError::ConnectionFailed(
                    "session already running".to_string(),
                ));
            }
            Connection::Running { handle, .. } => handle.await.map_err(|e| {
                ProtocolError::ConnectionFailed(format!("MQTT event loop failed: {e}"))
            })?,
            Connection::Closed => {
                return Err(ProtocolError::ConnectionFailed(
                    "MQTT event loop is gone".to_string(),
                ));
            }
        };

        // Drop the network of a previous session, if any.
        event_loop.clean();

        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            client_id = %self.inner.client_id,
            "Connecting to MQTT broker"
        );

        let (connack_tx, connack_rx) = oneshot::channel();
        let (cancel, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(handle_broker_events(
            event_loop,
            adapter,
            Some(connack_tx),
            cancel_rx,
        ));
        *connection = Connection::Running { handle, cancel };
        drop(connection);

        let timeout = self.inner.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProtocolError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            )),
            Err(_) => {
                tracing::warn!("No CONNACK from MQTT broker in time, giving up");
                self.cancel().await;
                Err(ProtocolError::Timeout(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        }
    }

    /// Requests disconnection and waits for the event loop to wind down.
    ///
    /// The event loop is kept so a later session can reconnect.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be queued. The event
    /// loop is still awaited.
    pub(crate) async fn shutdown(&self) -> Result<(), ProtocolError> {
        let mut connection = self.inner.connection.lock().await;
        if !matches!(&*connection, Connection::Running { .. }) {
            return Ok(());
        }
        let Connection::Running { mut handle, cancel } =
            std::mem::replace(&mut *connection, Connection::Closed)
        else {
            return Ok(());
        };

        let requested = if handle.is_finished() {
            Ok(())
        } else {
            self.disconnect()
        };

        *connection =
            match tokio::time::timeout(self.inner.config.connection_timeout, &mut handle).await {
                Ok(Ok(event_loop)) => Connection::Idle(event_loop),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "MQTT event loop task failed");
                    Connection::Closed
                }
                Err(_) => {
                    tracing::warn!("MQTT event loop did not stop in time, cancelling");
                    reclaim(handle, cancel).await
                }
            };
        requested
    }

    /// Cancels the running session, keeping the event loop for the next one.
    async fn cancel(&self) {
        let mut connection = self.inner.connection.lock().await;
        if !matches!(&*connection, Connection::Running { .. }) {
            return;
        }
        if let Connection::Running { handle, cancel } =
            std::mem::replace(&mut *connection, Connection::Closed)
        {
            *connection = reclaim(handle, cancel).await;
        }
    }
}

impl BrokerClient for MqttBroker {
    fn subscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.inner
            .client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(ProtocolError::Mqtt)
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ProtocolError> {
        self.inner
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(ProtocolError::Mqtt)
    }

    fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            "Disconnecting from MQTT broker"
        );
        self.inner
            .client
            .try_disconnect()
            .map_err(ProtocolError::Mqtt)
    }
}

impl std::fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBroker")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("tls", &self.inner.config.tls)
            .field("client_id", &self.inner.client_id)
            .finish()
    }
}

/// Builder for creating an MQTT broker connection.
///
/// # Examples
///
/// ```
/// use qilowatt::protocol::MqttBroker;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), qilowatt::ProtocolError> {
/// let broker = MqttBroker::builder()
///     .host("192.168.1.50")
///     .port(1883)
///     .tls(false)
///     .client_id("QWAPI_00BEEF")
///     .connection_timeout(Duration::from_secs(5))
///     .build()?;
/// assert_eq!(broker.client_id(), "QWAPI_00BEEF");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MqttBrokerBuilder {
    config: MqttBrokerConfig,
}

impl MqttBrokerBuilder {
    /// Sets the broker host address (default: `test-mqtt.qilowatt.it`).
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 8883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Enables or disables TLS (default: enabled).
    #[must_use]
    pub fn tls(mut self, tls: bool) -> Self {
        self.config.tls = tls;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 60 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Sets the client identifier (default: random `QWAPI_XXXXXX`).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    /// Builds the broker client without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidAddress`] if the host is empty or the
    /// port is zero.
    pub fn build(self) -> Result<MqttBroker, ProtocolError> {
        if self.config.host.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }
        if self.config.port == 0 {
            return Err(ProtocolError::InvalidAddress(format!(
                "invalid MQTT broker port for {}",
                self.config.host
            )));
        }

        let client_id = self
            .config
            .client_id
            .clone()
            .unwrap_or_else(generate_client_id);

        let mut mqtt_options = MqttOptions::new(&client_id, &self.config.host, self.config.port);
        mqtt_options.set_keep_alive(self.config.keep_alive);
        mqtt_options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            mqtt_options.set_credentials(username, password);
        }
        if self.config.tls {
            mqtt_options.set_transport(Transport::tls_with_default_config());
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        Ok(MqttBroker {
            inner: Arc::new(MqttBrokerInner {
                client,
                config: self.config,
                client_id,
                connection: Mutex::new(Connection::Idle(event_loop)),
            }),
        })
    }
}

/// Polls the event loop and reports connection events to the adapter.
///
/// Returns the event loop once the connection ends, or as soon as `cancel`
/// fires or is dropped, so it can be reused.
async fn handle_broker_events(
    mut event_loop: EventLoop,
    adapter: Arc<TransportAdapter>,
    connack_tx: Option<oneshot::Sender<Result<(), ProtocolError>>>,
    mut cancel: oneshot::Receiver<()>,
) -> EventLoop {
    let mut connack_tx = connack_tx;

    loop {
        let polled = tokio::select! {
            biased;
            _ = &mut cancel => {
                tracing::debug!("MQTT session cancelled");
                break;
            }
            polled = event_loop.poll() => polled,
        };
        match polled {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                let result = adapter.on_connack(return_code(connack.code)).await;
                let failed = result.is_err();
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(result);
                }
                if failed {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(
                    topic = %publish.topic,
                    len = publish.payload.len(),
                    "MQTT message received"
                );
                adapter.on_message(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                break;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                let code = return_code(code);
                let error = match connack_result(code) {
                    Err(e) => e,
                    Ok(()) => ProtocolError::ConnectionFailed("connection refused".to_string()),
                };
                tracing::warn!(code, error = %error, "MQTT broker refused connection");
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(Err(error));
                }
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "MQTT broker event loop error");
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(Err(ProtocolError::ConnectionFailed(e.to_string())));
                }
                break;
            }
        }
    }

    adapter.on_disconnect().await;
    event_loop
}
