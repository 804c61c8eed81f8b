// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session glue between a broker connection, a device and its scheduler.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::device::Device;
use crate::error::ProtocolError;
use crate::protocol::{BrokerClient, PublishOutcome, PublishSink, connack_result};
use crate::scheduler::PublishScheduler;
use crate::telemetry::{MqttInfo, Payload};

/// Binds one device to one broker session.
///
/// The adapter reacts to connection events reported by the broker's event
/// loop:
///
/// - [`on_connack`](Self::on_connack): subscribes to the command topic and
///   arms the scheduler
/// - [`on_message`](Self::on_message): forwards commands to the device
/// - [`on_disconnect`](Self::on_disconnect): stops the scheduler
///
/// It is also the [`PublishSink`] used by the scheduler and by devices
/// pushing explicit updates. Payloads are only sent while connected.
pub struct TransportAdapter {
    device: Arc<dyn Device>,
    broker: Arc<dyn BrokerClient>,
    scheduler: PublishScheduler,
    mqtt: MqttInfo,
    connected: AtomicBool,
    published: AtomicU64,
    skipped: AtomicU64,
}

impl TransportAdapter {
    /// Creates an adapter for a device, a broker client and a scheduler.
    ///
    /// `mqtt` is reported in the device's STATUS0 snapshot.
    #[must_use]
    pub fn new(
        device: Arc<dyn Device>,
        broker: Arc<dyn BrokerClient>,
        scheduler: PublishScheduler,
        mqtt: MqttInfo,
    ) -> Self {
        Self {
            device,
            broker,
            scheduler,
            mqtt,
            connected: AtomicBool::new(false),
            published: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Returns whether the session is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Returns the device served by this adapter.
    #[must_use]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Returns the scheduler driven by this adapter.
    #[must_use]
    pub fn scheduler(&self) -> &PublishScheduler {
        &self.scheduler
    }

    /// Returns how many payloads were handed to the broker.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Returns how many payloads were dropped.
    #[must_use]
    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Handles the broker's CONNACK.
    ///
    /// On success, marks the session connected, subscribes to the device's
    /// command topic and arms the scheduler.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::AuthenticationFailed`] if the broker rejected the
    ///   credentials
    /// - [`ProtocolError::ConnectionFailed`] for other refusals
    /// - the subscribe error if the command subscription cannot be queued
    pub async fn on_connack(self: &Arc<Self>, code: u8) -> Result<(), ProtocolError> {
        if let Err(e) = connack_result(code) {
            tracing::warn!(
                device = %self.device.topics().device_id(),
                code,
                error = %e,
                "Broker refused connection"
            );
            return Err(e);
        }

        self.connected.store(true, Ordering::Release);
        let sink: Weak<Self> = Arc::downgrade(self);
        self.device.core().attach(
            sink,
            self.mqtt.clone(),
            self.scheduler.intervals().fast.as_secs(),
        );

        let command_topic = self.device.topics().command();
        if let Err(e) = self.broker.subscribe(command_topic) {
            tracing::warn!(topic = %command_topic, error = %e, "Failed to subscribe to command topic");
            self.connected.store(false, Ordering::Release);
            self.device.core().detach();
            return Err(e);
        }
        tracing::debug!(topic = %command_topic, "Subscribed to command topic");

        let sink: Arc<Self> = Arc::clone(self);
        self.scheduler.arm(Arc::clone(&self.device), sink).await;

        tracing::info!(
            device = %self.device.topics().device_id(),
            host = %self.mqtt.host,
            port = %self.mqtt.port,
            "Session established"
        );
        Ok(())
    }

    /// Handles an inbound message.
    ///
    /// Only the device's command topic is forwarded; anything else is
    /// ignored.
    pub fn on_message(&self, topic: &str, payload: &[u8]) {
        if topic != self.device.topics().command() {
            tracing::debug!(topic = %topic, "Ignoring message on unexpected topic");
            return;
        }
        tracing::debug!(topic = %topic, len = payload.len(), "Command received");
        self.device.handle_command(payload);
    }

    /// Handles loss or closure of the broker connection.
    ///
    /// Stops the scheduler; returns once no activity can publish anymore.
    pub async fn on_disconnect(&self) {
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        self.device.core().detach();
        self.scheduler.stop().await;

        if was_connected {
            tracing::info!(
                device = %self.device.topics().device_id(),
                published = self.published_count(),
                skipped = self.skipped_count(),
                "Session closed"
            );
        }
    }

    fn skip(&self) -> PublishOutcome {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        PublishOutcome::Skipped
    }
}

impl PublishSink for TransportAdapter {
    fn publish(&self, topic: &str, payload: &Payload) -> PublishOutcome {
        if !self.is_connected() {
            tracing::debug!(topic = %topic, "Not connected, dropping publish");
            return self.skip();
        }

        let bytes = match payload.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Failed to encode payload");
                return self.skip();
            }
        };

        let len = bytes.len();
        match self.broker.publish(topic, bytes) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(topic = %topic, len, "Published");
                PublishOutcome::Published
            }
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Failed to publish");
                self.skip()
            }
        }
    }
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("device", &self.device.topics().device_id())
            .field("connected", &self.is_connected())
            .field("published", &self.published_count())
            .field("skipped", &self.skipped_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{InverterDevice, SwitchDevice};
    use crate::scheduler::SchedulerState;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeBroker {
        subscriptions: Mutex<Vec<String>>,
        published: Mutex<Vec<(String, Vec<u8>)>>,
        fail_subscribe: bool,
    }

    impl FakeBroker {
        fn topics(&self) -> Vec<String> {
            self.published.lock().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    impl BrokerClient for FakeBroker {
        fn subscribe(&self, topic: &str) -> Result<(), ProtocolError> {
            if self.fail_subscribe {
                return Err(ProtocolError::ConnectionFailed("subscribe rejected".to_string()));
            }
            self.subscriptions.lock().push(topic.to_string());
            Ok(())
        }

        fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ProtocolError> {
            self.published.lock().push((topic.to_string(), payload));
            Ok(())
        }

        fn disconnect(&self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    fn adapter_for(device: Arc<dyn Device>, broker: Arc<FakeBroker>) -> Arc<TransportAdapter> {
        Arc::new(TransportAdapter::new(
            device,
            broker,
            PublishScheduler::default(),
            MqttInfo {
                host: "broker.test".to_string(),
                port: 8883,
                client_id: "QWAPI_000ABC".to_string(),
                user: "user".to_string(),
            },
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn connack_success_subscribes_and_arms() {
        let broker = Arc::new(FakeBroker::default());
        let adapter = adapter_for(Arc::new(SwitchDevice::new("sw")), broker.clone());

        adapter.on_connack(0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(adapter.is_connected());
        assert_eq!(*broker.subscriptions.lock(), ["Q/sw/cmnd/backlog"]);
        assert_eq!(adapter.scheduler().state(), SchedulerState::Running);
        assert_eq!(broker.topics(), ["Q/sw/STATUS0"]);

        let (_, status) = &broker.published.lock()[0];
        let json: serde_json::Value = serde_json::from_slice(status).unwrap();
        assert_eq!(json["StatusMQT"]["MqttHost"], "broker.test");
        assert_eq!(json["StatusMQT"]["MqttClient"], "QWAPI_000ABC");
        assert_eq!(json["StatusLOG"]["TelePeriod"], 10);

        adapter.on_disconnect().await;
    }

    #[tokio::test]
    async fn connack_refusals_are_classified() {
        let broker = Arc::new(FakeBroker::default());
        let adapter = adapter_for(Arc::new(SwitchDevice::new("sw")), broker.clone());

        assert!(matches!(
            adapter.on_connack(5).await,
            Err(ProtocolError::AuthenticationFailed)
        ));
        assert!(matches!(
            adapter.on_connack(3).await,
            Err(ProtocolError::ConnectionFailed(_))
        ));
        assert!(!adapter.is_connected());
        assert!(broker.subscriptions.lock().is_empty());
        assert_eq!(adapter.scheduler().state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn failed_subscription_is_reported() {
        let broker = Arc::new(FakeBroker {
            fail_subscribe: true,
            ..FakeBroker::default()
        });
        let adapter = adapter_for(Arc::new(SwitchDevice::new("sw")), broker);

        assert!(adapter.on_connack(0).await.is_err());
        assert!(!adapter.is_connected());
        assert_eq!(adapter.scheduler().state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn only_command_topic_reaches_device() {
        let broker = Arc::new(FakeBroker::default());
        let inverter = Arc::new(InverterDevice::new("inv"));
        let adapter = adapter_for(inverter.clone(), broker);

        adapter.on_message("Q/other/cmnd/backlog", br#"WORKMODE {"Mode":"buy"}"#);
        adapter.on_message("Q/inv/SENSOR", br#"WORKMODE {"Mode":"buy"}"#);
        assert_eq!(inverter.work_mode().mode(), Some("normal"));

        adapter.on_message("Q/inv/cmnd/backlog", br#"WORKMODE {"Mode":"buy"}"#);
        assert_eq!(inverter.work_mode().mode(), Some("buy"));
    }

    #[test]
    fn publish_while_disconnected_is_skipped() {
        let broker = Arc::new(FakeBroker::default());
        let adapter = adapter_for(Arc::new(SwitchDevice::new("sw")), broker.clone());

        let outcome = adapter.publish("Q/sw/SENSOR", &Payload::from(1u8));
        assert_eq!(outcome, PublishOutcome::Skipped);
        assert_eq!(adapter.skipped_count(), 1);
        assert_eq!(adapter.published_count(), 0);
        assert!(broker.published.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn switch_command_pushes_update_through_session() {
        let broker = Arc::new(FakeBroker::default());
        let switch = Arc::new(SwitchDevice::new("sw"));
        let adapter = adapter_for(switch.clone(), broker.clone());
        adapter.on_connack(0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        broker.published.lock().clear();

        adapter.on_message("Q/sw/cmnd/backlog", b"POWER1 1");

        assert!(switch.is_on());
        assert_eq!(broker.topics(), ["Q/sw/SENSOR", "Q/sw/STATE", "Q/sw/POWER1"]);
        assert_eq!(broker.published.lock()[2].1, b"1");

        adapter.on_disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_publishing() {
        let broker = Arc::new(FakeBroker::default());
        let switch = Arc::new(SwitchDevice::new("sw"));
        let adapter = adapter_for(switch.clone(), broker.clone());
        adapter.on_connack(0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(25)).await;

        adapter.on_disconnect().await;
        assert!(!adapter.is_connected());
        assert_eq!(adapter.scheduler().state(), SchedulerState::Stopped);
        let sent = broker.published.lock().len();

        switch.turn_on();
        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        assert_eq!(broker.published.lock().len(), sent);
        assert_eq!(adapter.published_count(), sent as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_rearms_scheduler() {
        let broker = Arc::new(FakeBroker::default());
        let adapter = adapter_for(Arc::new(SwitchDevice::new("sw")), broker.clone());

        adapter.on_connack(0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        adapter.on_disconnect().await;
        adapter.on_connack(0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(adapter.scheduler().state(), SchedulerState::Running);
        let status_count = broker
            .topics()
            .iter()
            .filter(|t| t.ends_with("/STATUS0"))
            .count();
        assert_eq!(status_count, 2);

        adapter.on_disconnect().await;
    }
}
