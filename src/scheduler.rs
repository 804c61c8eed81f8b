// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic telemetry publishing.
//!
//! A [`PublishScheduler`] drives three independent activities per session,
//! one per [`Cadence`]:
//!
//! | Cadence | Default period | Topic | Fires on start |
//! |---------|----------------|-------|----------------|
//! | fast | 10 s | `Q/<id>/SENSOR` | no |
//! | medium | 60 s | `Q/<id>/STATE` | no |
//! | slow | 3600 s | `Q/<id>/STATUS0` | yes |
//!
//! Activities wait until the device is ready before their first tick. The
//! scheduler moves through [`SchedulerState`]:
//!
//! ```text
//! Idle --arm--> Armed --device ready--> Running --stop--> Stopped
//!                 |                                          |
//!                 +------------------stop------------------->+
//! Stopped --arm--> Armed
//! ```
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use qilowatt::PublishIntervals;
//!
//! let intervals = PublishIntervals::default().with_fast(Duration::from_secs(5));
//! assert_eq!(intervals.fast, Duration::from_secs(5));
//! assert_eq!(intervals.slow, Duration::from_secs(3600));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::device::Device;
use crate::error::Error;
use crate::protocol::{PublishOutcome, PublishSink};

/// Smallest period an activity runs with.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// One of the three publication cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    /// SENSOR telemetry.
    Fast,
    /// STATE telemetry.
    Medium,
    /// STATUS0 snapshot.
    Slow,
}

impl Cadence {
    /// All cadences, in spawn order.
    pub const ALL: [Self; 3] = [Self::Fast, Self::Medium, Self::Slow];

    /// Returns the cadence name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
        }
    }

    /// Returns whether the first tick happens as soon as the device is ready.
    #[must_use]
    pub const fn fires_on_start(&self) -> bool {
        matches!(self, Self::Slow)
    }

    fn topic<'a>(&self, device: &'a dyn Device) -> &'a str {
        let topics = device.topics();
        match self {
            Self::Fast => topics.sensor(),
            Self::Medium => topics.state(),
            Self::Slow => topics.status0(),
        }
    }

    fn snapshot(&self, device: &dyn Device) -> crate::telemetry::Payload {
        match self {
            Self::Fast => device.snapshot_fast(),
            Self::Medium => device.snapshot_medium(),
            Self::Slow => device.snapshot_slow(),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Periods of the three publication cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishIntervals {
    /// SENSOR period.
    pub fast: Duration,
    /// STATE period.
    pub medium: Duration,
    /// STATUS0 period.
    pub slow: Duration,
}

impl Default for PublishIntervals {
    fn default() -> Self {
        Self {
            fast: Duration::from_secs(10),
            medium: Duration::from_secs(60),
            slow: Duration::from_secs(3600),
        }
    }
}

impl PublishIntervals {
    /// Sets the SENSOR period.
    #[must_use]
    pub fn with_fast(mut self, period: Duration) -> Self {
        self.fast = period;
        self
    }

    /// Sets the STATE period.
    #[must_use]
    pub fn with_medium(mut self, period: Duration) -> Self {
        self.medium = period;
        self
    }

    /// Sets the STATUS0 period.
    #[must_use]
    pub fn with_slow(mut self, period: Duration) -> Self {
        self.slow = period;
        self
    }

    /// Returns the period of a cadence.
    #[must_use]
    pub fn period(&self, cadence: Cadence) -> Duration {
        match cadence {
            Cadence::Fast => self.fast,
            Cadence::Medium => self.medium,
            Cadence::Slow => self.slow,
        }
    }

    /// Checks that every period is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] naming the first zero period.
    pub fn validate(&self) -> Result<(), Error> {
        match Cadence::ALL.into_iter().find(|c| self.period(*c).is_zero()) {
            Some(cadence) => Err(Error::InvalidConfiguration(format!(
                "{cadence} publish interval must be greater than zero"
            ))),
            None => Ok(()),
        }
    }
}

/// Lifecycle state of a [`PublishScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Never armed.
    Idle,
    /// Attached to a session, waiting for the device to become ready.
    Armed,
    /// Publishing.
    Running,
    /// Stopped; may be armed again.
    Stopped,
}

struct Activity {
    cadence: Cadence,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runs the fast, medium and slow publication cycles of one device.
///
/// Arming and stopping are serialized: once [`stop`](Self::stop) returns,
/// every activity has exited and nothing else is published until the
/// scheduler is armed again.
pub struct PublishScheduler {
    intervals: PublishIntervals,
    state_tx: Arc<watch::Sender<SchedulerState>>,
    activities: Mutex<Option<Vec<Activity>>>,
}

impl PublishScheduler {
    /// Creates an idle scheduler with the given periods.
    #[must_use]
    pub fn new(intervals: PublishIntervals) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            intervals,
            state_tx: Arc::new(state_tx),
            activities: Mutex::new(None),
        }
    }

    /// Returns the configured periods.
    #[must_use]
    pub fn intervals(&self) -> &PublishIntervals {
        &self.intervals
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    /// Returns a receiver observing lifecycle changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Spawns the publication activities for a session.
    ///
    /// Does nothing if the scheduler is already armed or running.
    pub async fn arm(&self, device: Arc<dyn Device>, sink: Arc<dyn PublishSink>) {
        let mut activities = self.activities.lock().await;
        if activities.is_some() {
            tracing::debug!(device = %device.topics().device_id(), "Scheduler already armed");
            return;
        }

        self.state_tx.send_replace(SchedulerState::Armed);
        let spawned = Cadence::ALL
            .into_iter()
            .map(|cadence| {
                let (stop_tx, stop_rx) = watch::channel(false);
                let handle = tokio::spawn(run_activity(
                    cadence,
                    self.intervals.period(cadence),
                    Arc::clone(&device),
                    Arc::clone(&sink),
                    stop_rx,
                    Arc::clone(&self.state_tx),
                ));
                Activity {
                    cadence,
                    stop_tx,
                    handle,
                }
            })
            .collect();
        *activities = Some(spawned);

        tracing::debug!(
            device = %device.topics().device_id(),
            ready = device.is_ready(),
            "Scheduler armed"
        );
    }

    /// Stops all activities and waits for them to exit.
    ///
    /// Idempotent. Concurrent callers return only after the activities
    /// have exited.
    pub async fn stop(&self) {
        let mut activities = self.activities.lock().await;
        let Some(running) = activities.take() else {
            return;
        };

        for activity in &running {
            let _ = activity.stop_tx.send(true);
        }
        for activity in running {
            if let Err(e) = activity.handle.await {
                tracing::warn!(cadence = %activity.cadence, error = %e, "Publishing activity failed");
            }
        }

        self.state_tx.send_replace(SchedulerState::Stopped);
        tracing::debug!("Scheduler stopped");
    }
}

impl Default for PublishScheduler {
    fn default() -> Self {
        Self::new(PublishIntervals::default())
    }
}

impl fmt::Debug for PublishScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishScheduler")
            .field("intervals", &self.intervals)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Body of one publication cycle.
async fn run_activity(
    cadence: Cadence,
    period: Duration,
    device: Arc<dyn Device>,
    sink: Arc<dyn PublishSink>,
    mut stop_rx: watch::Receiver<bool>,
    state_tx: Arc<watch::Sender<SchedulerState>>,
) {
    let mut readiness = device.readiness();
    let ready = tokio::select! {
        biased;
        _ = stop_rx.changed() => false,
        ready = async { readiness.wait_for(|ready| *ready).await.is_ok() } => ready,
    };
    if !ready {
        tracing::debug!(cadence = %cadence, "Publishing activity stopped before device was ready");
        return;
    }

    let started = state_tx.send_if_modified(|state| {
        if *state == SchedulerState::Armed {
            *state = SchedulerState::Running;
            true
        } else {
            false
        }
    });
    if started {
        tracing::info!(device = %device.topics().device_id(), "Publishing started");
    }

    let period = period.max(MIN_PERIOD);
    let first_tick = if cadence.fires_on_start() {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut interval = tokio::time::interval_at(first_tick, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = interval.tick() => publish_tick(cadence, device.as_ref(), sink.as_ref()),
        }
    }
    tracing::debug!(cadence = %cadence, "Publishing activity stopped");
}

fn publish_tick(cadence: Cadence, device: &dyn Device, sink: &dyn PublishSink) {
    let payload = cadence.snapshot(device);
    if payload.is_empty() {
        tracing::trace!(cadence = %cadence, "Empty snapshot, nothing to publish");
        return;
    }

    let topic = cadence.topic(device);
    if sink.publish(topic, &payload) == PublishOutcome::Skipped {
        tracing::debug!(cadence = %cadence, topic = %topic, "Publish skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCore, InverterDevice, SwitchDevice};
    use crate::telemetry::{EnergyData, MetricsData, Payload};
    use parking_lot::Mutex as SyncMutex;

    #[derive(Default)]
    struct RecordingSink {
        published: SyncMutex<Vec<(String, Payload)>>,
    }

    impl RecordingSink {
        fn count(&self, suffix: &str) -> usize {
            self.published
                .lock()
                .iter()
                .filter(|(topic, _)| topic.ends_with(suffix))
                .count()
        }

        fn total(&self) -> usize {
            self.published.lock().len()
        }
    }

    impl PublishSink for RecordingSink {
        fn publish(&self, topic: &str, payload: &Payload) -> PublishOutcome {
            self.published
                .lock()
                .push((topic.to_string(), payload.clone()));
            PublishOutcome::Published
        }
    }

    /// Ready device whose fast snapshot is always empty.
    struct SilentDevice {
        core: DeviceCore,
    }

    impl Device for SilentDevice {
        fn core(&self) -> &DeviceCore {
            &self.core
        }

        fn snapshot_fast(&self) -> Payload {
            Payload::empty()
        }

        fn snapshot_medium(&self) -> Payload {
            Payload::from(serde_json::json!({"Uptime": 1}))
        }

        fn handle_command(&self, _payload: &[u8]) {}
    }

    fn setup(device: Arc<dyn Device>) -> (PublishScheduler, Arc<dyn Device>, Arc<RecordingSink>) {
        (PublishScheduler::default(), device, Arc::new(RecordingSink::default()))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[test]
    fn default_intervals() {
        let intervals = PublishIntervals::default();
        assert_eq!(intervals.fast, Duration::from_secs(10));
        assert_eq!(intervals.medium, Duration::from_secs(60));
        assert_eq!(intervals.slow, Duration::from_secs(3600));
        assert!(intervals.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let intervals = PublishIntervals::default().with_medium(Duration::ZERO);
        let err = intervals.validate().unwrap_err();
        assert!(err.to_string().contains("medium"));
    }

    #[test]
    fn only_slow_fires_on_start() {
        assert!(!Cadence::Fast.fires_on_start());
        assert!(!Cadence::Medium.fires_on_start());
        assert!(Cadence::Slow.fires_on_start());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fires_immediately_once() {
        let (scheduler, device, sink) = setup(Arc::new(SwitchDevice::new("sw")));
        scheduler.arm(device, sink.clone()).await;
        settle().await;

        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(sink.count("/STATUS0"), 1);
        assert_eq!(sink.count("/SENSOR"), 0);
        assert_eq!(sink.count("/STATE"), 0);

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert_eq!(sink.count("/STATUS0"), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.count("/STATUS0"), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cadences_tick_at_their_periods() {
        let (scheduler, device, sink) = setup(Arc::new(SwitchDevice::new("sw")));
        scheduler.arm(device, sink.clone()).await;

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(sink.count("/SENSOR"), 12);
        assert_eq!(sink.count("/STATE"), 2);
        assert_eq!(sink.count("/STATUS0"), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_readiness() {
        let inverter = Arc::new(InverterDevice::new("inv"));
        let (scheduler, device, sink) = setup(inverter.clone());
        scheduler.arm(device, sink.clone()).await;

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(sink.total(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Armed);

        inverter.set_energy_data(EnergyData::default());
        settle().await;
        assert_eq!(sink.total(), 0);

        inverter.set_metrics_data(MetricsData::default());
        settle().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(sink.count("/STATUS0"), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sink.count("/SENSOR"), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_snapshots_are_not_published() {
        let device = Arc::new(SilentDevice {
            core: DeviceCore::new("silent", "Silent", true),
        });
        let (scheduler, device, sink) = setup(device);
        scheduler.arm(device, sink.clone()).await;

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(sink.count("/SENSOR"), 0);
        assert_eq!(sink.count("/STATE"), 1);
        assert!(sink.published.lock().iter().all(|(_, p)| !p.is_empty()));

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_published_after_stop() {
        let (scheduler, device, sink) = setup(Arc::new(SwitchDevice::new("sw")));
        scheduler.arm(device, sink.clone()).await;
        tokio::time::sleep(Duration::from_secs(15)).await;

        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        let published = sink.total();

        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        assert_eq!(sink.total(), published);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_ready_exits_cleanly() {
        let (scheduler, device, sink) = setup(Arc::new(InverterDevice::new("inv")));
        scheduler.arm(device, sink.clone()).await;
        settle().await;

        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(sink.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let scheduler = PublishScheduler::default();
        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let sink = Arc::new(RecordingSink::default());
        scheduler
            .arm(Arc::new(SwitchDevice::new("sw")), sink.clone())
            .await;
        let scheduler = Arc::new(scheduler);
        let a = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.stop().await }
        });
        let b = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.stop().await }
        });
        a.await.unwrap();
        b.await.unwrap();
        scheduler.stop().await;

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn arm_twice_spawns_once() {
        let (scheduler, device, sink) = setup(Arc::new(SwitchDevice::new("sw")));
        scheduler.arm(device.clone(), sink.clone()).await;
        scheduler.arm(device, sink.clone()).await;
        settle().await;

        assert_eq!(sink.count("/STATUS0"), 1);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_after_stop() {
        let (scheduler, device, sink) = setup(Arc::new(SwitchDevice::new("sw")));
        scheduler.arm(device.clone(), sink.clone()).await;
        settle().await;
        scheduler.stop().await;

        scheduler.arm(device, sink.clone()).await;
        settle().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(sink.count("/STATUS0"), 2);

        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn state_changes_are_observable() {
        let (scheduler, device, sink) = setup(Arc::new(SwitchDevice::new("sw")));
        let mut states = scheduler.subscribe_state();
        assert_eq!(*states.borrow_and_update(), SchedulerState::Idle);

        scheduler.arm(device, sink).await;
        states
            .wait_for(|state| *state == SchedulerState::Running)
            .await
            .unwrap();

        scheduler.stop().await;
        assert_eq!(*states.borrow_and_update(), SchedulerState::Stopped);
    }
}
