// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Startup metadata reported in the STATUS0 snapshot.

use chrono::{DateTime, Utc};

/// Startup timestamp and boot counter of a device.
///
/// Fixed at construction and reported verbatim in `StatusPRM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupInfo {
    startup_utc: DateTime<Utc>,
    boot_count: u32,
}

impl StartupInfo {
    /// Captures the current time as startup time, with boot count 1.
    #[must_use]
    pub fn now() -> Self {
        Self::new(Utc::now(), 1)
    }

    /// Creates startup metadata from explicit values.
    #[must_use]
    pub const fn new(startup_utc: DateTime<Utc>, boot_count: u32) -> Self {
        Self {
            startup_utc,
            boot_count,
        }
    }

    /// Returns the startup timestamp.
    #[must_use]
    pub const fn startup_utc(&self) -> DateTime<Utc> {
        self.startup_utc
    }

    /// Returns the boot counter.
    #[must_use]
    pub const fn boot_count(&self) -> u32 {
        self.boot_count
    }

    /// Returns whole seconds elapsed between startup and `now`.
    ///
    /// Clamped to zero if `now` is earlier than the startup time.
    #[must_use]
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.startup_utc).num_seconds()).unwrap_or(0)
    }
}

impl Default for StartupInfo {
    fn default() -> Self {
        Self::now()
    }
}
