// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by devices and commands.
//!
//! - [`PowerState`] - binary relay state reported by switch devices
//! - [`StartupInfo`] - startup timestamp and boot counter of a device

mod power;
mod startup;

pub use power::PowerState;
pub use startup::StartupInfo;
