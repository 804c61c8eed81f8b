// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay commands for switch devices.

use crate::command::{Command, payload_text};
use crate::error::CommandError;
use crate::types::PowerState;

/// Command to set the relay of a switch device.
///
/// Only the two literals `POWER1 1` and `POWER1 0` are accepted; anything
/// else (including `POWER1 ON` or `POWER1 TOGGLE`) is rejected.
///
/// # Examples
///
/// ```
/// use qilowatt::command::{Command, SwitchCommand};
/// use qilowatt::types::PowerState;
///
/// assert_eq!(SwitchCommand::decode(b"POWER1 0").unwrap().state(), PowerState::Off);
/// assert!(SwitchCommand::decode(b"POWER1 2").is_err());
/// assert_eq!(SwitchCommand::new(PowerState::On).to_string(), "POWER1 1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCommand {
    state: PowerState,
}

impl SwitchCommand {
    /// Keyword of the wire form.
    pub const KEYWORD: &'static str = "POWER1";

    /// Literal that turns the relay on.
    pub const ON: &'static str = "POWER1 1";

    /// Literal that turns the relay off.
    pub const OFF: &'static str = "POWER1 0";

    /// Creates a command for the given state.
    #[must_use]
    pub const fn new(state: PowerState) -> Self {
        Self { state }
    }

    /// Returns the requested relay state.
    #[must_use]
    pub const fn state(&self) -> PowerState {
        self.state
    }
}

impl Command for SwitchCommand {
    fn decode(payload: &[u8]) -> Result<Self, CommandError> {
        match payload_text(payload)? {
            Self::ON => Ok(Self::new(PowerState::On)),
            Self::OFF => Ok(Self::new(PowerState::Off)),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

impl std::fmt::Display for SwitchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", Self::KEYWORD, self.state.as_num())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_literals() {
        assert_eq!(
            SwitchCommand::decode(b"POWER1 1").unwrap().state(),
            PowerState::On
        );
        assert_eq!(
            SwitchCommand::decode(b"POWER1 0").unwrap().state(),
            PowerState::Off
        );
    }

    #[test]
    fn decode_rejects_other_forms() {
        for payload in [&b"POWER1 ON"[..], b"POWER1", b"POWER2 1", b"power1 1", b""] {
            assert!(
                matches!(
                    SwitchCommand::decode(payload),
                    Err(CommandError::UnknownCommand(_))
                ),
                "payload {payload:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(SwitchCommand::new(PowerState::On).to_string(), SwitchCommand::ON);
        assert_eq!(SwitchCommand::new(PowerState::Off).to_string(), SwitchCommand::OFF);
    }
}
