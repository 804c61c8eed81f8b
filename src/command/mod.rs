// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inbound command decoding.
//!
//! Commands arrive on `Q/<id>/cmnd/backlog` as UTF-8 text. Two wire forms
//! exist:
//!
//! | Command Type | Wire form | Example |
//! |-------------|-----------|---------|
//! | [`WorkModeCommand`] | `WORKMODE <json-object>` | `WORKMODE {"Mode":"eco"}` |
//! | [`SwitchCommand`] | fixed literal | `POWER1 1`, `POWER1 0` |
//!
//! Decoding fails closed: a missing keyword, invalid JSON or an unknown
//! literal yields a [`CommandError`] and nothing else. Devices log these
//! errors and leave their state untouched.
//!
//! # Examples
//!
//! ```
//! use qilowatt::command::{Command, SwitchCommand, WorkModeCommand};
//! use qilowatt::types::PowerState;
//!
//! let cmd = WorkModeCommand::decode(br#"WORKMODE {"Mode":"eco","BatterySoc":40}"#).unwrap();
//! assert_eq!(cmd.mode(), Some("eco"));
//! assert_eq!(cmd.battery_soc.and_then(|soc| soc.as_i64()), Some(40));
//!
//! let cmd = SwitchCommand::decode(b"POWER1 1").unwrap();
//! assert_eq!(cmd.state(), PowerState::On);
//!
//! assert!(WorkModeCommand::decode(b"WORKMODE not-json").is_err());
//! ```

mod power;
mod workmode;

pub use power::SwitchCommand;
pub use workmode::WorkModeCommand;

use crate::error::CommandError;

/// A command that can be decoded from an inbound payload.
pub trait Command: Sized {
    /// Decodes a raw payload into a typed command.
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if the payload is not valid UTF-8, does not
    /// carry this command's keyword, or its argument is malformed.
    fn decode(payload: &[u8]) -> Result<Self, CommandError>;
}

/// Interprets a payload as UTF-8 text, ignoring surrounding whitespace.
pub(crate) fn payload_text(payload: &[u8]) -> Result<&str, CommandError> {
    Ok(std::str::from_utf8(payload)?.trim())
}

/// Splits `<KEYWORD> <argument>` and checks the keyword.
///
/// Returns the argument with leading whitespace removed.
pub(crate) fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Result<&'a str, CommandError> {
    text.strip_prefix(keyword)
        .and_then(|rest| rest.strip_prefix(' '))
        .map(str::trim_start)
        .ok_or_else(|| CommandError::UnknownCommand(text.to_string()))
}
