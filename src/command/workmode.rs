// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `WORKMODE` command for inverters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::command::{Command, payload_text, strip_keyword};
use crate::error::CommandError;

/// Work mode requested by the Qilowatt backend.
///
/// The JSON body keeps the backend's field names, so the same value is
/// echoed back under `WORKMODE` in SENSOR telemetry. Missing fields decode
/// as `None`; numeric fields accept integers and fractions alike. Fields
/// this type does not name are kept in [`extra`](Self::extra) and echoed
/// back as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkModeCommand {
    /// Operating mode (e.g., `normal`, `eco`, `buy`, `sell`).
    #[serde(rename = "Mode", default)]
    pub mode: Option<String>,

    /// Origin of the command as reported by the backend.
    #[serde(rename = "_source", default)]
    pub source: Option<String>,

    /// Target battery state of charge (%).
    #[serde(rename = "BatterySoc", default)]
    pub battery_soc: Option<Number>,

    /// Power limit (W).
    #[serde(rename = "PowerLimit", default)]
    pub power_limit: Option<Number>,

    /// Peak shaving threshold (W).
    #[serde(rename = "PeakShaving", default)]
    pub peak_shaving: Option<Number>,

    /// Battery charge current limit (A).
    #[serde(rename = "ChargeCurrent", default)]
    pub charge_current: Option<Number>,

    /// Battery discharge current limit (A).
    #[serde(rename = "DischargeCurrent", default)]
    pub discharge_current: Option<Number>,

    /// Any other fields sent by the backend.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkModeCommand {
    /// Keyword prefix of the wire form.
    pub const KEYWORD: &'static str = "WORKMODE";

    /// Mode an inverter starts in before any command arrives.
    pub const DEFAULT_MODE: &'static str = "normal";

    /// Creates a command with only the mode set.
    #[must_use]
    pub fn with_mode(mode: impl Into<String>) -> Self {
        Self {
            mode: Some(mode.into()),
            source: None,
            battery_soc: None,
            power_limit: None,
            peak_shaving: None,
            charge_current: None,
            discharge_current: None,
            extra: Map::new(),
        }
    }

    /// Returns the requested mode, if present.
    #[must_use]
    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }
}

impl Default for WorkModeCommand {
    fn default() -> Self {
        Self::with_mode(Self::DEFAULT_MODE)
    }
}

impl Command for WorkModeCommand {
    fn decode(payload: &[u8]) -> Result<Self, CommandError> {
        let text = payload_text(payload)?;
        let body = strip_keyword(text, Self::KEYWORD)?;

        // Parse to a Value first: derived struct impls also accept JSON arrays.
        let value: Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(CommandError::NotAnObject(json_kind(&value)));
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_normal_mode() {
        let cmd = WorkModeCommand::default();
        assert_eq!(cmd.mode(), Some("normal"));
        assert!(cmd.battery_soc.is_none());
    }

    #[test]
    fn decode_full_command() {
        let payload = br#"WORKMODE {"Mode":"buy","_source":"schedule","BatterySoc":90,"PowerLimit":5000,"PeakShaving":0,"ChargeCurrent":25,"DischargeCurrent":30}"#;
        let cmd = WorkModeCommand::decode(payload).unwrap();

        assert_eq!(cmd.mode(), Some("buy"));
        assert_eq!(cmd.source.as_deref(), Some("schedule"));
        assert_eq!(cmd.battery_soc, Some(Number::from(90)));
        assert_eq!(cmd.power_limit, Some(Number::from(5000)));
        assert_eq!(cmd.peak_shaving, Some(Number::from(0)));
        assert_eq!(cmd.charge_current, Some(Number::from(25)));
        assert_eq!(cmd.discharge_current, Some(Number::from(30)));
        assert!(cmd.extra.is_empty());
    }

    #[test]
    fn decode_accepts_fractional_numbers() {
        let cmd = WorkModeCommand::decode(
            br#"WORKMODE {"Mode":"eco","BatterySoc":95.5,"ChargeCurrent":12.25}"#,
        )
        .unwrap();
        assert_eq!(cmd.mode(), Some("eco"));
        assert_eq!(cmd.battery_soc.as_ref().and_then(Number::as_f64), Some(95.5));
        assert_eq!(cmd.charge_current.as_ref().and_then(Number::as_f64), Some(12.25));
    }

    #[test]
    fn decode_keeps_unknown_fields() {
        let cmd = WorkModeCommand::decode(br#"WORKMODE {"Mode":"eco","Extra":true}"#).unwrap();
        assert_eq!(cmd.mode(), Some("eco"));
        assert_eq!(cmd.extra.get("Extra"), Some(&Value::Bool(true)));

        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["Extra"], true);
        assert_eq!(json["Mode"], "eco");
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let result = WorkModeCommand::decode(b"WORKMODE not-json");
        assert!(matches!(result, Err(CommandError::Json(_))));
    }

    #[test]
    fn decode_rejects_non_object() {
        let result = WorkModeCommand::decode(br#"WORKMODE ["eco"]"#);
        assert!(matches!(result, Err(CommandError::NotAnObject("array"))));
    }

    #[test]
    fn decode_rejects_missing_prefix() {
        let result = WorkModeCommand::decode(br#"{"Mode":"eco"}"#);
        assert!(matches!(result, Err(CommandError::UnknownCommand(_))));
    }

    #[test]
    fn serializes_with_backend_field_names() {
        let json = serde_json::to_value(WorkModeCommand::with_mode("eco")).unwrap();
        assert_eq!(json["Mode"], "eco");
        assert!(json["_source"].is_null());
        assert!(json.get("BatterySoc").is_some());
    }
}
