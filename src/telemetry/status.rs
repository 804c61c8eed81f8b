// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STATUS0 telemetry record.
//!
//! STATUS0 describes the device itself rather than its measurements, so it
//! can be produced before the device is ready.

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::Serialize;

use crate::environment::NetworkInfo;
use crate::types::StartupInfo;

/// Firmware version reported in `StatusFWR`.
pub const FIRMWARE_VERSION: &str = "QW-MQTT-API-24.10.01";

/// Client identifier pattern reported in `StatusMQT`.
pub const MQTT_CLIENT_MASK: &str = "QWAPI_%06X";

/// Broker session details reported in `StatusMQT`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MqttInfo {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Client identifier of the session.
    pub client_id: String,
    /// Username used to authenticate, empty when anonymous.
    pub user: String,
}

/// Complete STATUS0 document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status0 {
    /// Device description.
    #[serde(rename = "Status")]
    pub status: StatusDevice,

    /// Startup parameters.
    #[serde(rename = "StatusPRM")]
    pub status_prm: StatusParameters,

    /// Firmware information.
    #[serde(rename = "StatusFWR")]
    pub firmware: StatusFirmware,

    /// Logging settings.
    #[serde(rename = "StatusLOG")]
    pub logging: StatusLogging,

    /// Network information.
    #[serde(rename = "StatusNET")]
    pub network: StatusNetwork,

    /// Broker configuration.
    #[serde(rename = "StatusMQT")]
    pub mqtt: StatusMqtt,

    /// Clock information.
    #[serde(rename = "StatusTIM")]
    pub time: StatusTime,
}

impl Status0 {
    /// Assembles the document from the device description and its context.
    #[must_use]
    pub fn build(
        device: StatusDevice,
        startup: &StartupInfo,
        tele_period: u64,
        network: NetworkInfo,
        hardware: String,
        mqtt: Option<&MqttInfo>,
        now: DateTime<Utc>,
    ) -> Self {
        let mqtt = mqtt.cloned().unwrap_or_default();
        Self {
            status: device,
            status_prm: StatusParameters {
                startup_utc: startup
                    .startup_utc()
                    .to_rfc3339_opts(SecondsFormat::Secs, false),
                boot_count: startup.boot_count(),
            },
            firmware: StatusFirmware {
                version: FIRMWARE_VERSION.to_string(),
                hardware,
            },
            logging: StatusLogging { tele_period },
            network: StatusNetwork {
                hostname: network.hostname,
                ip_address: network.ip_address,
                gateway: network.gateway,
                subnetmask: network.subnet_mask,
                mac: network.mac,
                dns_server1: None,
                dns_server2: None,
            },
            mqtt: StatusMqtt {
                mqtt_host: mqtt.host,
                mqtt_port: mqtt.port,
                mqtt_client: mqtt.client_id,
                mqtt_user: mqtt.user,
                mqtt_count: None,
                mqtt_client_mask: Some(MQTT_CLIENT_MASK.to_string()),
            },
            time: StatusTime {
                utc: now.to_rfc3339_opts(SecondsFormat::Secs, false),
                local: now
                    .with_timezone(&Local)
                    .naive_local()
                    .format("%Y-%m-%dT%H:%M:%S")
                    .to_string(),
                start_dst: None,
                end_dst: None,
                timezone: None,
            },
        }
    }
}

/// Device description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusDevice {
    /// Device name.
    pub device_name: String,

    /// Friendly names, one per relay.
    pub friendly_name: Vec<String>,

    /// Device identifier used in topics.
    pub topic: String,
}

impl StatusDevice {
    /// Creates a description with the default friendly names.
    #[must_use]
    pub fn new(device_name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            friendly_name: vec!["Home Assistant".to_string(), String::new(), String::new()],
            topic: topic.into(),
        }
    }
}

/// Startup parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusParameters {
    /// Startup time (RFC 3339, UTC).
    #[serde(rename = "StartupUTC")]
    pub startup_utc: String,

    /// Boot count.
    #[serde(rename = "BootCount")]
    pub boot_count: u32,
}

/// Firmware information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusFirmware {
    /// Firmware version string.
    pub version: String,

    /// Hardware identifier.
    pub hardware: String,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLogging {
    /// Telemetry period in seconds.
    #[serde(rename = "TelePeriod")]
    pub tele_period: u64,
}

/// Network information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusNetwork {
    /// Hostname.
    #[serde(rename = "Hostname")]
    pub hostname: String,

    /// IPv4 address.
    #[serde(rename = "IPAddress")]
    pub ip_address: String,

    /// Default gateway.
    #[serde(rename = "Gateway")]
    pub gateway: String,

    /// Subnet mask.
    #[serde(rename = "Subnetmask")]
    pub subnetmask: String,

    /// MAC address.
    #[serde(rename = "Mac")]
    pub mac: String,

    /// Primary DNS server.
    #[serde(rename = "DNSServer1")]
    pub dns_server1: Option<String>,

    /// Secondary DNS server.
    #[serde(rename = "DNSServer2")]
    pub dns_server2: Option<String>,
}

/// Broker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusMqtt {
    /// Broker host.
    pub mqtt_host: String,

    /// Broker port.
    pub mqtt_port: u16,

    /// Client identifier.
    pub mqtt_client: String,

    /// Username.
    pub mqtt_user: String,

    /// Connection count.
    pub mqtt_count: Option<u32>,

    /// Client identifier pattern.
    pub mqtt_client_mask: Option<String>,
}

/// Clock information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTime {
    /// Current UTC time (RFC 3339).
    #[serde(rename = "UTC")]
    pub utc: String,

    /// Current local time, no offset.
    #[serde(rename = "Local")]
    pub local: String,

    /// Start of daylight saving time.
    #[serde(rename = "StartDST")]
    pub start_dst: Option<String>,

    /// End of daylight saving time.
    #[serde(rename = "EndDST")]
    pub end_dst: Option<String>,

    /// Timezone offset in hours.
    #[serde(rename = "Timezone")]
    pub timezone: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn network() -> NetworkInfo {
        NetworkInfo {
            hostname: "edge".to_string(),
            ip_address: "192.168.1.20".to_string(),
            gateway: "192.168.1.1".to_string(),
            subnet_mask: "255.255.255.0".to_string(),
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
        }
    }

    #[test]
    fn build_reports_startup_metadata_verbatim() {
        let startup_utc = Utc.with_ymd_and_hms(2024, 10, 1, 8, 0, 0).unwrap();
        let startup = StartupInfo::new(startup_utc, 7);
        let now = Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).unwrap();

        let status = Status0::build(
            StatusDevice::new("Qilowatt Inverter", "inv-1"),
            &startup,
            10,
            network(),
            "x86_64".to_string(),
            None,
            now,
        );

        assert_eq!(status.status_prm.startup_utc, "2024-10-01T08:00:00+00:00");
        assert_eq!(status.status_prm.boot_count, 7);
        assert_eq!(status.time.utc, "2024-10-01T09:00:00+00:00");
        assert_eq!(status.logging.tele_period, 10);
        assert_eq!(status.mqtt.mqtt_client_mask.as_deref(), Some(MQTT_CLIENT_MASK));
    }

    #[test]
    fn serializes_with_tasmota_section_names() {
        let mqtt = MqttInfo {
            host: "mqtt.qilowatt.it".to_string(),
            port: 8883,
            client_id: "QWAPI_00ABCD".to_string(),
            user: "user".to_string(),
        };
        let status = Status0::build(
            StatusDevice::new("Qilowatt Device", "dev"),
            &StartupInfo::now(),
            10,
            network(),
            "aarch64".to_string(),
            Some(&mqtt),
            Utc::now(),
        );

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["Status"]["DeviceName"], "Qilowatt Device");
        assert_eq!(json["Status"]["FriendlyName"][0], "Home Assistant");
        assert_eq!(json["Status"]["Topic"], "dev");
        assert_eq!(json["StatusFWR"]["Version"], FIRMWARE_VERSION);
        assert_eq!(json["StatusFWR"]["Hardware"], "aarch64");
        assert_eq!(json["StatusNET"]["IPAddress"], "192.168.1.20");
        assert_eq!(json["StatusNET"]["Subnetmask"], "255.255.255.0");
        assert_eq!(json["StatusMQT"]["MqttHost"], "mqtt.qilowatt.it");
        assert_eq!(json["StatusMQT"]["MqttPort"], 8883);
        assert_eq!(json["StatusMQT"]["MqttClient"], "QWAPI_00ABCD");
        assert!(json["StatusTIM"]["UTC"].is_string());
        assert!(json["StatusLOG"]["TelePeriod"].is_number());
    }
}
