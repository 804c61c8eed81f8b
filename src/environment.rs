// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host environment lookups used by the STATUS0 snapshot.
//!
//! Devices read host details through the [`EnvironmentInfo`] trait so tests
//! and embedders can inject fixed values ([`StaticEnvironment`]) instead of
//! querying the machine ([`SystemEnvironment`]).

use std::net::Ipv4Addr;

/// Address reported when a lookup fails.
const UNKNOWN_ADDRESS: &str = "0.0.0.0";

/// MAC reported when no hardware address is found.
const UNKNOWN_MAC: &str = "00:00:00:00:00:00";

/// Network details of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Hostname.
    pub hostname: String,
    /// Primary IPv4 address.
    pub ip_address: String,
    /// Default gateway.
    pub gateway: String,
    /// Subnet mask of the primary interface.
    pub subnet_mask: String,
    /// MAC address of the primary interface (`aa:bb:cc:dd:ee:ff`).
    pub mac: String,
}

impl Default for NetworkInfo {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            ip_address: UNKNOWN_ADDRESS.to_string(),
            gateway: UNKNOWN_ADDRESS.to_string(),
            subnet_mask: UNKNOWN_ADDRESS.to_string(),
            mac: UNKNOWN_MAC.to_string(),
        }
    }
}

/// Source of host details.
///
/// Implementations must return quickly: they are called from publishing
/// ticks.
pub trait EnvironmentInfo: Send + Sync {
    /// Returns the current network details.
    fn network(&self) -> NetworkInfo;

    /// Returns the hardware identifier (CPU architecture by default).
    fn hardware(&self) -> String {
        std::env::consts::ARCH.to_string()
    }
}

/// Fixed environment values.
///
/// # Examples
///
/// ```
/// use qilowatt::environment::{EnvironmentInfo, NetworkInfo, StaticEnvironment};
///
/// let env = StaticEnvironment::new(NetworkInfo {
///     hostname: "edge-01".to_string(),
///     ..NetworkInfo::default()
/// });
/// assert_eq!(env.network().hostname, "edge-01");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    network: NetworkInfo,
    hardware: Option<String>,
}

impl StaticEnvironment {
    /// Creates an environment reporting the given network details.
    #[must_use]
    pub fn new(network: NetworkInfo) -> Self {
        Self {
            network,
            hardware: None,
        }
    }

    /// Overrides the hardware identifier.
    #[must_use]
    pub fn with_hardware(mut self, hardware: impl Into<String>) -> Self {
        self.hardware = Some(hardware.into());
        self
    }
}

impl EnvironmentInfo for StaticEnvironment {
    fn network(&self) -> NetworkInfo {
        self.network.clone()
    }

    fn hardware(&self) -> String {
        self.hardware
            .clone()
            .unwrap_or_else(|| std::env::consts::ARCH.to_string())
    }
}

/// Queries the running host.
///
/// Each field falls back independently: a failed lookup yields
/// `0.0.0.0` (or an all-zero MAC) instead of an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl EnvironmentInfo for SystemEnvironment {
    fn network(&self) -> NetworkInfo {
        let mut info = NetworkInfo {
            hostname: lookup_hostname(),
            ..NetworkInfo::default()
        };

        let route = default_route();
        if let Some((_, gateway)) = &route {
            info.gateway = gateway.to_string();
        }
        let preferred = route.as_ref().map(|(iface, _)| iface.as_str());

        if let Some((iface, ip, netmask)) = primary_ipv4(preferred) {
            info.ip_address = ip.to_string();
            info.subnet_mask = netmask.to_string();
            if let Some(mac) = mac_address(&iface) {
                info.mac = mac;
            }
        }

        info
    }
}

fn lookup_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Returns the interface name, address and netmask of the primary IPv4
/// interface: `preferred` if it has an IPv4 address, otherwise the first
/// non-loopback one.
fn primary_ipv4(preferred: Option<&str>) -> Option<(String, Ipv4Addr, Ipv4Addr)> {
    let interfaces = match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to list network interfaces");
            return None;
        }
    };

    let candidates: Vec<_> = interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            get_if_addrs::IfAddr::V4(v4) => Some((iface.name, v4.ip, v4.netmask)),
            get_if_addrs::IfAddr::V6(_) => None,
        })
        .collect();

    if let Some(name) = preferred
        && let Some(found) = candidates.iter().find(|(iface, _, _)| iface == name)
    {
        return Some(found.clone());
    }
    candidates.into_iter().next()
}

/// Reads the default route from `/proc/net/route`.
#[cfg(target_os = "linux")]
fn default_route() -> Option<(String, Ipv4Addr)> {
    let table = std::fs::read_to_string("/proc/net/route").ok()?;
    parse_default_route(&table)
}

#[cfg(not(target_os = "linux"))]
fn default_route() -> Option<(String, Ipv4Addr)> {
    None
}

/// Parses the default route out of a `/proc/net/route` table.
///
/// Addresses in the table are hex-encoded in little-endian byte order.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_default_route(table: &str) -> Option<(String, Ipv4Addr)> {
    table.lines().skip(1).find_map(|line| {
        let mut fields = line.split_whitespace();
        let iface = fields.next()?;
        let destination = fields.next()?;
        let gateway = fields.next()?;
        if destination != "00000000" {
            return None;
        }
        let raw = u32::from_str_radix(gateway, 16).ok()?;
        Some((iface.to_string(), Ipv4Addr::from(raw.to_le_bytes())))
    })
}

#[cfg(unix)]
fn mac_address(interface: &str) -> Option<String> {
    let addrs = nix::ifaddrs::getifaddrs().ok()?;
    addrs
        .filter(|ifaddr| ifaddr.interface_name == interface)
        .find_map(|ifaddr| {
            let bytes = ifaddr.address?.as_link_addr()?.addr()?;
            bytes.iter().any(|&b| b != 0).then(|| format_mac(bytes))
        })
}

#[cfg(not(unix))]
fn mac_address(_interface: &str) -> Option<String> {
    None
}

fn format_mac(bytes: [u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
