// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Subnet reserved for the gateway masquerade addresses (IPv4).
pub const DEFAULT_V4_MASQUERADE_SUBNET: &str = "169.254.169.0/29";
/// Subnet reserved for the gateway masquerade addresses (IPv6).
pub const DEFAULT_V6_MASQUERADE_SUBNET: &str = "fd69::/125";

/// Which address families the node participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamilyMode {
	V4,
	V6,
	#[default]
	Dual,
}

impl IpFamilyMode {
	pub fn admits(&self, addr: &IpAddr) -> bool {
		match self {
			IpFamilyMode::V4 => addr.is_ipv4(),
			IpFamilyMode::V6 => addr.is_ipv6(),
			IpFamilyMode::Dual => true,
		}
	}
}

impl fmt::Display for IpFamilyMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			IpFamilyMode::V4 => write!(f, "v4"),
			IpFamilyMode::V6 => write!(f, "v6"),
			IpFamilyMode::Dual => write!(f, "dual"),
		}
	}
}

impl FromStr for IpFamilyMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"v4" | "ipv4" => Ok(IpFamilyMode::V4),
			"v6" | "ipv6" => Ok(IpFamilyMode::V6),
			"dual" | "dualstack" | "both" => Ok(IpFamilyMode::Dual),
			other => Err(format!("unknown IP family mode: {other}")),
		}
	}
}

/// 169.254.0.0/16 and fe80::/10. IPv4-mapped IPv6 addresses are judged by
/// their IPv4 form.
pub fn is_link_local_unicast(addr: &IpAddr) -> bool {
	match addr.to_canonical() {
		IpAddr::V4(v4) => v4.is_link_local(),
		IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
	}
}

pub fn is_loopback(addr: &IpAddr) -> bool {
	addr.to_canonical().is_loopback()
}

pub fn in_any_subnet(addr: &IpAddr, subnets: &[IpNet]) -> bool {
	let addr = addr.to_canonical();
	subnets.iter().any(|net| net.contains(&addr))
}

/// Returns the first network whose address has the same family as `addr`.
pub fn first_of_family<'a>(addr: &IpAddr, nets: &'a [IpNet]) -> Option<&'a IpNet> {
	let want_v6 = addr.to_canonical().is_ipv6();
	nets.iter().find(|n| n.addr().is_ipv6() == want_v6)
}
