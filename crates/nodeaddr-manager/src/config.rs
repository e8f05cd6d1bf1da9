// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use ipnet::IpNet;
use nodeaddr_common::{IpFamilyMode, DEFAULT_V4_MASQUERADE_SUBNET, DEFAULT_V6_MASQUERADE_SUBNET};

use crate::error::ConfigError;

pub const DEFAULT_SYNC_PERIOD_SECS: u64 = 30;
pub const DEFAULT_RECONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MANAGEMENT_PREFIX: &str = "ovn-k8s-mp";

/// Platforms whose cloud controller assigns egress addresses itself.
const CLOUD_EGRESS_PLATFORMS: [&str; 4] = ["aws", "gcp", "azure", "openstack"];

/// Whether this agent runs on a regular node or a DPU host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeMode {
	#[default]
	Full,
	/// DPU-host mode: the address manager does nothing.
	Dpu,
}

impl FromStr for NodeMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"full" => Ok(Self::Full),
			"dpu" | "dpu-host" => Ok(Self::Dpu),
			other => Err(ConfigError::Parse(format!("invalid node mode: {other}"))),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
	#[default]
	Shared,
	Local,
	Disabled,
}

impl FromStr for GatewayMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"shared" => Ok(Self::Shared),
			"local" => Ok(Self::Local),
			"disabled" | "" => Ok(Self::Disabled),
			other => Err(ConfigError::Parse(format!("invalid gateway mode: {other}"))),
		}
	}
}

impl fmt::Display for GatewayMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Shared => write!(f, "shared"),
			Self::Local => write!(f, "local"),
			Self::Disabled => write!(f, "disabled"),
		}
	}
}

/// Cluster features that change which addresses are excluded.
#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
	pub network_segmentation: bool,
	pub egress_ip: bool,
	pub interconnect: bool,
	pub gateway_mode: GatewayMode,
	pub platform: String,
}

impl FeatureFlags {
	/// Gateway-bridge egress addresses are only excluded when every feature
	/// that puts them there is enabled.
	pub fn gateway_egress_check_enabled(&self) -> bool {
		self.egress_ip
			&& self.network_segmentation
			&& self.interconnect
			&& self.gateway_mode != GatewayMode::Disabled
	}

	pub fn platform_manages_egress_ips(&self) -> bool {
		let platform = self.platform.to_ascii_lowercase();
		CLOUD_EGRESS_PLATFORMS.contains(&platform.as_str())
	}
}

#[derive(Debug, Clone)]
pub struct AddressManagerConfig {
	pub node_name: String,
	pub mode: NodeMode,
	pub ip_family: IpFamilyMode,
	pub sync_period: Duration,
	/// Operator-configured encapsulation address. When set, primary address
	/// changes never touch the OVS encap IP.
	pub encap_ip_override: Option<IpAddr>,
	pub features: FeatureFlags,
	pub management_interface_prefix: String,
	pub masquerade_subnets: Vec<IpNet>,
	pub reconnect_timeout: Duration,
}

fn default_masquerade_subnets() -> Vec<IpNet> {
	[DEFAULT_V4_MASQUERADE_SUBNET, DEFAULT_V6_MASQUERADE_SUBNET]
		.iter()
		.filter_map(|s| s.parse().ok())
		.collect()
}

fn parse_flag(value: &str) -> bool {
	value != "0" && !value.eq_ignore_ascii_case("false")
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
	T::Err: fmt::Display,
{
	value
		.trim()
		.parse()
		.map_err(|e| ConfigError::Parse(format!("invalid {key}: {e}")))
}

impl AddressManagerConfig {
	pub fn new(node_name: impl Into<String>) -> Self {
		Self {
			node_name: node_name.into(),
			mode: NodeMode::Full,
			ip_family: IpFamilyMode::Dual,
			sync_period: Duration::from_secs(DEFAULT_SYNC_PERIOD_SECS),
			encap_ip_override: None,
			features: FeatureFlags::default(),
			management_interface_prefix: DEFAULT_MANAGEMENT_PREFIX.to_string(),
			masquerade_subnets: default_masquerade_subnets(),
			reconnect_timeout: Duration::from_secs(DEFAULT_RECONNECT_TIMEOUT_SECS),
		}
	}

	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Build a config from an arbitrary variable source.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let node_name = lookup("NODEADDR_NODE_NAME")
			.filter(|s| !s.is_empty())
			.ok_or_else(|| ConfigError::MissingEnv("NODEADDR_NODE_NAME".to_string()))?;

		let mut config = Self::new(node_name);

		if let Some(v) = lookup("NODEADDR_NODE_MODE") {
			config.mode = parse_var("NODEADDR_NODE_MODE", &v)?;
		}
		if let Some(v) = lookup("NODEADDR_IP_FAMILY") {
			config.ip_family = parse_var("NODEADDR_IP_FAMILY", &v)?;
		}
		if let Some(v) = lookup("NODEADDR_SYNC_PERIOD_SECS") {
			let secs: u64 = parse_var("NODEADDR_SYNC_PERIOD_SECS", &v)?;
			if secs == 0 {
				return Err(ConfigError::Parse(
					"NODEADDR_SYNC_PERIOD_SECS must be positive".to_string(),
				));
			}
			config.sync_period = Duration::from_secs(secs);
		}
		if let Some(v) = lookup("NODEADDR_ENCAP_IP").filter(|s| !s.trim().is_empty()) {
			config.encap_ip_override = Some(parse_var("NODEADDR_ENCAP_IP", &v)?);
		}
		if let Some(v) = lookup("NODEADDR_RECONNECT_TIMEOUT_SECS") {
			config.reconnect_timeout =
				Duration::from_secs(parse_var("NODEADDR_RECONNECT_TIMEOUT_SECS", &v)?);
		}
		if let Some(v) = lookup("NODEADDR_MGMT_PREFIX") {
			config.management_interface_prefix = v;
		}

		let mut masquerade = Vec::new();
		for (key, default) in [
			("NODEADDR_V4_MASQUERADE_SUBNET", DEFAULT_V4_MASQUERADE_SUBNET),
			("NODEADDR_V6_MASQUERADE_SUBNET", DEFAULT_V6_MASQUERADE_SUBNET),
		] {
			let value = lookup(key).unwrap_or_else(|| default.to_string());
			masquerade.push(parse_var::<IpNet>(key, &value)?);
		}
		config.masquerade_subnets = masquerade;

		config.features = FeatureFlags {
			network_segmentation: lookup("NODEADDR_ENABLE_NETWORK_SEGMENTATION")
				.is_some_and(|v| parse_flag(&v)),
			egress_ip: lookup("NODEADDR_ENABLE_EGRESS_IP").is_some_and(|v| parse_flag(&v)),
			interconnect: lookup("NODEADDR_ENABLE_INTERCONNECT").is_some_and(|v| parse_flag(&v)),
			gateway_mode: match lookup("NODEADDR_GATEWAY_MODE") {
				Some(v) => parse_var("NODEADDR_GATEWAY_MODE", &v)?,
				None => GatewayMode::Shared,
			},
			platform: lookup("NODEADDR_PLATFORM").unwrap_or_default(),
		};

		Ok(config)
	}

	/// Management interface prefix to exclude, when segmentation is on.
	pub fn management_prefix_filter(&self) -> Option<&str> {
		(self.features.network_segmentation && !self.management_interface_prefix.is_empty())
			.then_some(self.management_interface_prefix.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| map.get(key).cloned()
	}

	#[test]
	fn test_config_defaults() {
		let config = AddressManagerConfig::new("node1");
		assert_eq!(config.node_name, "node1");
		assert_eq!(config.mode, NodeMode::Full);
		assert_eq!(config.ip_family, IpFamilyMode::Dual);
		assert_eq!(config.sync_period, Duration::from_secs(30));
		assert_eq!(config.management_interface_prefix, "ovn-k8s-mp");
		assert_eq!(config.masquerade_subnets.len(), 2);
		assert!(config.encap_ip_override.is_none());
		assert!(config.management_prefix_filter().is_none());
	}

	#[test]
	fn test_node_name_required() {
		let err = AddressManagerConfig::from_lookup(lookup(&[])).unwrap_err();
		assert!(matches!(err, ConfigError::MissingEnv(_)));
	}

	#[test]
	fn test_from_lookup_full() {
		let config = AddressManagerConfig::from_lookup(lookup(&[
			("NODEADDR_NODE_NAME", "worker-1"),
			("NODEADDR_NODE_MODE", "dpu"),
			("NODEADDR_IP_FAMILY", "v6"),
			("NODEADDR_SYNC_PERIOD_SECS", "10"),
			("NODEADDR_ENCAP_IP", "192.0.2.10"),
			("NODEADDR_ENABLE_NETWORK_SEGMENTATION", "true"),
			("NODEADDR_ENABLE_EGRESS_IP", "1"),
			("NODEADDR_ENABLE_INTERCONNECT", "false"),
			("NODEADDR_GATEWAY_MODE", "local"),
			("NODEADDR_PLATFORM", "AWS"),
			("NODEADDR_V4_MASQUERADE_SUBNET", "169.254.0.0/17"),
		]))
		.unwrap();

		assert_eq!(config.node_name, "worker-1");
		assert_eq!(config.mode, NodeMode::Dpu);
		assert_eq!(config.ip_family, IpFamilyMode::V6);
		assert_eq!(config.sync_period, Duration::from_secs(10));
		assert_eq!(config.encap_ip_override, Some("192.0.2.10".parse().unwrap()));
		assert!(config.features.network_segmentation);
		assert!(config.features.egress_ip);
		assert!(!config.features.interconnect);
		assert_eq!(config.features.gateway_mode, GatewayMode::Local);
		assert!(config.features.platform_manages_egress_ips());
		assert_eq!(config.masquerade_subnets[0].to_string(), "169.254.0.0/17");
		assert_eq!(config.management_prefix_filter(), Some("ovn-k8s-mp"));
	}

	#[test]
	fn test_invalid_values_rejected() {
		for (key, value) in [
			("NODEADDR_NODE_MODE", "half"),
			("NODEADDR_SYNC_PERIOD_SECS", "0"),
			("NODEADDR_SYNC_PERIOD_SECS", "soon"),
			("NODEADDR_ENCAP_IP", "not-an-ip"),
			("NODEADDR_GATEWAY_MODE", "tunnel"),
			("NODEADDR_V6_MASQUERADE_SUBNET", "fd69::"),
		] {
			let result =
				AddressManagerConfig::from_lookup(lookup(&[("NODEADDR_NODE_NAME", "n"), (key, value)]));
			assert!(
				matches!(result, Err(ConfigError::Parse(_))),
				"{key}={value} should be rejected"
			);
		}
	}

	#[test]
	fn test_gateway_egress_check_requires_all_features() {
		let mut features = FeatureFlags {
			network_segmentation: true,
			egress_ip: true,
			interconnect: true,
			gateway_mode: GatewayMode::Shared,
			platform: String::new(),
		};
		assert!(features.gateway_egress_check_enabled());

		features.gateway_mode = GatewayMode::Disabled;
		assert!(!features.gateway_egress_check_enabled());

		features.gateway_mode = GatewayMode::Local;
		features.interconnect = false;
		assert!(!features.gateway_egress_check_enabled());
	}

	#[test]
	fn test_cloud_platforms() {
		for platform in ["aws", "GCP", "Azure", "openstack"] {
			let features = FeatureFlags {
				platform: platform.to_string(),
				..Default::default()
			};
			assert!(features.platform_manages_egress_ips(), "{platform}");
		}
		let features = FeatureFlags {
			platform: "baremetal".to_string(),
			..Default::default()
		};
		assert!(!features.platform_manages_egress_ips());
	}
}
