// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Node annotation keys and their JSON encodings.
//!
//! Parsers take the node's annotation map and report
//! [`AnnotationError::NotSet`] when the key is absent so that callers can tell
//! "never published" apart from "published but malformed".

use crate::cidr::{CidrSet, NodeCidr};
use crate::error::AnnotationError;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

pub const HOST_CIDRS_ANNOTATION: &str = "k8s.ovn.org/host-cidrs";
pub const NODE_PRIMARY_IFADDR_ANNOTATION: &str = "k8s.ovn.org/node-primary-ifaddr";
pub const L3_GATEWAY_CONFIG_ANNOTATION: &str = "k8s.ovn.org/l3-gateway-config";
pub const NODE_ENCAP_IPS_ANNOTATION: &str = "k8s.ovn.org/node-encap-ips";
pub const BRIDGE_EGRESS_IPS_ANNOTATION: &str = "k8s.ovn.org/bridge-egress-ips";
pub const SECONDARY_HOST_EGRESS_IPS_ANNOTATION: &str = "k8s.ovn.org/secondary-host-egress-ips";

const L3_GATEWAY_DEFAULT_NETWORK: &str = "default";

pub type Annotations = BTreeMap<String, String>;

fn lookup<'a>(annotations: &'a Annotations, key: &'static str) -> Result<&'a str, AnnotationError> {
	annotations
		.get(key)
		.map(String::as_str)
		.ok_or(AnnotationError::NotSet { key })
}

fn decode<T: for<'de> Deserialize<'de>>(
	annotations: &Annotations,
	key: &'static str,
) -> Result<T, AnnotationError> {
	let raw = lookup(annotations, key)?;
	serde_json::from_str(raw).map_err(|source| AnnotationError::Decode { key, source })
}

fn encode<T: Serialize>(key: &'static str, value: &T) -> Result<String, AnnotationError> {
	serde_json::to_string(value).map_err(|source| AnnotationError::Encode { key, source })
}

pub fn parse_host_cidrs(annotations: &Annotations) -> Result<CidrSet, AnnotationError> {
	let entries: Vec<String> = decode(annotations, HOST_CIDRS_ANNOTATION)?;
	entries
		.into_iter()
		.map(|entry| {
			entry
				.parse::<NodeCidr>()
				.map_err(|_| AnnotationError::InvalidValue {
					key: HOST_CIDRS_ANNOTATION,
					value: entry,
				})
		})
		.collect()
}

pub fn encode_host_cidrs(cidrs: &CidrSet) -> Result<String, AnnotationError> {
	encode(HOST_CIDRS_ANNOTATION, cidrs)
}

fn parse_ip_list(annotations: &Annotations, key: &'static str) -> Result<HashSet<IpAddr>, AnnotationError> {
	let entries: Vec<String> = decode(annotations, key)?;
	entries
		.into_iter()
		.map(|entry| {
			entry
				.trim()
				.parse::<IpAddr>()
				.map(|ip| ip.to_canonical())
				.map_err(|_| AnnotationError::InvalidValue { key, value: entry })
		})
		.collect()
}

/// Egress IPs assigned to the gateway bridge.
pub fn parse_bridge_egress_ips(annotations: &Annotations) -> Result<HashSet<IpAddr>, AnnotationError> {
	parse_ip_list(annotations, BRIDGE_EGRESS_IPS_ANNOTATION)
}

/// Egress IPs assigned to secondary (non-OVS) host interfaces.
pub fn parse_secondary_host_egress_ips(
	annotations: &Annotations,
) -> Result<HashSet<IpAddr>, AnnotationError> {
	parse_ip_list(annotations, SECONDARY_HOST_EGRESS_IPS_ANNOTATION)
}

pub fn parse_encap_ips(annotations: &Annotations) -> Result<HashSet<IpAddr>, AnnotationError> {
	parse_ip_list(annotations, NODE_ENCAP_IPS_ANNOTATION)
}

pub fn encode_encap_ips(ips: &[IpAddr]) -> Result<String, AnnotationError> {
	let mut entries: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();
	entries.sort();
	entries.dedup();
	encode(NODE_ENCAP_IPS_ANNOTATION, &entries)
}

/// Primary address of the gateway interface, one per family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryIfAddrs {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ipv4: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ipv6: Option<String>,
}

impl PrimaryIfAddrs {
	/// Takes the first address of each family, in the given order.
	pub fn from_addresses(addrs: &[IpNet]) -> Self {
		let ipv4 = addrs.iter().find(|a| a.addr().is_ipv4()).map(|a| a.to_string());
		let ipv6 = addrs.iter().find(|a| a.addr().is_ipv6()).map(|a| a.to_string());
		Self { ipv4, ipv6 }
	}

	pub fn encode(&self) -> Result<String, AnnotationError> {
		encode(NODE_PRIMARY_IFADDR_ANNOTATION, self)
	}
}

pub fn parse_primary_ifaddrs(annotations: &Annotations) -> Result<PrimaryIfAddrs, AnnotationError> {
	decode(annotations, NODE_PRIMARY_IFADDR_ANNOTATION)
}

/// Gateway configuration of the default network.
///
/// Only the address fields are interpreted; every other key written by the
/// gateway initialisation is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct L3GatewayConfig {
	#[serde(default)]
	pub mode: String,
	#[serde(rename = "ip-addresses", default, skip_serializing_if = "Vec::is_empty")]
	pub ip_addresses: Vec<String>,
	#[serde(rename = "ip-address", default, skip_serializing_if = "Option::is_none")]
	pub ip_address: Option<String>,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
	/// Entries for networks other than the default one, written back as read.
	#[serde(skip)]
	pub other_networks: BTreeMap<String, serde_json::Value>,
}

#[derive(Serialize)]
struct L3GatewayWrapper<'a> {
	#[serde(rename = "default")]
	default: &'a L3GatewayConfig,
	#[serde(flatten)]
	other_networks: &'a BTreeMap<String, serde_json::Value>,
}

impl L3GatewayConfig {
	pub fn set_ip_addresses(&mut self, addrs: &[IpNet]) {
		self.ip_addresses = addrs.iter().map(|a| a.to_string()).collect();
		self.ip_address = self.ip_addresses.first().cloned();
	}

	pub fn encode(&self) -> Result<String, AnnotationError> {
		let wrapper = L3GatewayWrapper {
			default: self,
			other_networks: &self.other_networks,
		};
		encode(L3_GATEWAY_CONFIG_ANNOTATION, &wrapper)
	}
}

pub fn parse_l3_gateway_config(annotations: &Annotations) -> Result<L3GatewayConfig, AnnotationError> {
	let mut wrapper: BTreeMap<String, serde_json::Value> =
		decode(annotations, L3_GATEWAY_CONFIG_ANNOTATION)?;
	let default = wrapper
		.remove(L3_GATEWAY_DEFAULT_NETWORK)
		.ok_or_else(|| AnnotationError::InvalidValue {
			key: L3_GATEWAY_CONFIG_ANNOTATION,
			value: format!("missing {L3_GATEWAY_DEFAULT_NETWORK:?} network"),
		})?;
	let mut config: L3GatewayConfig =
		serde_json::from_value(default).map_err(|source| AnnotationError::Decode {
			key: L3_GATEWAY_CONFIG_ANNOTATION,
			source,
		})?;
	config.other_networks = wrapper;
	Ok(config)
}
