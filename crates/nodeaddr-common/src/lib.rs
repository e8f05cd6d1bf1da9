// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Common types for the node address manager.
//!
//! This crate holds everything that is pure data: the canonical form of a host
//! interface address ([`NodeCidr`]), the set the manager keeps of them
//! ([`CidrSet`]), IP family selection, and the JSON encodings of the node
//! annotations the manager reads and writes.

pub mod annotations;
pub mod cidr;
pub mod error;
pub mod ip;

pub use annotations::{
	encode_encap_ips, encode_host_cidrs, parse_bridge_egress_ips, parse_encap_ips,
	parse_host_cidrs, parse_l3_gateway_config, parse_primary_ifaddrs,
	parse_secondary_host_egress_ips, Annotations, L3GatewayConfig, PrimaryIfAddrs,
	BRIDGE_EGRESS_IPS_ANNOTATION, HOST_CIDRS_ANNOTATION, L3_GATEWAY_CONFIG_ANNOTATION,
	NODE_ENCAP_IPS_ANNOTATION, NODE_PRIMARY_IFADDR_ANNOTATION,
	SECONDARY_HOST_EGRESS_IPS_ANNOTATION,
};
pub use cidr::{CidrSet, NodeCidr};
pub use error::{AnnotationError, CidrError};
pub use ip::{
	first_of_family, in_any_subnet, is_link_local_unicast, is_loopback, IpFamilyMode,
	DEFAULT_V4_MASQUERADE_SUBNET, DEFAULT_V6_MASQUERADE_SUBNET,
};
