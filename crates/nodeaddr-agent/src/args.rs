// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::IpAddr;

use clap::{Parser, ValueEnum};
use ipnet::IpNet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
	Text,
	Json,
}

/// Node address agent - keeps the node's published addresses in step with
/// its interfaces
///
/// Reconciliation settings (node name, features, sync period) are read from
/// NODEADDR_* environment variables.
#[derive(Parser, Debug)]
#[command(name = "nodeaddr-agent")]
pub struct Args {
	/// Gateway bridge whose addresses become the primary interface addresses
	#[arg(long, env = "NODEADDR_GATEWAY_BRIDGE", default_value = "breth0")]
	pub gateway_bridge: String,

	/// Management port address in CIDR form; may be repeated
	#[arg(
		long = "management-address",
		env = "NODEADDR_MANAGEMENT_ADDRESSES",
		value_delimiter = ','
	)]
	pub management_addresses: Vec<IpNet>,

	/// Egress IP already marked on the gateway bridge; may be repeated.
	/// When given, the mark cache is seeded and trusted from startup.
	#[arg(
		long = "egress-mark-ip",
		env = "NODEADDR_EGRESS_MARK_IPS",
		value_delimiter = ','
	)]
	pub egress_mark_ips: Option<Vec<IpAddr>>,

	/// Path to the iproute2 `ip` binary
	#[arg(long, env = "NODEADDR_IP_PATH", default_value = "ip")]
	pub ip_path: String,

	/// Path to `ovs-vsctl`
	#[arg(long, env = "NODEADDR_OVS_VSCTL_PATH", default_value = "ovs-vsctl")]
	pub ovs_vsctl_path: String,

	/// Path to `ovn-appctl`
	#[arg(long, env = "NODEADDR_OVN_APPCTL_PATH", default_value = "ovn-appctl")]
	pub ovn_appctl_path: String,

	/// Log output format
	#[arg(long, env = "NODEADDR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
	pub log_format: LogFormat,
}
