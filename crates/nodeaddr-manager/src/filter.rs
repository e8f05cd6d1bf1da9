// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Decides whether a host address counts as a node address.
//!
//! Everything the decision needs from the outside world is gathered into an
//! [`ExclusionContext`] first, so the check itself does no I/O and can run
//! while the address store is locked.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use nodeaddr_common::{first_of_family, in_any_subnet, is_link_local_unicast, is_loopback};
use tracing::{trace, warn};

use crate::gateway::EgressMarkCache;

/// Snapshot of everything that can exclude an address.
#[derive(Clone, Default)]
pub struct ExclusionContext {
	pub management_addresses: Vec<IpNet>,
	/// Interfaces whose name starts with this prefix are management ports.
	pub management_prefix: Option<String>,
	/// Interface names by index. `None` when the links could not be listed.
	pub link_names: Option<HashMap<u32, String>>,
	pub reserved_subnets: Vec<IpNet>,
	/// Present only when egress IPs are enabled.
	pub egress: Option<EgressExclusions>,
}

#[derive(Clone, Default)]
pub struct EgressExclusions {
	/// Present only when gateway-bridge egress addresses are in play.
	pub gateway: Option<GatewayEgress>,
	/// `None` on cloud platforms or when the node could not be read.
	pub secondary_host_ips: Option<HashSet<IpAddr>>,
}

#[derive(Clone, Default)]
pub struct GatewayEgress {
	pub mark_cache: Option<Arc<dyn EgressMarkCache>>,
	/// Addresses from the node's bridge egress annotation. `None` when the
	/// annotation could not be read.
	pub annotated_ips: Option<HashSet<IpAddr>>,
}

impl GatewayEgress {
	fn excludes(&self, addr: &IpAddr) -> bool {
		let cached = self
			.mark_cache
			.as_ref()
			.is_some_and(|cache| cache.has_synced_once() && cache.contains(addr));
		cached
			|| self
				.annotated_ips
				.as_ref()
				.is_some_and(|ips| ips.contains(addr))
	}
}

impl EgressExclusions {
	fn excludes(&self, addr: &IpAddr) -> bool {
		if self.gateway.as_ref().is_some_and(|gw| gw.excludes(addr)) {
			return true;
		}
		self
			.secondary_host_ips
			.as_ref()
			.is_some_and(|ips| ips.contains(addr))
	}
}

impl ExclusionContext {
	fn is_management_link(&self, prefix: &str, link_index: u32, addr: &IpAddr) -> bool {
		match self.link_names.as_ref().and_then(|names| names.get(&link_index)) {
			Some(name) => name.starts_with(prefix),
			None => {
				warn!(%addr, link_index, "unable to determine link name; not treating as management port");
				false
			}
		}
	}
}

impl std::fmt::Debug for ExclusionContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ExclusionContext")
			.field("management_addresses", &self.management_addresses)
			.field("management_prefix", &self.management_prefix)
			.field("reserved_subnets", &self.reserved_subnets)
			.field("egress", &self.egress.is_some())
			.finish()
	}
}

/// Returns `true` if `addr` on link `link_index` should be a node address.
///
/// Checks run in a fixed order and the first exclusion wins.
pub fn is_valid_node_address(addr: &IpAddr, link_index: u32, ctx: &ExclusionContext) -> bool {
	let addr = addr.to_canonical();

	if addr.is_unspecified() {
		return false;
	}
	if is_link_local_unicast(&addr) || is_loopback(&addr) {
		return false;
	}
	if first_of_family(&addr, &ctx.management_addresses)
		.is_some_and(|mgmt| mgmt.addr().to_canonical() == addr)
	{
		trace!(%addr, "excluding management port address");
		return false;
	}
	if let Some(prefix) = ctx.management_prefix.as_deref() {
		if ctx.is_management_link(prefix, link_index, &addr) {
			trace!(%addr, link_index, "excluding address on management interface");
			return false;
		}
	}
	if in_any_subnet(&addr, &ctx.reserved_subnets) {
		return false;
	}
	if ctx.egress.as_ref().is_some_and(|egress| egress.excludes(&addr)) {
		trace!(%addr, "excluding egress address");
		return false;
	}
	true
}
