// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use nodeaddr_common::{CidrSet, NodeCidr};
use tracing::info;

use crate::filter::{is_valid_node_address, ExclusionContext};

#[derive(Debug, Default)]
struct AddressState {
	cidrs: CidrSet,
	primary_addr: Option<IpAddr>,
	effective_encap_ip: Option<IpAddr>,
}

/// The node's current address set and primary address.
///
/// All reads and writes go through one lock; nothing slow happens while it
/// is held.
#[derive(Debug, Default)]
pub struct AddressStore {
	state: Mutex<AddressState>,
}

impl AddressStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, AddressState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Replace the address set. Returns `true` if it differs from before.
	pub fn assign(&self, cidrs: CidrSet) -> bool {
		let mut state = self.lock();
		if state.cidrs == cidrs {
			return false;
		}
		state.cidrs = cidrs;
		true
	}

	/// Add `cidr` if it is absent and passes the exclusion checks.
	pub fn insert_if_valid(&self, cidr: NodeCidr, link_index: u32, ctx: &ExclusionContext) -> bool {
		let mut state = self.lock();
		if state.cidrs.contains(&cidr) || !is_valid_node_address(&cidr.addr(), link_index, ctx) {
			return false;
		}
		info!(%cidr, "adding node address");
		state.cidrs.insert(cidr)
	}

	/// Remove `cidr` if it is present and passes the exclusion checks.
	pub fn remove_if_valid(&self, cidr: &NodeCidr, link_index: u32, ctx: &ExclusionContext) -> bool {
		let mut state = self.lock();
		if !state.cidrs.contains(cidr) || !is_valid_node_address(&cidr.addr(), link_index, ctx) {
			return false;
		}
		info!(%cidr, "removing node address");
		state.cidrs.remove(cidr)
	}

	pub fn snapshot(&self) -> CidrSet {
		self.lock().cidrs.clone()
	}

	pub fn matches(&self, other: &CidrSet) -> bool {
		self.lock().cidrs == *other
	}

	pub fn primary_address(&self) -> Option<IpAddr> {
		self.lock().primary_addr
	}

	/// Record `addr` as the primary address if it belongs to this node.
	///
	/// Returns `true` only when the stored primary address changed.
	pub fn update_primary_if_known(&self, addr: IpAddr) -> bool {
		let addr = addr.to_canonical();
		let mut state = self.lock();
		if !state.cidrs.contains_addr(&addr) || state.primary_addr == Some(addr) {
			return false;
		}
		state.primary_addr = Some(addr);
		true
	}

	pub fn effective_encap_ip(&self) -> Option<IpAddr> {
		self.lock().effective_encap_ip
	}

	pub fn set_effective_encap_ip(&self, addr: IpAddr) {
		self.lock().effective_encap_ip = Some(addr);
	}
}
