// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The gateway bridge and the egress addresses it carries.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use ipnet::IpNet;
use nodeaddr_common::{is_link_local_unicast, parse_bridge_egress_ips, IpFamilyMode};
use nodeaddr_k8s::{node_annotations, Node};
use tracing::{debug, instrument, warn};

use crate::error::GatewayError;
use crate::link::LinkSource;

/// Egress addresses the gateway bridge has been told to mark.
///
/// Consulted before the node's annotations; only trusted once the owning
/// controller has completed its first sync.
pub trait EgressMarkCache: Send + Sync {
	fn has_synced_once(&self) -> bool;

	fn contains(&self, ip: &IpAddr) -> bool;
}

#[async_trait]
pub trait GatewayBridge: Send + Sync {
	/// Refresh and return the bridge's own interface addresses.
	async fn update_interface_addresses(&self, node: &Node) -> Result<Vec<IpNet>, GatewayError>;

	fn egress_mark_cache(&self) -> Option<Arc<dyn EgressMarkCache>>;
}

#[derive(Debug, Default)]
pub struct EgressMarkIps {
	synced: AtomicBool,
	ips: RwLock<HashSet<IpAddr>>,
}

impl EgressMarkIps {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the cached addresses and mark the cache as synced.
	pub fn replace(&self, ips: impl IntoIterator<Item = IpAddr>) {
		let mut guard = self.ips.write().unwrap_or_else(PoisonError::into_inner);
		*guard = ips.into_iter().map(|ip| ip.to_canonical()).collect();
		self.mark_synced();
	}

	pub fn mark_synced(&self) {
		self.synced.store(true, Ordering::SeqCst);
	}

	pub fn insert(&self, ip: IpAddr) -> bool {
		self
			.ips
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(ip.to_canonical())
	}

	pub fn remove(&self, ip: &IpAddr) -> bool {
		self
			.ips
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(&ip.to_canonical())
	}
}

impl EgressMarkCache for EgressMarkIps {
	fn has_synced_once(&self) -> bool {
		self.synced.load(Ordering::SeqCst)
	}

	fn contains(&self, ip: &IpAddr) -> bool {
		self
			.ips
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.contains(&ip.to_canonical())
	}
}

/// A gateway bridge discovered by interface name.
pub struct LinkGatewayBridge {
	bridge: String,
	links: Arc<dyn LinkSource>,
	family: IpFamilyMode,
	marks: Arc<EgressMarkIps>,
	addresses: RwLock<Vec<IpNet>>,
}

impl LinkGatewayBridge {
	pub fn new(bridge: impl Into<String>, links: Arc<dyn LinkSource>, family: IpFamilyMode) -> Self {
		Self {
			bridge: bridge.into(),
			links,
			family,
			marks: Arc::new(EgressMarkIps::new()),
			addresses: RwLock::new(Vec::new()),
		}
	}

	/// Handle for the component that marks egress traffic on the bridge.
	///
	/// The cache is only trusted once [`EgressMarkIps::replace`] or
	/// [`EgressMarkIps::mark_synced`] has been called on it.
	pub fn marks(&self) -> Arc<EgressMarkIps> {
		Arc::clone(&self.marks)
	}

	/// Addresses found by the last successful refresh.
	pub fn addresses(&self) -> Vec<IpNet> {
		self
			.addresses
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}
}

#[async_trait]
impl GatewayBridge for LinkGatewayBridge {
	#[instrument(skip(self, node), fields(bridge = %self.bridge))]
	async fn update_interface_addresses(&self, node: &Node) -> Result<Vec<IpNet>, GatewayError> {
		let links = self.links.list_links().await?;
		let link = links
			.iter()
			.find(|l| l.name == self.bridge)
			.ok_or_else(|| GatewayError::InterfaceNotFound(self.bridge.clone()))?;

		// Egress addresses ride on the bridge but are not its own.
		let egress = match parse_bridge_egress_ips(node_annotations(node)) {
			Ok(ips) => ips,
			Err(e) if e.is_not_set() => HashSet::new(),
			Err(e) => {
				warn!(error = %e, "ignoring unreadable bridge egress addresses");
				HashSet::new()
			}
		};

		let addresses: Vec<IpNet> = self
			.links
			.list_addresses(link, self.family)
			.await?
			.into_iter()
			.map(|a| a.cidr.as_ipnet())
			.filter(|net| !is_link_local_unicast(&net.addr()))
			.filter(|net| !egress.contains(&net.addr()) && !self.marks.contains(&net.addr()))
			.collect();

		debug!(count = addresses.len(), "gateway bridge addresses refreshed");
		*self.addresses.write().unwrap_or_else(PoisonError::into_inner) = addresses.clone();
		Ok(addresses)
	}

	fn egress_mark_cache(&self) -> Option<Arc<dyn EgressMarkCache>> {
		Some(self.marks.clone())
	}
}

impl std::fmt::Debug for LinkGatewayBridge {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LinkGatewayBridge")
			.field("bridge", &self.bridge)
			.field("family", &self.family)
			.finish()
	}
}
