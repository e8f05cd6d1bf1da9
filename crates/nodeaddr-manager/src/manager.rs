// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use nodeaddr_common::{
	parse_bridge_egress_ips, parse_host_cidrs, parse_secondary_host_egress_ips, AnnotationError,
	CidrSet, NodeCidr,
};
use nodeaddr_k8s::{node_annotations, NodeClient};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AddressManagerConfig, NodeMode};
use crate::error::Result;
use crate::filter::{is_valid_node_address, EgressExclusions, ExclusionContext, GatewayEgress};
use crate::gateway::GatewayBridge;
use crate::link::{link_names, AddressUpdate, Link, LinkSource};
use crate::mgmt_port::ManagementPort;
use crate::ovs::OvsControl;
use crate::store::AddressStore;

/// The collaborators an [`AddressManager`] talks to.
pub struct Backends {
	pub links: Arc<dyn LinkSource>,
	pub nodes: Arc<dyn NodeClient>,
	pub ovs: Arc<dyn OvsControl>,
	pub gateway: Arc<dyn GatewayBridge>,
	pub management_port: Arc<dyn ManagementPort>,
}

/// Keeps the node's address set in step with the host and publishes it on
/// the Node object.
pub struct AddressManager {
	pub(crate) config: AddressManagerConfig,
	pub(crate) store: AddressStore,
	pub(crate) links: Arc<dyn LinkSource>,
	pub(crate) nodes: Arc<dyn NodeClient>,
	pub(crate) ovs: Arc<dyn OvsControl>,
	pub(crate) gateway: Arc<dyn GatewayBridge>,
	management_port: Arc<dyn ManagementPort>,
	changes: watch::Sender<u64>,
	shutdown_tx: watch::Sender<bool>,
	pub(crate) shutdown_rx: watch::Receiver<bool>,
}

fn read_egress_ips(
	result: std::result::Result<HashSet<IpAddr>, AnnotationError>,
) -> Option<HashSet<IpAddr>> {
	match result {
		Ok(ips) => Some(ips),
		Err(e) if e.is_not_set() => Some(HashSet::new()),
		Err(e) => {
			warn!(error = %e, "failed to read egress addresses");
			None
		}
	}
}

impl AddressManager {
	pub fn new(config: AddressManagerConfig, backends: Backends) -> Self {
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let (changes, _) = watch::channel(0);
		Self {
			config,
			store: AddressStore::new(),
			links: backends.links,
			nodes: backends.nodes,
			ovs: backends.ovs,
			gateway: backends.gateway,
			management_port: backends.management_port,
			changes,
			shutdown_tx,
			shutdown_rx,
		}
	}

	pub fn config(&self) -> &AddressManagerConfig {
		&self.config
	}

	pub fn node_name(&self) -> &str {
		&self.config.node_name
	}

	/// The current address set.
	pub fn cidrs(&self) -> CidrSet {
		self.store.snapshot()
	}

	/// The current addresses, and the networks they belong to.
	pub fn list_addresses(&self) -> (Vec<IpAddr>, Vec<IpNet>) {
		let cidrs = self.store.snapshot();
		(cidrs.addrs(), cidrs.networks())
	}

	pub fn primary_address(&self) -> Option<IpAddr> {
		self.store.primary_address()
	}

	/// The encapsulation address last written to Open_vSwitch.
	pub fn effective_encap_ip(&self) -> Option<IpAddr> {
		self.store.effective_encap_ip()
	}

	/// Receive a new generation number each time the node's addresses are
	/// republished.
	pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
		self.changes.subscribe()
	}

	/// Ask a running [`AddressManager::run`] loop to stop.
	pub fn shutdown(&self) {
		self.shutdown_tx.send_replace(true);
	}

	pub(crate) fn notify_changed(&self) {
		self.changes.send_modify(|generation| *generation += 1);
	}

	/// Gather everything the address filter needs.
	///
	/// `links` is reused for interface names when the caller already listed
	/// them.
	pub(crate) async fn exclusion_context(&self, links: Option<&[Link]>) -> ExclusionContext {
		let mut ctx = ExclusionContext {
			management_addresses: self.management_port.addresses(),
			management_prefix: self.config.management_prefix_filter().map(str::to_string),
			link_names: None,
			reserved_subnets: self.config.masquerade_subnets.clone(),
			egress: None,
		};

		if ctx.management_prefix.is_some() {
			ctx.link_names = match links {
				Some(links) => Some(link_names(links)),
				None => match self.links.list_links().await {
					Ok(links) => Some(link_names(&links)),
					Err(e) => {
						warn!(error = %e, "failed to list links");
						None
					}
				},
			};
		}

		if self.config.features.egress_ip {
			ctx.egress = Some(self.egress_exclusions().await);
		}
		ctx
	}

	async fn egress_exclusions(&self) -> EgressExclusions {
		let features = &self.config.features;
		let node = match self.nodes.get_node(&self.config.node_name).await {
			Ok(node) => Some(node),
			Err(e) => {
				warn!(error = %e, "unable to read node for egress address exclusion");
				None
			}
		};
		let annotations = node.as_ref().map(node_annotations);

		let gateway = features
			.gateway_egress_check_enabled()
			.then(|| GatewayEgress {
				mark_cache: self.gateway.egress_mark_cache(),
				annotated_ips: annotations.and_then(|a| read_egress_ips(parse_bridge_egress_ips(a))),
			});

		let secondary_host_ips = if features.platform_manages_egress_ips() {
			None
		} else {
			annotations.and_then(|a| read_egress_ips(parse_secondary_host_egress_ips(a)))
		};

		EgressExclusions {
			gateway,
			secondary_host_ips,
		}
	}

	/// Enumerate every address on every link and keep the valid ones.
	///
	/// Any enumeration failure fails the whole collection.
	async fn collect_addresses(&self) -> Result<CidrSet> {
		let links = self.links.list_links().await?;
		let mut found = Vec::new();
		for link in &links {
			found.extend(
				self
					.links
					.list_addresses(link, self.config.ip_family)
					.await?,
			);
		}

		let ctx = self.exclusion_context(Some(&links)).await;
		Ok(found
			.into_iter()
			.filter(|a| {
				let valid = is_valid_node_address(&a.cidr.addr(), a.link_index, &ctx);
				if !valid {
					debug!(cidr = %a.cidr, link_index = a.link_index, "skipping address");
				}
				valid
			})
			.map(|a| a.cidr)
			.collect())
	}

	/// Rebuild the address set from the host and republish if needed.
	#[instrument(skip(self), fields(node = %self.config.node_name))]
	pub async fn sync(&self) {
		if self.config.mode == NodeMode::Dpu {
			return;
		}

		let cidrs = match self.collect_addresses().await {
			Ok(cidrs) => cidrs,
			Err(e) => {
				error!(error = %e, "failed to sync node addresses");
				return;
			}
		};

		let changed = self.store.assign(cidrs);
		self.handle_primary_address_change().await;
		self.reconcile_node_record(changed).await;
	}

	/// Returns `true` if the address was added.
	pub async fn add_address(&self, cidr: NodeCidr, link_index: u32) -> bool {
		let ctx = self.exclusion_context(None).await;
		self.store.insert_if_valid(cidr, link_index, &ctx)
	}

	/// Returns `true` if the address was removed.
	pub async fn remove_address(&self, cidr: &NodeCidr, link_index: u32) -> bool {
		let ctx = self.exclusion_context(None).await;
		self.store.remove_if_valid(cidr, link_index, &ctx)
	}

	pub(crate) async fn apply_update(&self, update: AddressUpdate) {
		if !self.config.ip_family.admits(&update.cidr.addr()) {
			debug!(cidr = %update.cidr, "ignoring address of unused family");
			return;
		}

		let changed = if update.added {
			self.add_address(update.cidr, update.link_index).await
		} else {
			self.remove_address(&update.cidr, update.link_index).await
		};
		self.handle_primary_address_change().await;
		self.reconcile_node_record(changed).await;
	}

	/// Whether the published host CIDRs equal the current address set.
	///
	/// Any failure to read the published set counts as a mismatch.
	pub async fn host_cidrs_match(&self) -> bool {
		let node = match self.nodes.get_node(&self.config.node_name).await {
			Ok(node) => node,
			Err(e) => {
				error!(error = %e, "unable to get node for host CIDR check");
				return false;
			}
		};
		match parse_host_cidrs(node_annotations(&node)) {
			Ok(published) => self.store.matches(&published),
			Err(e) if e.is_not_set() => false,
			Err(e) => {
				error!(error = %e, "unable to read published host CIDRs");
				false
			}
		}
	}

	async fn reconcile_node_record(&self, changed: bool) {
		if !changed && self.host_cidrs_match().await {
			return;
		}

		info!(cidrs = %self.store.snapshot(), "node addresses changed");
		if let Err(e) = self.update_node_address_annotations().await {
			error!(error = %e, "failed to update node address annotations");
		}
		self.notify_changed();
	}
}

impl std::fmt::Debug for AddressManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AddressManager")
			.field("node_name", &self.config.node_name)
			.field("cidrs", &self.store.snapshot())
			.field("primary_address", &self.store.primary_address())
			.finish()
	}
}
