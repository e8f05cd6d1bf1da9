// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use nodeaddr_common::{
	encode_host_cidrs, parse_l3_gateway_config, PrimaryIfAddrs, HOST_CIDRS_ANNOTATION,
	L3_GATEWAY_CONFIG_ANNOTATION, NODE_PRIMARY_IFADDR_ANNOTATION,
};
use nodeaddr_k8s::{node_annotations, NodeAnnotator};
use tracing::{debug, instrument};

use crate::config::NodeMode;
use crate::error::Result;
use crate::manager::AddressManager;

impl AddressManager {
	/// Write the address set, the gateway's primary interface addresses and
	/// the refreshed gateway config to the Node in one patch.
	///
	/// The node must already carry a gateway config; without one nothing is
	/// written.
	#[instrument(skip(self), fields(node = %self.config.node_name))]
	pub async fn update_node_address_annotations(&self) -> Result<()> {
		let node = self.nodes.get_node(&self.config.node_name).await?;
		let if_addrs = self.gateway.update_interface_addresses(&node).await?;

		let mut gateway_config = parse_l3_gateway_config(node_annotations(&node))?;
		gateway_config.set_ip_addresses(&if_addrs);

		let mut annotator = NodeAnnotator::new(self.nodes.clone(), &self.config.node_name);
		if self.config.mode != NodeMode::Dpu {
			annotator.queue(HOST_CIDRS_ANNOTATION, encode_host_cidrs(&self.store.snapshot())?);
		}
		annotator.queue(
			NODE_PRIMARY_IFADDR_ANNOTATION,
			PrimaryIfAddrs::from_addresses(&if_addrs).encode()?,
		);
		annotator.queue(L3_GATEWAY_CONFIG_ANNOTATION, gateway_config.encode()?);

		debug!(keys = ?annotator.pending_keys(), "publishing node addresses");
		annotator.commit().await?;
		Ok(())
	}
}
