// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Primary address tracking and the OVS tunnel endpoint that follows it.

use std::net::IpAddr;

use nodeaddr_common::{encode_encap_ips, NODE_ENCAP_IPS_ANNOTATION};
use nodeaddr_k8s::{node_primary_ip, NodeAnnotator};
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::manager::AddressManager;
use crate::ovs::OVN_ENCAP_IP_KEY;

impl AddressManager {
	/// Returns the new primary address if it changed.
	async fn refresh_primary_address(&self) -> Result<Option<IpAddr>> {
		let node = self.nodes.get_node(&self.config.node_name).await?;
		let primary = node_primary_ip(&node)?;
		Ok(self
			.store
			.update_primary_if_known(primary)
			.then_some(primary))
	}

	/// Read the node's primary address and record it if it is one of ours.
	///
	/// Returns `true` only when the recorded primary address changed. A
	/// primary address outside the current set is ignored.
	pub async fn check_and_update_primary_address(&self) -> Result<bool> {
		Ok(self.refresh_primary_address().await?.is_some())
	}

	/// React to a primary address change by moving the encap IP, unless
	/// the encap IP was configured explicitly. Errors are logged.
	pub async fn handle_primary_address_change(&self) {
		let primary = match self.refresh_primary_address().await {
			Ok(Some(primary)) => primary,
			Ok(None) => return,
			Err(e) => {
				error!(error = %e, "failed to check node primary address");
				return;
			}
		};

		info!(%primary, "node primary address changed");
		if self.config.encap_ip_override.is_some() {
			debug!("encap IP is configured explicitly, leaving it unchanged");
			return;
		}
		if let Err(e) = self.update_encap_ip_and_reconnect(primary).await {
			error!(error = %e, %primary, "failed to update encap IP");
		}
	}

	/// Point the OVN tunnel endpoint at `new_ip` and restart the controller.
	///
	/// Returns `false` without side effects when Open_vSwitch already holds
	/// `new_ip`. An unreadable current value is treated as different.
	#[instrument(skip(self), fields(node = %self.config.node_name))]
	pub async fn update_encap_ip_and_reconnect(&self, new_ip: IpAddr) -> Result<bool> {
		let new_ip = new_ip.to_canonical();
		match self.ovs.get_external_id(OVN_ENCAP_IP_KEY).await {
			Ok(current) => {
				let unchanged = current
					.parse::<IpAddr>()
					.is_ok_and(|ip| ip.to_canonical() == new_ip);
				if unchanged {
					debug!(%new_ip, "encap IP already configured");
					return Ok(false);
				}
			}
			Err(e) => warn!(error = %e, "failed to read current encap IP"),
		}

		self
			.ovs
			.set_external_id(OVN_ENCAP_IP_KEY, &new_ip.to_string())
			.await?;
		self.store.set_effective_encap_ip(new_ip);
		info!(%new_ip, "encap IP updated");

		self.ovs.force_reconnect().await?;

		let mut annotator = NodeAnnotator::new(self.nodes.clone(), &self.config.node_name);
		annotator.queue(NODE_ENCAP_IPS_ANNOTATION, encode_encap_ips(&[new_ip])?);
		annotator.commit().await?;
		Ok(true)
	}
}
