// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::net::IpAddr;

use nodeaddr_common::Annotations;

use crate::error::K8sError;
use crate::types::Node;

static NO_ANNOTATIONS: Annotations = Annotations::new();

/// The node's annotations, or an empty map if it has none.
pub fn node_annotations(node: &Node) -> &Annotations {
	node.metadata.annotations.as_ref().unwrap_or(&NO_ANNOTATIONS)
}

/// The address the cluster considers authoritative for reaching the node.
///
/// The first `InternalIP` wins; the first `ExternalIP` is used when the node
/// reports no internal address.
pub fn node_primary_ip(node: &Node) -> Result<IpAddr, K8sError> {
	let name = node.metadata.name.clone().unwrap_or_default();
	let addresses = node
		.status
		.as_ref()
		.and_then(|s| s.addresses.as_ref())
		.map(Vec::as_slice)
		.unwrap_or_default();

	let raw = addresses
		.iter()
		.find(|a| a.type_ == "InternalIP")
		.or_else(|| addresses.iter().find(|a| a.type_ == "ExternalIP"))
		.map(|a| a.address.as_str())
		.ok_or_else(|| K8sError::PrimaryAddressNotFound { name: name.clone() })?;

	raw.trim()
		.parse::<IpAddr>()
		.map(|ip| ip.to_canonical())
		.map_err(|_| K8sError::InvalidPrimaryAddress {
			name,
			value: raw.to_string(),
		})
}
