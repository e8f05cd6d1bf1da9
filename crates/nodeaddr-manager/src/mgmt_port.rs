// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;

/// The node's management port, whose addresses are never node addresses.
pub trait ManagementPort: Send + Sync {
	fn addresses(&self) -> Vec<IpNet>;
}

/// A management port with a fixed set of addresses.
#[derive(Debug, Clone, Default)]
pub struct StaticManagementPort {
	addresses: Vec<IpNet>,
}

impl StaticManagementPort {
	pub fn new(addresses: Vec<IpNet>) -> Self {
		Self { addresses }
	}
}

impl ManagementPort for StaticManagementPort {
	fn addresses(&self) -> Vec<IpNet> {
		self.addresses.clone()
	}
}
