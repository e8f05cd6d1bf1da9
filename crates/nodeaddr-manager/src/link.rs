// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host link and address enumeration.

use std::collections::HashMap;

use async_trait::async_trait;
use nodeaddr_common::{IpFamilyMode, NodeCidr};
use tokio::sync::{mpsc, watch};

use crate::error::LinkError;

/// A host network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
	pub index: u32,
	pub name: String,
}

impl Link {
	pub fn new(index: u32, name: impl Into<String>) -> Self {
		Self {
			index,
			name: name.into(),
		}
	}
}

/// An address currently bound to a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAddress {
	pub cidr: NodeCidr,
	pub link_index: u32,
}

/// A single kernel address notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressUpdate {
	/// `true` when the address was added, `false` when it was removed.
	pub added: bool,
	pub cidr: NodeCidr,
	pub link_index: u32,
}

/// Source of host interfaces, their addresses and address change events.
#[async_trait]
pub trait LinkSource: Send + Sync {
	async fn list_links(&self) -> Result<Vec<Link>, LinkError>;

	async fn list_addresses(
		&self,
		link: &Link,
		family: IpFamilyMode,
	) -> Result<Vec<LinkAddress>, LinkError>;

	/// Start delivering address notifications.
	///
	/// The returned channel closes when the underlying subscription ends or
	/// when `cancel` becomes `true`.
	async fn subscribe(
		&self,
		cancel: watch::Receiver<bool>,
	) -> Result<mpsc::Receiver<AddressUpdate>, LinkError>;
}

pub fn link_names(links: &[Link]) -> HashMap<u32, String> {
	links.iter().map(|l| (l.index, l.name.clone())).collect()
}
