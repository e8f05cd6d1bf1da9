// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::CidrError;
use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An address bound to a host interface together with its prefix length.
///
/// Host bits are kept, so `10.0.0.5/24` and `10.0.0.6/24` are distinct.
/// IPv4-mapped IPv6 addresses are folded into their IPv4 form so that every
/// address has exactly one spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeCidr(IpNet);

impl NodeCidr {
	pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, CidrError> {
		let (addr, prefix_len) = match addr {
			IpAddr::V6(v6) if prefix_len >= 96 => match v6.to_ipv4_mapped() {
				Some(v4) => (IpAddr::V4(v4), prefix_len - 96),
				None => (addr, prefix_len),
			},
			_ => (addr, prefix_len),
		};
		IpNet::new(addr, prefix_len)
			.map(Self)
			.map_err(|_| CidrError::InvalidPrefix { addr, prefix_len })
	}

	pub fn from_ipnet(net: IpNet) -> Result<Self, CidrError> {
		Self::new(net.addr(), net.prefix_len())
	}

	pub fn addr(&self) -> IpAddr {
		self.0.addr()
	}

	pub fn prefix_len(&self) -> u8 {
		self.0.prefix_len()
	}

	/// The masked network this address belongs to.
	pub fn network(&self) -> IpNet {
		self.0.trunc()
	}

	pub fn as_ipnet(&self) -> IpNet {
		self.0
	}

	pub fn is_ipv6(&self) -> bool {
		self.0.addr().is_ipv6()
	}
}

impl fmt::Display for NodeCidr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for NodeCidr {
	type Err = CidrError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let net: IpNet = s
			.trim()
			.parse()
			.map_err(|_| CidrError::Parse(s.to_string()))?;
		Self::from_ipnet(net)
	}
}

impl From<NodeCidr> for IpNet {
	fn from(cidr: NodeCidr) -> Self {
		cidr.0
	}
}

impl Serialize for NodeCidr {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for NodeCidr {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// An unordered, duplicate-free collection of [`NodeCidr`]s.
///
/// Backed by a `BTreeSet` so iteration, and therefore every published
/// encoding, is in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CidrSet(BTreeSet<NodeCidr>);

impl CidrSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true if the entry was not present.
	pub fn insert(&mut self, cidr: NodeCidr) -> bool {
		self.0.insert(cidr)
	}

	/// Returns true if the entry was present.
	pub fn remove(&mut self, cidr: &NodeCidr) -> bool {
		self.0.remove(cidr)
	}

	pub fn contains(&self, cidr: &NodeCidr) -> bool {
		self.0.contains(cidr)
	}

	/// True if any entry carries `addr`, whatever its prefix length.
	pub fn contains_addr(&self, addr: &IpAddr) -> bool {
		let addr = addr.to_canonical();
		self.0.iter().any(|c| c.addr() == addr)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &NodeCidr> {
		self.0.iter()
	}

	pub fn addrs(&self) -> Vec<IpAddr> {
		self.0.iter().map(|c| c.addr()).collect()
	}

	pub fn networks(&self) -> Vec<IpNet> {
		self.0.iter().map(|c| c.network()).collect()
	}

	pub fn to_strings(&self) -> Vec<String> {
		self.0.iter().map(|c| c.to_string()).collect()
	}
}

impl FromIterator<NodeCidr> for CidrSet {
	fn from_iter<I: IntoIterator<Item = NodeCidr>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

impl<'a> IntoIterator for &'a CidrSet {
	type Item = &'a NodeCidr;
	type IntoIter = std::collections::btree_set::Iter<'a, NodeCidr>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

impl fmt::Display for CidrSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}]", self.to_strings().join(", "))
	}
}
