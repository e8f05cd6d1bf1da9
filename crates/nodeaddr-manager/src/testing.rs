// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory backends for exercising the manager without a host or cluster.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ipnet::IpNet;
use nodeaddr_common::{IpFamilyMode, NodeCidr, L3_GATEWAY_CONFIG_ANNOTATION};
use nodeaddr_k8s::{MockNodeClient, Node};
use tokio::sync::{mpsc, watch};

use crate::config::AddressManagerConfig;
use crate::error::{GatewayError, LinkError, OvsError};
use crate::gateway::{EgressMarkCache, EgressMarkIps, GatewayBridge};
use crate::link::{AddressUpdate, Link, LinkAddress, LinkSource};
use crate::manager::{AddressManager, Backends};
use crate::mgmt_port::StaticManagementPort;
use crate::ovs::OvsControl;

pub const NODE_NAME: &str = "node1";

fn command_error(command: &str) -> LinkError {
	LinkError::Command {
		command: command.to_string(),
		stderr: "stub failure".to_string(),
	}
}

/// Links and addresses held in memory, with a hand-driven event feed.
#[derive(Debug, Default)]
pub struct StubLinkSource {
	links: Mutex<Vec<Link>>,
	addresses: Mutex<Vec<LinkAddress>>,
	subscribers: Mutex<Vec<mpsc::Sender<AddressUpdate>>>,
	subscribe_calls: AtomicUsize,
	list_calls: AtomicUsize,
	fail_links: AtomicBool,
	fail_addresses: AtomicBool,
	fail_subscribe: AtomicBool,
}

impl StubLinkSource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_address(self, index: u32, name: &str, cidr: &str) -> Self {
		self.add_address(index, name, cidr);
		self
	}

	fn ensure_link(&self, index: u32, name: &str) {
		let mut links = self.links.lock().unwrap();
		if !links.iter().any(|l| l.index == index) {
			links.push(Link::new(index, name));
		}
	}

	/// Bind an address without emitting an event.
	pub fn add_address(&self, index: u32, name: &str, cidr: &str) -> NodeCidr {
		self.ensure_link(index, name);
		let cidr: NodeCidr = cidr.parse().unwrap();
		self.addresses.lock().unwrap().push(LinkAddress {
			cidr,
			link_index: index,
		});
		cidr
	}

	/// Unbind an address without emitting an event.
	pub fn remove_address(&self, cidr: &str) -> NodeCidr {
		let cidr: NodeCidr = cidr.parse().unwrap();
		self.addresses.lock().unwrap().retain(|a| a.cidr != cidr);
		cidr
	}

	/// Deliver an event to every live subscription.
	pub async fn emit(&self, update: AddressUpdate) {
		let subscribers: Vec<_> = self.subscribers.lock().unwrap().clone();
		for tx in subscribers {
			let _ = tx.send(update).await;
		}
	}

	pub fn close_subscriptions(&self) {
		self.subscribers.lock().unwrap().clear();
	}

	pub fn subscribe_calls(&self) -> usize {
		self.subscribe_calls.load(Ordering::SeqCst)
	}

	pub fn list_calls(&self) -> usize {
		self.list_calls.load(Ordering::SeqCst)
	}

	pub fn fail_links(&self, fail: bool) {
		self.fail_links.store(fail, Ordering::SeqCst);
	}

	pub fn fail_addresses(&self, fail: bool) {
		self.fail_addresses.store(fail, Ordering::SeqCst);
	}

	pub fn fail_subscribe(&self, fail: bool) {
		self.fail_subscribe.store(fail, Ordering::SeqCst);
	}
}

#[async_trait]
impl LinkSource for StubLinkSource {
	async fn list_links(&self) -> Result<Vec<Link>, LinkError> {
		self.list_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_links.load(Ordering::SeqCst) {
			return Err(command_error("ip link show"));
		}
		Ok(self.links.lock().unwrap().clone())
	}

	async fn list_addresses(
		&self,
		link: &Link,
		family: IpFamilyMode,
	) -> Result<Vec<LinkAddress>, LinkError> {
		if self.fail_addresses.load(Ordering::SeqCst) {
			return Err(command_error("ip addr show"));
		}
		Ok(self
			.addresses
			.lock()
			.unwrap()
			.iter()
			.filter(|a| a.link_index == link.index && family.admits(&a.cidr.addr()))
			.copied()
			.collect())
	}

	async fn subscribe(
		&self,
		_cancel: watch::Receiver<bool>,
	) -> Result<mpsc::Receiver<AddressUpdate>, LinkError> {
		self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_subscribe.load(Ordering::SeqCst) {
			return Err(command_error("ip monitor address"));
		}
		let (tx, rx) = mpsc::channel(16);
		self.subscribers.lock().unwrap().push(tx);
		Ok(rx)
	}
}

/// Open_vSwitch stand-in that records every call.
#[derive(Debug, Default)]
pub struct RecordingOvs {
	encap_ip: Mutex<String>,
	calls: Mutex<Vec<String>>,
	fail_get: AtomicBool,
	fail_set: AtomicBool,
	fail_reconnect: AtomicBool,
}

impl RecordingOvs {
	pub fn with_value(value: &str) -> Self {
		let ovs = Self::default();
		*ovs.encap_ip.lock().unwrap() = value.to_string();
		ovs
	}

	pub fn value(&self) -> String {
		self.encap_ip.lock().unwrap().clone()
	}

	pub fn calls(&self) -> Vec<String> {
		self.calls.lock().unwrap().clone()
	}

	pub fn count(&self, prefix: &str) -> usize {
		self.calls().iter().filter(|c| c.starts_with(prefix)).count()
	}

	pub fn fail_get(&self, fail: bool) {
		self.fail_get.store(fail, Ordering::SeqCst);
	}

	pub fn fail_set(&self, fail: bool) {
		self.fail_set.store(fail, Ordering::SeqCst);
	}

	pub fn fail_reconnect(&self, fail: bool) {
		self.fail_reconnect.store(fail, Ordering::SeqCst);
	}

	fn record(&self, call: String) {
		self.calls.lock().unwrap().push(call);
	}
}

fn ovs_error(command: &str) -> OvsError {
	OvsError::Command {
		command: command.to_string(),
		stderr: "stub failure".to_string(),
	}
}

#[async_trait]
impl OvsControl for RecordingOvs {
	async fn get_external_id(&self, key: &str) -> Result<String, OvsError> {
		self.record(format!("get {key}"));
		if self.fail_get.load(Ordering::SeqCst) {
			return Err(ovs_error("ovs-vsctl get"));
		}
		Ok(self.value())
	}

	async fn set_external_id(&self, key: &str, value: &str) -> Result<(), OvsError> {
		self.record(format!("set {key}={value}"));
		if self.fail_set.load(Ordering::SeqCst) {
			return Err(ovs_error("ovs-vsctl set"));
		}
		*self.encap_ip.lock().unwrap() = value.to_string();
		Ok(())
	}

	async fn force_reconnect(&self) -> Result<(), OvsError> {
		self.record("reconnect".to_string());
		if self.fail_reconnect.load(Ordering::SeqCst) {
			return Err(ovs_error("ovn-appctl exit"));
		}
		Ok(())
	}
}

/// Gateway bridge with a fixed address list.
#[derive(Default)]
pub struct StaticGateway {
	addresses: Mutex<Vec<IpNet>>,
	marks: Option<Arc<EgressMarkIps>>,
	fail: AtomicBool,
}

impl StaticGateway {
	pub fn new(addresses: &[&str]) -> Self {
		Self {
			addresses: Mutex::new(addresses.iter().map(|a| a.parse().unwrap()).collect()),
			..Default::default()
		}
	}

	pub fn with_marks(mut self, marks: Arc<EgressMarkIps>) -> Self {
		self.marks = Some(marks);
		self
	}

	pub fn fail(&self, fail: bool) {
		self.fail.store(fail, Ordering::SeqCst);
	}
}

#[async_trait]
impl GatewayBridge for StaticGateway {
	async fn update_interface_addresses(&self, _node: &Node) -> Result<Vec<IpNet>, GatewayError> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(GatewayError::InterfaceNotFound("breth0".to_string()));
		}
		Ok(self.addresses.lock().unwrap().clone())
	}

	fn egress_mark_cache(&self) -> Option<Arc<dyn EgressMarkCache>> {
		self
			.marks
			.clone()
			.map(|marks| marks as Arc<dyn EgressMarkCache>)
	}
}

/// A full set of in-memory backends around one node.
pub struct Harness {
	pub links: Arc<StubLinkSource>,
	pub nodes: Arc<MockNodeClient>,
	pub ovs: Arc<RecordingOvs>,
	pub gateway: Arc<StaticGateway>,
	pub management: Vec<IpNet>,
}

impl Harness {
	/// `node1` with `InternalIP` `primary`, a gateway config annotation and
	/// no links. Open_vSwitch already carries `primary` as its encap IP.
	pub fn new(primary: &str) -> Self {
		let nodes = MockNodeClient::with_node(MockNodeClient::node(NODE_NAME, primary));
		nodes.set_annotation(L3_GATEWAY_CONFIG_ANNOTATION, r#"{"default":{"mode":"shared"}}"#);
		Self {
			links: Arc::new(StubLinkSource::new()),
			nodes: Arc::new(nodes),
			ovs: Arc::new(RecordingOvs::with_value(primary)),
			gateway: Arc::new(StaticGateway::new(&[])),
			management: Vec::new(),
		}
	}

	pub fn config(&self) -> AddressManagerConfig {
		AddressManagerConfig::new(NODE_NAME)
	}

	pub fn manager(&self, config: AddressManagerConfig) -> AddressManager {
		AddressManager::new(
			config,
			Backends {
				links: self.links.clone(),
				nodes: self.nodes.clone(),
				ovs: self.ovs.clone(),
				gateway: self.gateway.clone(),
				management_port: Arc::new(StaticManagementPort::new(self.management.clone())),
			},
		)
	}
}
