// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::client::NodeClient;
use crate::error::K8sError;
use crate::types::{Node, NodeAddress, NodeEventStream, NodeStatus, ObjectMeta};

type Patch = BTreeMap<String, Option<String>>;

/// An in-memory Node client for tests.
///
/// Holds a single node, applies annotation patches to it and records every
/// patch it receives. Failures can be switched on per operation.
#[derive(Debug, Default)]
pub struct MockNodeClient {
	node: Mutex<Option<Node>>,
	patches: Mutex<Vec<Patch>>,
	fail_get: AtomicBool,
	fail_patch: AtomicBool,
	fail_watch: AtomicBool,
	watchers: Mutex<Vec<mpsc::UnboundedSender<Result<Node, K8sError>>>>,
}

impl MockNodeClient {
	/// Create a mock with no node; every lookup returns `NodeNotFound`.
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_node(node: Node) -> Self {
		let mock = Self::default();
		*mock.node.lock().unwrap_or_else(PoisonError::into_inner) = Some(node);
		mock
	}

	/// Build a node named `name` whose `InternalIP` is `internal_ip`.
	pub fn node(name: &str, internal_ip: &str) -> Node {
		Node {
			metadata: ObjectMeta {
				name: Some(name.to_string()),
				annotations: Some(BTreeMap::new()),
				..Default::default()
			},
			status: Some(NodeStatus {
				addresses: Some(vec![NodeAddress {
					type_: "InternalIP".to_string(),
					address: internal_ip.to_string(),
				}]),
				..Default::default()
			}),
			..Default::default()
		}
	}

	pub fn set_annotation(&self, key: &str, value: &str) {
		let mut guard = self.node.lock().unwrap_or_else(PoisonError::into_inner);
		if let Some(node) = guard.as_mut() {
			node
				.metadata
				.annotations
				.get_or_insert_with(BTreeMap::new)
				.insert(key.to_string(), value.to_string());
		}
	}

	/// Change the node's `InternalIP`, notifying active watches.
	pub fn set_internal_ip(&self, ip: &str) {
		let updated = {
			let mut guard = self.node.lock().unwrap_or_else(PoisonError::into_inner);
			let Some(node) = guard.as_mut() else {
				return;
			};
			node.status = Some(NodeStatus {
				addresses: Some(vec![NodeAddress {
					type_: "InternalIP".to_string(),
					address: ip.to_string(),
				}]),
				..Default::default()
			});
			node.clone()
		};
		self.notify(updated);
	}

	fn notify(&self, node: Node) {
		let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
		watchers.retain(|tx| tx.send(Ok(node.clone())).is_ok());
	}

	/// End every active watch stream.
	pub fn close_watches(&self) {
		self.watchers.lock().unwrap_or_else(PoisonError::into_inner).clear();
	}

	pub fn fail_gets(&self, fail: bool) {
		self.fail_get.store(fail, Ordering::SeqCst);
	}

	pub fn fail_patches(&self, fail: bool) {
		self.fail_patch.store(fail, Ordering::SeqCst);
	}

	pub fn fail_watches(&self, fail: bool) {
		self.fail_watch.store(fail, Ordering::SeqCst);
	}

	pub fn patches(&self) -> Vec<Patch> {
		self.patches.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	pub fn patch_count(&self) -> usize {
		self.patches.lock().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn annotation(&self, key: &str) -> Option<String> {
		self
			.node
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.and_then(|n| n.metadata.annotations.as_ref())
			.and_then(|a| a.get(key).cloned())
	}
}

#[async_trait]
impl NodeClient for MockNodeClient {
	async fn get_node(&self, name: &str) -> Result<Node, K8sError> {
		if self.fail_get.load(Ordering::SeqCst) {
			return Err(K8sError::ApiError {
				message: "mock get failure".to_string(),
			});
		}
		self
			.node
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
			.filter(|n| n.metadata.name.as_deref() == Some(name))
			.ok_or_else(|| K8sError::NodeNotFound { name: name.into() })
	}

	async fn patch_node_annotations(
		&self,
		name: &str,
		annotations: Patch,
	) -> Result<(), K8sError> {
		if self.fail_patch.load(Ordering::SeqCst) {
			return Err(K8sError::ApiError {
				message: "mock patch failure".to_string(),
			});
		}
		let updated = {
			let mut guard = self.node.lock().unwrap_or_else(PoisonError::into_inner);
			let node = guard
				.as_mut()
				.filter(|n| n.metadata.name.as_deref() == Some(name))
				.ok_or_else(|| K8sError::NodeNotFound { name: name.into() })?;
			let current = node.metadata.annotations.get_or_insert_with(BTreeMap::new);
			for (key, value) in &annotations {
				match value {
					Some(v) => {
						current.insert(key.clone(), v.clone());
					}
					None => {
						current.remove(key);
					}
				}
			}
			node.clone()
		};
		self.patches.lock().unwrap_or_else(PoisonError::into_inner).push(annotations);
		self.notify(updated);
		Ok(())
	}

	async fn watch_node(&self, _name: &str) -> Result<NodeEventStream, K8sError> {
		if self.fail_watch.load(Ordering::SeqCst) {
			return Err(K8sError::WatchError {
				message: "mock watch failure".to_string(),
			});
		}
		let (tx, mut rx) = mpsc::unbounded_channel();
		self.watchers.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
		Ok(Box::pin(futures::stream::poll_fn(move |cx| rx.poll_recv(cx))))
	}
}
