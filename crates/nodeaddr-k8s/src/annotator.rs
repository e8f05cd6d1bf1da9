// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::client::NodeClient;
use crate::error::K8sError;

/// Collects annotation updates for one node and writes them in a single patch.
pub struct NodeAnnotator {
	client: Arc<dyn NodeClient>,
	node_name: String,
	pending: BTreeMap<String, Option<String>>,
}

impl NodeAnnotator {
	pub fn new(client: Arc<dyn NodeClient>, node_name: impl Into<String>) -> Self {
		Self {
			client,
			node_name: node_name.into(),
			pending: BTreeMap::new(),
		}
	}

	/// Queue `key = value`. A later update to the same key replaces this one.
	pub fn queue(&mut self, key: &str, value: String) {
		self.pending.insert(key.to_string(), Some(value));
	}

	/// Queue removal of `key`.
	pub fn queue_delete(&mut self, key: &str) {
		self.pending.insert(key.to_string(), None);
	}

	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}

	pub fn pending_keys(&self) -> Vec<&str> {
		self.pending.keys().map(String::as_str).collect()
	}

	/// Commit every queued update.
	///
	/// The queue is drained whether or not the patch succeeds.
	#[instrument(skip(self), fields(node = %self.node_name))]
	pub async fn commit(&mut self) -> Result<(), K8sError> {
		if self.pending.is_empty() {
			return Ok(());
		}
		let updates = std::mem::take(&mut self.pending);
		debug!(count = updates.len(), "committing node annotations");
		self
			.client
			.patch_node_annotations(&self.node_name, updates)
			.await
	}
}

impl std::fmt::Debug for NodeAnnotator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NodeAnnotator")
			.field("node_name", &self.node_name)
			.field("pending", &self.pending.keys().collect::<Vec<_>>())
			.finish()
	}
}
