// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::K8sError;
use crate::types::{Node, NodeEventStream};

/// Trait for the K8s Node operations the address manager needs.
///
/// This abstraction allows for easy mocking in tests while providing
/// a clean interface over the cluster's declarative Node record.
#[async_trait]
pub trait NodeClient: Send + Sync {
	/// Get a node by name.
	async fn get_node(&self, name: &str) -> Result<Node, K8sError>;

	/// Apply annotation updates to a node in a single merge patch.
	///
	/// `None` values remove the annotation.
	async fn patch_node_annotations(
		&self,
		name: &str,
		annotations: BTreeMap<String, Option<String>>,
	) -> Result<(), K8sError>;

	/// Watch a single node for changes.
	///
	/// Returns an error if the watch cannot be established; the stream itself
	/// yields the node after every applied change.
	async fn watch_node(&self, name: &str) -> Result<NodeEventStream, K8sError>;
}
