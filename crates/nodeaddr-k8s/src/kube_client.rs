// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use kube::{
	api::{Api, Patch, PatchParams},
	runtime::{watcher, WatchStreamExt},
	Client,
};
use tracing::{debug, instrument};

use crate::client::NodeClient;
use crate::error::K8sError;
use crate::types::{Node, NodeEventStream};

/// Production Node client implementation using the kube crate.
pub struct KubeNodeClient {
	client: Client,
}

impl KubeNodeClient {
	/// Create a new KubeNodeClient that auto-discovers cluster configuration.
	///
	/// This will attempt to load config from:
	/// 1. In-cluster service account (when running in K8s)
	/// 2. KUBECONFIG environment variable
	/// 3. ~/.kube/config
	pub async fn new() -> Result<Self, K8sError> {
		let client = Client::try_default().await?;
		debug!("K8s client initialized");
		Ok(Self { client })
	}

	pub fn from_client(client: Client) -> Self {
		Self { client }
	}

	fn nodes(&self) -> Api<Node> {
		Api::all(self.client.clone())
	}
}

#[async_trait]
impl NodeClient for KubeNodeClient {
	async fn get_node(&self, name: &str) -> Result<Node, K8sError> {
		match self.nodes().get(name).await {
			Ok(node) => Ok(node),
			Err(kube::Error::Api(err)) if err.code == 404 => {
				Err(K8sError::NodeNotFound { name: name.into() })
			}
			Err(e) => Err(e.into()),
		}
	}

	#[instrument(skip(self, annotations), fields(keys = annotations.len()))]
	async fn patch_node_annotations(
		&self,
		name: &str,
		annotations: BTreeMap<String, Option<String>>,
	) -> Result<(), K8sError> {
		let patch = serde_json::json!({
			"metadata": {
				"annotations": annotations,
			}
		});
		match self
			.nodes()
			.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
			.await
		{
			Ok(_) => {
				debug!("patched node annotations");
				Ok(())
			}
			Err(kube::Error::Api(err)) if err.code == 404 => {
				Err(K8sError::NodeNotFound { name: name.into() })
			}
			Err(e) => Err(e.into()),
		}
	}

	/// Errors reaching the API server arrive on the stream, spaced out by
	/// the watcher's backoff, rather than failing the call.
	#[instrument(skip(self))]
	async fn watch_node(&self, name: &str) -> Result<NodeEventStream, K8sError> {
		let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
		let stream = watcher(self.nodes(), config)
			.default_backoff()
			.applied_objects()
			.map(|result| {
				result.map_err(|e| K8sError::WatchError {
					message: e.to_string(),
				})
			});

		debug!("node watch established");
		Ok(Box::pin(stream))
	}
}
