// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! K8s Node access for the node address manager.
//!
//! This crate provides:
//! - A trait-based Node client abstraction for testability
//! - Production implementation using the kube crate
//! - A batching annotator that commits queued annotation updates in one patch
//! - Helpers for reading the node's primary address and annotations

mod annotator;
mod client;
mod error;
mod kube_client;
mod mock;
mod node;
mod types;

pub use annotator::NodeAnnotator;
pub use client::NodeClient;
pub use error::{K8sError, K8sResult};
pub use kube_client::KubeNodeClient;
pub use mock::MockNodeClient;
pub use node::{node_annotations, node_primary_ip};
pub use types::{Node, NodeAddress, NodeEventStream, NodeStatus, ObjectMeta};
