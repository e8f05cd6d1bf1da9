// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::pin::Pin;

use futures::Stream;

use crate::error::K8sError;

pub use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeStatus};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// A pinned stream of Node objects, yielding the latest state after every
/// change to the watched node.
pub type NodeEventStream = Pin<Box<dyn Stream<Item = Result<Node, K8sError>> + Send>>;
