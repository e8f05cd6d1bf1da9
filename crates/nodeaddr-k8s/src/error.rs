// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use nodeaddr_common::AnnotationError;
use thiserror::Error;

/// Result type alias for K8s operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("Node not found: {name}")]
	NodeNotFound { name: String },

	#[error("Node watch error: {message}")]
	WatchError { message: String },

	#[error("Node {name} has no InternalIP or ExternalIP address")]
	PrimaryAddressNotFound { name: String },

	#[error("Node {name} primary address {value:?} is not an IP")]
	InvalidPrimaryAddress { name: String, value: String },

	#[error(transparent)]
	Annotation(#[from] AnnotationError),
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}
