// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use nodeaddr_common::AnnotationError;
use nodeaddr_k8s::K8sError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
	#[error("K8s error: {0}")]
	K8s(#[from] K8sError),

	#[error("link error: {0}")]
	Link(#[from] LinkError),

	#[error("OVS error: {0}")]
	Ovs(#[from] OvsError),

	#[error("gateway error: {0}")]
	Gateway(#[from] GatewayError),

	#[error("annotation error: {0}")]
	Annotation(#[from] AnnotationError),

	#[error("failed to register node change handler: {0}")]
	HandlerRegistration(#[source] K8sError),
}

#[derive(Debug, Error)]
pub enum LinkError {
	#[error("failed to run {command}: {source}")]
	Spawn {
		command: String,
		#[source]
		source: std::io::Error,
	},

	#[error("{command} failed: {stderr}")]
	Command { command: String, stderr: String },

	#[error("failed to parse {command} output: {source}")]
	Parse {
		command: String,
		#[source]
		source: serde_json::Error,
	},
}

#[derive(Debug, Error)]
pub enum OvsError {
	#[error("failed to run {command}: {source}")]
	Spawn {
		command: String,
		#[source]
		source: std::io::Error,
	},

	#[error("{command} failed: {stderr}")]
	Command { command: String, stderr: String },

	#[error("{command} timed out after {secs}s")]
	Timeout { command: String, secs: u64 },
}

#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("link error: {0}")]
	Link(#[from] LinkError),

	#[error("gateway interface {0} not found")]
	InterfaceNotFound(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("missing environment variable: {0}")]
	MissingEnv(String),

	#[error("parse error: {0}")]
	Parse(String),
}

pub type Result<T> = std::result::Result<T, ManagerError>;
