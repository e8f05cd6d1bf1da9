// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CidrError {
	#[error("invalid CIDR: {0}")]
	Parse(String),

	#[error("invalid prefix length {prefix_len} for {addr}")]
	InvalidPrefix { addr: IpAddr, prefix_len: u8 },
}

#[derive(Debug, Error)]
pub enum AnnotationError {
	#[error("annotation {key} is not set")]
	NotSet { key: &'static str },

	#[error("failed to decode annotation {key}: {source}")]
	Decode {
		key: &'static str,
		#[source]
		source: serde_json::Error,
	},

	#[error("failed to encode annotation {key}: {source}")]
	Encode {
		key: &'static str,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid value {value:?} in annotation {key}")]
	InvalidValue { key: &'static str, value: String },
}

impl AnnotationError {
	/// True when the annotation is simply absent, as opposed to malformed.
	pub fn is_not_set(&self) -> bool {
		matches!(self, AnnotationError::NotSet { .. })
	}
}
