// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Node address reconciliation.
//!
//! Keeps the set of addresses a node considers its own in step with the
//! addresses actually bound to its interfaces, and publishes that set on the
//! node's Kubernetes object.
//!
//! # Overview
//!
//! The manager:
//! 1. Enumerates every link and address and filters out the ones that are
//!    not node addresses (loopback, link-local, management port, masquerade
//!    and egress addresses)
//! 2. Subscribes to kernel address notifications and applies them one by one
//! 3. Resyncs from scratch periodically, and whenever a new subscription is
//!    established
//! 4. Republishes the host CIDR, primary interface and gateway annotations
//!    whenever the set changes or the published copy disagrees with it
//! 5. Moves the OVN encap IP when the node's primary address moves to
//!    another of its own addresses
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nodeaddr_manager::{AddressManager, AddressManagerConfig, Backends};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AddressManagerConfig::from_env()?;
//!     let manager = Arc::new(AddressManager::new(config, backends));
//!
//!     // Run until shutdown() is called
//!     manager.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
mod daemon;
mod encap;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod iproute;
pub mod link;
pub mod manager;
pub mod mgmt_port;
pub mod ovs;
mod publish;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::{AddressManagerConfig, FeatureFlags, GatewayMode, NodeMode};
pub use error::{ConfigError, GatewayError, LinkError, ManagerError, OvsError, Result};
pub use filter::{is_valid_node_address, EgressExclusions, ExclusionContext, GatewayEgress};
pub use gateway::{EgressMarkCache, EgressMarkIps, GatewayBridge, LinkGatewayBridge};
pub use iproute::IpRouteLinkSource;
pub use link::{AddressUpdate, Link, LinkAddress, LinkSource};
pub use manager::{AddressManager, Backends};
pub use mgmt_port::{ManagementPort, StaticManagementPort};
pub use ovs::{OvsCommandRunner, OvsControl, OVN_ENCAP_IP_KEY};
pub use store::AddressStore;
