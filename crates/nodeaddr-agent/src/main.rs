// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nodeaddr_k8s::{KubeNodeClient, NodeClient};
use nodeaddr_manager::{
	AddressManager, AddressManagerConfig, Backends, IpRouteLinkSource, LinkGatewayBridge,
	LinkSource, OvsCommandRunner, StaticManagementPort,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::args::{Args, LogFormat};

fn init_tracing(format: LogFormat) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let registry = tracing_subscriber::registry().with(filter);
	match format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	init_tracing(args.log_format);

	info!("Starting nodeaddr-agent");

	let config = AddressManagerConfig::from_env().context("invalid configuration")?;
	info!(
		node = %config.node_name,
		mode = ?config.mode,
		ip_family = %config.ip_family,
		sync_period_secs = config.sync_period.as_secs(),
		gateway_bridge = %args.gateway_bridge,
		"Loaded configuration"
	);

	let links: Arc<dyn LinkSource> = Arc::new(IpRouteLinkSource::with_path(args.ip_path));
	let nodes: Arc<dyn NodeClient> = Arc::new(
		KubeNodeClient::new()
			.await
			.context("failed to create K8s client")?,
	);
	let ovs = Arc::new(
		OvsCommandRunner::with_paths(args.ovs_vsctl_path, args.ovn_appctl_path)
			.with_reconnect_timeout(config.reconnect_timeout),
	);
	let gateway = Arc::new(LinkGatewayBridge::new(
		args.gateway_bridge,
		Arc::clone(&links),
		config.ip_family,
	));
	// Whatever owns egress marking keeps this cache current through
	// `marks()`; until it is seeded only the node annotations are consulted.
	if let Some(ips) = args.egress_mark_ips {
		info!(count = ips.len(), "Seeding egress mark cache");
		gateway.marks().replace(ips);
	}
	let management_port = Arc::new(StaticManagementPort::new(args.management_addresses));

	let manager = Arc::new(AddressManager::new(
		config,
		Backends {
			links,
			nodes,
			ovs,
			gateway,
			management_port,
		},
	));

	let mut changes = manager.subscribe_changes();
	tokio::spawn(async move {
		while changes.changed().await.is_ok() {
			let generation = *changes.borrow_and_update();
			info!(generation, "Node addresses republished");
		}
	});

	let mut runner = {
		let manager = Arc::clone(&manager);
		tokio::spawn(async move { manager.run().await })
	};

	tokio::select! {
		result = &mut runner => {
			let result = result.context("address manager task panicked")?;
			if let Err(e) = &result {
				error!(error = %e, "Address manager failed");
			}
			result?;
		}
		signal = tokio::signal::ctrl_c() => {
			signal.context("failed to listen for shutdown signal")?;
			info!("Shutting down");
			manager.shutdown();
			runner
				.await
				.context("address manager task panicked")??;
		}
	}

	info!("nodeaddr-agent stopped");
	Ok(())
}
