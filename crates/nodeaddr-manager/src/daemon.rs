// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use futures::StreamExt;
use nodeaddr_k8s::{K8sError, Node, NodeEventStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::NodeMode;
use crate::error::{ManagerError, Result};
use crate::link::AddressUpdate;
use crate::manager::AddressManager;

type Subscription = Option<mpsc::Receiver<AddressUpdate>>;

/// Next update from the subscription; `None` once it has closed. Pends
/// forever while unsubscribed.
async fn next_update(subscription: &mut Subscription) -> Option<AddressUpdate> {
	match subscription {
		Some(rx) => rx.recv().await,
		None => std::future::pending().await,
	}
}

async fn next_node_event(events: &mut Option<NodeEventStream>) -> Option<std::result::Result<Node, K8sError>> {
	match events {
		Some(stream) => stream.next().await,
		None => std::future::pending().await,
	}
}

impl AddressManager {
	/// Subscribe to address changes, resyncing on success.
	async fn subscribe(&self) -> Subscription {
		match self.links.subscribe(self.shutdown_rx.clone()).await {
			Ok(rx) => {
				debug!("subscribed to address changes");
				self.sync().await;
				Some(rx)
			}
			Err(e) => {
				error!(error = %e, "failed to subscribe to address changes");
				None
			}
		}
	}

	async fn watch_node(&self) -> std::result::Result<NodeEventStream, K8sError> {
		self.nodes.watch_node(&self.config.node_name).await
	}

	/// Run until [`AddressManager::shutdown`] is called.
	///
	/// Address notifications, node updates and a periodic resync all feed
	/// one loop, so reconciliation never runs concurrently with itself.
	/// Every notification pushes the next periodic resync back by a full
	/// period. Fails only if the node watch cannot be established at start.
	#[instrument(skip(self), fields(node = %self.config.node_name))]
	pub async fn run(&self) -> Result<()> {
		if self.config.mode == NodeMode::Dpu {
			info!("DPU host mode, node address manager idle");
			return Ok(());
		}

		let mut node_events = Some(
			self
				.watch_node()
				.await
				.map_err(ManagerError::HandlerRegistration)?,
		);

		let period = self.config.sync_period;
		let mut sync_timer = tokio::time::interval_at(Instant::now() + period, period);
		sync_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

		let mut shutdown_rx = self.shutdown_rx.clone();
		let mut subscription = self.subscribe().await;

		info!("node address manager started");

		loop {
			if *shutdown_rx.borrow_and_update() {
				info!("shutdown signal received");
				break;
			}

			tokio::select! {
				biased;

				_ = shutdown_rx.changed() => {}

				update = next_update(&mut subscription) => {
					sync_timer.reset();
					match update {
						Some(update) => self.apply_update(update).await,
						None => {
							warn!("address subscription closed, resubscribing");
							subscription = self.subscribe().await;
						}
					}
				}

				event = next_node_event(&mut node_events) => {
					match event {
						Some(Ok(_)) => self.handle_primary_address_change().await,
						Some(Err(e)) => warn!(error = %e, "node watch error"),
						None => {
							warn!("node watch ended");
							node_events = None;
						}
					}
				}

				_ = sync_timer.tick() => {
					if subscription.is_some() {
						debug!("periodic address sync");
						self.sync().await;
					} else {
						subscription = self.subscribe().await;
					}

					if node_events.is_none() {
						match self.watch_node().await {
							Ok(stream) => node_events = Some(stream),
							Err(e) => warn!(error = %e, "failed to re-establish node watch"),
						}
					}
				}
			}
		}

		info!("node address manager stopped");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::time::Duration;

	use super::*;
	use crate::testing::Harness;
	use nodeaddr_common::{CidrSet, NodeCidr, HOST_CIDRS_ANNOTATION};
	use tokio::task::JoinHandle;

	fn cidr(s: &str) -> NodeCidr {
		s.parse().unwrap()
	}

	fn published(h: &Harness) -> CidrSet {
		h.nodes
			.annotation(HOST_CIDRS_ANNOTATION)
			.map(|raw| serde_json::from_str(&raw).unwrap())
			.unwrap_or_default()
	}

	fn start(manager: &Arc<AddressManager>) -> JoinHandle<Result<()>> {
		let manager = Arc::clone(manager);
		tokio::spawn(async move { manager.run().await })
	}

	async fn settle() {
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	async fn stop(manager: &AddressManager, handle: JoinHandle<Result<()>>) {
		manager.shutdown();
		handle.await.unwrap().unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_subscribe_success_triggers_sync() {
		let h = Harness::new("10.0.0.5");
		h.links.add_address(2, "eth0", "10.0.0.5/24");
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;

		assert_eq!(h.links.subscribe_calls(), 1);
		assert_eq!(published(&h), manager.cidrs());
		assert!(manager.cidrs().contains(&cidr("10.0.0.5/24")));
		assert_eq!(h.nodes.patch_count(), 1);

		stop(&manager, handle).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_events_update_published_set() {
		let h = Harness::new("10.0.0.5");
		h.links.add_address(2, "eth0", "10.0.0.5/24");
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;

		let added = h.links.add_address(2, "eth0", "10.0.0.6/24");
		h.links
			.emit(AddressUpdate {
				added: true,
				cidr: added,
				link_index: 2,
			})
			.await;
		settle().await;
		assert!(published(&h).contains(&added));

		let removed = h.links.remove_address("10.0.0.6/24");
		h.links
			.emit(AddressUpdate {
				added: false,
				cidr: removed,
				link_index: 2,
			})
			.await;
		settle().await;
		assert!(!published(&h).contains(&removed));
		assert_eq!(published(&h), manager.cidrs());

		stop(&manager, handle).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_periodic_sync_picks_up_missed_changes() {
		let h = Harness::new("10.0.0.5");
		h.links.add_address(2, "eth0", "10.0.0.5/24");
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;

		h.links.add_address(3, "eth1", "192.168.1.5/24");
		tokio::time::sleep(Duration::from_secs(31)).await;
		assert!(published(&h).contains(&cidr("192.168.1.5/24")));

		stop(&manager, handle).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_notifications_postpone_periodic_sync() {
		let h = Harness::new("10.0.0.5");
		h.links.add_address(2, "eth0", "10.0.0.5/24");
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;
		assert_eq!(h.links.list_calls(), 1);

		tokio::time::sleep(Duration::from_secs(20)).await;
		let added = h.links.add_address(2, "eth0", "10.0.0.6/24");
		h.links
			.emit(AddressUpdate {
				added: true,
				cidr: added,
				link_index: 2,
			})
			.await;

		// 35s after start, 15s after the event: no periodic sync yet.
		tokio::time::sleep(Duration::from_secs(15)).await;
		assert_eq!(h.links.list_calls(), 1);

		tokio::time::sleep(Duration::from_secs(20)).await;
		assert_eq!(h.links.list_calls(), 2);

		stop(&manager, handle).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_failed_subscription_retried_on_tick() {
		let h = Harness::new("10.0.0.5");
		h.links.add_address(2, "eth0", "10.0.0.5/24");
		h.links.fail_subscribe(true);
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;

		assert_eq!(h.links.subscribe_calls(), 1);
		assert_eq!(h.links.list_calls(), 0);
		assert_eq!(h.nodes.patch_count(), 0);

		h.links.fail_subscribe(false);
		tokio::time::sleep(Duration::from_secs(31)).await;
		assert_eq!(h.links.subscribe_calls(), 2);
		assert_eq!(h.links.list_calls(), 1);
		assert_eq!(published(&h), manager.cidrs());

		stop(&manager, handle).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_tick_republishes_diverged_record_once() {
		let h = Harness::new("10.0.0.5");
		h.links.add_address(2, "eth0", "10.0.0.1/24");
		h.nodes.set_annotation(HOST_CIDRS_ANNOTATION, "[]");
		h.links.fail_subscribe(true);
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;
		assert_eq!(h.nodes.patch_count(), 0);

		h.links.fail_subscribe(false);
		tokio::time::sleep(Duration::from_secs(31)).await;

		let patches = h.nodes.patches();
		assert_eq!(patches.len(), 1);
		assert_eq!(
			patches[0].get(HOST_CIDRS_ANNOTATION),
			Some(&Some(r#"["10.0.0.1/24"]"#.to_string()))
		);

		stop(&manager, handle).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_closed_subscription_resubscribes() {
		let h = Harness::new("10.0.0.5");
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;

		h.links.close_subscriptions();
		settle().await;
		assert_eq!(h.links.subscribe_calls(), 2);
		assert_eq!(h.links.list_calls(), 2);

		stop(&manager, handle).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_node_update_moves_encap_ip() {
		let h = Harness::new("10.0.0.5");
		h.links.add_address(2, "eth0", "10.0.0.5/24");
		h.links.add_address(3, "eth1", "192.168.1.5/24");
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;
		assert_eq!(manager.primary_address(), Some("10.0.0.5".parse().unwrap()));

		h.nodes.set_internal_ip("192.168.1.5");
		settle().await;

		assert_eq!(manager.primary_address(), Some("192.168.1.5".parse().unwrap()));
		assert_eq!(h.ovs.value(), "192.168.1.5");
		assert_eq!(h.ovs.count("reconnect"), 1);

		stop(&manager, handle).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_ended_node_watch_reestablished_on_tick() {
		let h = Harness::new("10.0.0.5");
		h.links.add_address(2, "eth0", "10.0.0.5/24");
		h.links.add_address(3, "eth1", "192.168.1.5/24");
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;

		h.nodes.close_watches();
		settle().await;
		tokio::time::sleep(Duration::from_secs(31)).await;

		h.nodes.set_internal_ip("192.168.1.5");
		settle().await;
		assert_eq!(manager.primary_address(), Some("192.168.1.5".parse().unwrap()));

		stop(&manager, handle).await;
	}

	#[tokio::test(start_paused = true)]
	async fn test_node_read_failure_at_start_is_not_fatal() {
		let h = Harness::new("10.0.0.5");
		h.links.add_address(2, "eth0", "10.0.0.5/24");
		h.nodes.fail_gets(true);
		let manager = Arc::new(h.manager(h.config()));
		let handle = start(&manager);
		settle().await;

		assert!(!handle.is_finished());
		assert_eq!(h.nodes.patch_count(), 0);

		h.nodes.fail_gets(false);
		tokio::time::sleep(Duration::from_secs(31)).await;
		assert_eq!(published(&h), manager.cidrs());
		assert_eq!(manager.primary_address(), Some("10.0.0.5".parse().unwrap()));

		stop(&manager, handle).await;
	}

	#[tokio::test]
	async fn test_watch_registration_failure_is_fatal() {
		let h = Harness::new("10.0.0.5");
		h.nodes.fail_watches(true);
		let manager = h.manager(h.config());

		let err = manager.run().await.unwrap_err();
		assert!(matches!(err, ManagerError::HandlerRegistration(_)));
		assert_eq!(h.links.subscribe_calls(), 0);
	}

	#[tokio::test]
	async fn test_dpu_mode_run_returns() {
		let h = Harness::new("10.0.0.5");
		let mut config = h.config();
		config.mode = NodeMode::Dpu;
		let manager = h.manager(config);

		manager.run().await.unwrap();
		assert_eq!(h.links.subscribe_calls(), 0);
	}

	#[tokio::test]
	async fn test_shutdown_before_run() {
		let h = Harness::new("10.0.0.5");
		let manager = h.manager(h.config());
		manager.shutdown();
		manager.run().await.unwrap();
	}
}
