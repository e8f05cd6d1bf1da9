// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! [`LinkSource`] backed by the iproute2 `ip` command.

use std::process::Stdio;

use async_trait::async_trait;
use nodeaddr_common::{IpFamilyMode, NodeCidr};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument, trace, warn};

use crate::error::LinkError;
use crate::link::{AddressUpdate, Link, LinkAddress, LinkSource};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
struct IpLink {
	ifindex: u32,
	ifname: String,
}

#[derive(Debug, Deserialize)]
struct IpAddrEntry {
	ifindex: u32,
	#[serde(default)]
	addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
	family: String,
	local: Option<String>,
	prefixlen: u8,
}

/// Runs `ip -json` for enumeration and `ip -o monitor address` for events.
#[derive(Debug, Clone)]
pub struct IpRouteLinkSource {
	ip_path: String,
}

impl Default for IpRouteLinkSource {
	fn default() -> Self {
		Self::new()
	}
}

impl IpRouteLinkSource {
	pub fn new() -> Self {
		Self::with_path("ip")
	}

	pub fn with_path(ip_path: impl Into<String>) -> Self {
		Self {
			ip_path: ip_path.into(),
		}
	}

	fn command_line(&self, args: &[&str]) -> String {
		format!("{} {}", self.ip_path, args.join(" "))
	}

	async fn exec(&self, args: &[&str]) -> Result<String, LinkError> {
		trace!(cmd = %self.ip_path, args = ?args, "executing command");
		let output = Command::new(&self.ip_path)
			.args(args)
			.output()
			.await
			.map_err(|source| LinkError::Spawn {
				command: self.command_line(args),
				source,
			})?;

		if !output.status.success() {
			return Err(LinkError::Command {
				command: self.command_line(args),
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}
		Ok(String::from_utf8_lossy(&output.stdout).to_string())
	}
}

fn family_flag(family: IpFamilyMode) -> Option<&'static str> {
	match family {
		IpFamilyMode::V4 => Some("-4"),
		IpFamilyMode::V6 => Some("-6"),
		IpFamilyMode::Dual => None,
	}
}

fn parse_links(json: &str) -> Result<Vec<Link>, serde_json::Error> {
	let links: Vec<IpLink> = serde_json::from_str(json)?;
	Ok(links
		.into_iter()
		.map(|l| Link::new(l.ifindex, l.ifname))
		.collect())
}

fn parse_addresses(json: &str, family: IpFamilyMode) -> Result<Vec<LinkAddress>, serde_json::Error> {
	// `ip -json addr show` prints nothing at all for a link with no addresses
	// under some versions.
	if json.trim().is_empty() {
		return Ok(Vec::new());
	}
	let entries: Vec<IpAddrEntry> = serde_json::from_str(json)?;
	let mut addresses = Vec::new();
	for entry in entries {
		for info in entry.addr_info {
			if info.family != "inet" && info.family != "inet6" {
				continue;
			}
			let Some(local) = info.local.as_deref() else {
				continue;
			};
			let cidr = match local
				.parse()
				.ok()
				.and_then(|ip| NodeCidr::new(ip, info.prefixlen).ok())
			{
				Some(cidr) => cidr,
				None => {
					debug!(address = local, prefix = info.prefixlen, "skipping unparseable address");
					continue;
				}
			};
			if !family.admits(&cidr.addr()) {
				continue;
			}
			addresses.push(LinkAddress {
				cidr,
				link_index: entry.ifindex,
			});
		}
	}
	Ok(addresses)
}

/// Parse one line of `ip -o monitor address` output.
///
/// Lines look like `2: eth0    inet 10.0.0.5/24 brd 10.0.0.255 scope global eth0`,
/// optionally prefixed by `[ADDR]` and, for removals, by `Deleted`.
pub fn parse_monitor_line(line: &str) -> Option<AddressUpdate> {
	let mut rest = line.trim();
	if let Some(stripped) = rest.strip_prefix("[ADDR]") {
		rest = stripped.trim_start();
	}
	let added = match rest.strip_prefix("Deleted ") {
		Some(stripped) => {
			rest = stripped.trim_start();
			false
		}
		None => true,
	};

	let mut tokens = rest.split_whitespace();
	let link_index = tokens.next()?.strip_suffix(':')?.parse().ok()?;
	let _ifname = tokens.next()?;
	let family = tokens.next()?;
	if family != "inet" && family != "inet6" {
		return None;
	}
	let cidr = tokens.next()?.parse().ok()?;

	Some(AddressUpdate {
		added,
		cidr,
		link_index,
	})
}

#[async_trait]
impl LinkSource for IpRouteLinkSource {
	async fn list_links(&self) -> Result<Vec<Link>, LinkError> {
		let args = ["-json", "link", "show"];
		let output = self.exec(&args).await?;
		parse_links(&output).map_err(|source| LinkError::Parse {
			command: self.command_line(&args),
			source,
		})
	}

	async fn list_addresses(
		&self,
		link: &Link,
		family: IpFamilyMode,
	) -> Result<Vec<LinkAddress>, LinkError> {
		let mut args = vec!["-json"];
		args.extend(family_flag(family));
		args.extend(["addr", "show", "dev", link.name.as_str()]);
		let output = self.exec(&args).await?;
		parse_addresses(&output, family).map_err(|source| LinkError::Parse {
			command: self.command_line(&args),
			source,
		})
	}

	#[instrument(skip(self, cancel))]
	async fn subscribe(
		&self,
		mut cancel: watch::Receiver<bool>,
	) -> Result<mpsc::Receiver<AddressUpdate>, LinkError> {
		let args = ["-o", "monitor", "address"];
		let mut child = Command::new(&self.ip_path)
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.kill_on_drop(true)
			.spawn()
			.map_err(|source| LinkError::Spawn {
				command: self.command_line(&args),
				source,
			})?;

		let stdout = child.stdout.take().ok_or_else(|| LinkError::Command {
			command: self.command_line(&args),
			stderr: "stdout not captured".to_string(),
		})?;

		let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
		tokio::spawn(async move {
			// Dropping the child kills the monitor process.
			let _child = child;
			let mut lines = BufReader::new(stdout).lines();
			loop {
				tokio::select! {
					biased;

					_ = cancel.changed() => {
						if *cancel.borrow() {
							break;
						}
					}

					line = lines.next_line() => {
						match line {
							Ok(Some(line)) => {
								let Some(update) = parse_monitor_line(&line) else {
									debug!(line = %line, "ignoring monitor line");
									continue;
								};
								if tx.send(update).await.is_err() {
									break;
								}
							}
							Ok(None) => {
								debug!("address monitor exited");
								break;
							}
							Err(e) => {
								warn!(error = %e, "failed to read address monitor output");
								break;
							}
						}
					}
				}
			}
		});

		debug!("subscribed to address changes");
		Ok(rx)
	}
}
