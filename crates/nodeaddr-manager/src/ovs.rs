// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use crate::error::OvsError;

/// Open_vSwitch external id holding the tunnel endpoint address.
pub const OVN_ENCAP_IP_KEY: &str = "ovn-encap-ip";

const VSCTL_TIMEOUT_SECS: u64 = 15;

/// Extra time given to a command beyond its own `--timeout` before it is
/// abandoned.
const COMMAND_GRACE: Duration = Duration::from_secs(5);

/// Access to the local Open_vSwitch database and the OVN controller.
#[async_trait]
pub trait OvsControl: Send + Sync {
	/// Read `external_ids:<key>` from the Open_vSwitch table.
	async fn get_external_id(&self, key: &str) -> Result<String, OvsError>;

	async fn set_external_id(&self, key: &str, value: &str) -> Result<(), OvsError>;

	/// Make the OVN controller exit and restart so it reconnects with the
	/// current configuration.
	async fn force_reconnect(&self) -> Result<(), OvsError>;
}

/// Strip the trailing newline and surrounding quotes `ovs-vsctl get` prints.
pub fn trim_vsctl_value(output: &str) -> String {
	output.trim().trim_matches('"').to_string()
}

/// [`OvsControl`] that shells out to `ovs-vsctl` and `ovn-appctl`.
#[derive(Debug, Clone)]
pub struct OvsCommandRunner {
	vsctl_path: String,
	appctl_path: String,
	reconnect_timeout: Duration,
}

impl Default for OvsCommandRunner {
	fn default() -> Self {
		Self::new()
	}
}

impl OvsCommandRunner {
	pub fn new() -> Self {
		Self::with_paths("ovs-vsctl", "ovn-appctl")
	}

	pub fn with_paths(vsctl_path: impl Into<String>, appctl_path: impl Into<String>) -> Self {
		Self {
			vsctl_path: vsctl_path.into(),
			appctl_path: appctl_path.into(),
			reconnect_timeout: Duration::from_secs(5),
		}
	}

	pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
		self.reconnect_timeout = timeout;
		self
	}

	async fn exec(&self, cmd: &str, args: &[String], limit: Duration) -> Result<String, OvsError> {
		let command = format!("{} {}", cmd, args.join(" "));
		trace!(command = %command, "executing command");

		let output = tokio::time::timeout(limit + COMMAND_GRACE, Command::new(cmd).args(args).output())
			.await
			.map_err(|_| OvsError::Timeout {
				command: command.clone(),
				secs: limit.as_secs(),
			})?
			.map_err(|source| OvsError::Spawn {
				command: command.clone(),
				source,
			})?;

		if !output.status.success() {
			return Err(OvsError::Command {
				command,
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			});
		}
		Ok(String::from_utf8_lossy(&output.stdout).to_string())
	}

	async fn vsctl(&self, args: &[String]) -> Result<String, OvsError> {
		let mut full = vec![format!("--timeout={VSCTL_TIMEOUT_SECS}")];
		full.extend_from_slice(args);
		self
			.exec(&self.vsctl_path, &full, Duration::from_secs(VSCTL_TIMEOUT_SECS))
			.await
	}
}

#[async_trait]
impl OvsControl for OvsCommandRunner {
	async fn get_external_id(&self, key: &str) -> Result<String, OvsError> {
		let output = self
			.vsctl(&[
				"get".to_string(),
				"Open_vSwitch".to_string(),
				".".to_string(),
				format!("external_ids:{key}"),
			])
			.await?;
		Ok(trim_vsctl_value(&output))
	}

	#[instrument(skip(self))]
	async fn set_external_id(&self, key: &str, value: &str) -> Result<(), OvsError> {
		self
			.vsctl(&[
				"set".to_string(),
				"Open_vSwitch".to_string(),
				".".to_string(),
				format!("external_ids:{key}=\"{value}\""),
			])
			.await?;
		debug!("updated Open_vSwitch external id");
		Ok(())
	}

	#[instrument(skip(self))]
	async fn force_reconnect(&self) -> Result<(), OvsError> {
		let secs = self.reconnect_timeout.as_secs();
		let args = [
			format!("--timeout={secs}"),
			"-t".to_string(),
			"ovn-controller".to_string(),
			"exit".to_string(),
			"--restart".to_string(),
		];
		self
			.exec(&self.appctl_path, &args, self.reconnect_timeout)
			.await?;
		debug!("ovn-controller restart requested");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_trim_vsctl_value() {
		assert_eq!(trim_vsctl_value("\"10.0.0.5\"\n"), "10.0.0.5");
		assert_eq!(trim_vsctl_value("10.0.0.5\n"), "10.0.0.5");
		assert_eq!(trim_vsctl_value("\"\"\n"), "");
		assert_eq!(trim_vsctl_value(""), "");
	}

	#[tokio::test]
	async fn test_missing_binary_is_spawn_error() {
		let runner = OvsCommandRunner::with_paths(
			"/nonexistent/ovs-vsctl",
			"/nonexistent/ovn-appctl",
		);
		let err = runner.get_external_id(OVN_ENCAP_IP_KEY).await.unwrap_err();
		assert!(matches!(err, OvsError::Spawn { .. }));
		let err = runner.force_reconnect().await.unwrap_err();
		assert!(matches!(err, OvsError::Spawn { .. }));
	}
}
