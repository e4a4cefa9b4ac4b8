//! Cluster admin clients.
//!
//! Admin clients issue cluster-altering commands against a running FoundationDB cluster. The
//! shipped implementation drives the `fdbcli` & `fdbrestore` binaries against a cluster file
//! generated from the cluster's connection string.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::config::Config;
use fdb_core::crd::{FoundationDBCluster, KeyRange, RequiredMetadata};

/// Process roles which hold data, and which therefore block the removal of a process.
const DATA_ROLES: [&str; 2] = ["storage", "log"];

/// A client for issuing admin commands against a single cluster.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Exclude the given addresses from the cluster, without waiting for data movement.
    async fn exclude(&self, addresses: &[String]) -> Result<()>;

    /// Include the given addresses back into the cluster.
    async fn include(&self, addresses: &[String]) -> Result<()>;

    /// Check which of the given excluded addresses still hold data.
    ///
    /// Returns the addresses which are not yet safe to remove.
    async fn can_safely_remove(&self, addresses: &[String]) -> Result<Vec<String>>;

    /// Get the status of any restore into the cluster. An empty status means none is running.
    async fn restore_status(&self) -> Result<String>;

    /// Start a restore from the given backup into the cluster.
    async fn start_restore(&self, backup_url: &str, key_ranges: &[KeyRange]) -> Result<()>;

    /// Set the knobs passed to the admin tooling on every command.
    fn set_knobs(&mut self, knobs: Vec<String>);
}

/// A provider of admin clients.
#[async_trait]
pub trait AdminClientProvider: Send + Sync {
    /// Get an admin client for the given cluster.
    async fn admin_client(&self, cluster: &FoundationDBCluster) -> Result<Box<dyn AdminClient>>;
}

/// Format custom parameters as knob arguments for the admin tooling.
pub fn knobs_for_cli(custom_parameters: &[String]) -> Vec<String> {
    custom_parameters
        .iter()
        .map(|param| param.trim())
        .filter(|param| !param.is_empty())
        .map(|param| format!("--{}", param))
        .collect()
}

/// Check which of the given addresses are not yet confirmed safe to remove, based on the output
/// of `status json`.
///
/// An address is only safe when the cluster reports its process as excluded and serving no data
/// role. Addresses which do not appear in the status are not safe, as a process which is down
/// may still hold data which has not been moved.
pub fn unsafe_addresses(status_json: &str, addresses: &[String]) -> Result<Vec<String>> {
    let status: Value = serde_json::from_str(status_json).context("error parsing cluster status json")?;
    let processes = status
        .pointer("/cluster/processes")
        .and_then(Value::as_object)
        .context("cluster status json does not include process information")?;

    let mut blocking = Vec::new();
    for address in addresses {
        let reported: Vec<&Value> = processes
            .values()
            .filter(|process| {
                let process_address = process.get("address").and_then(Value::as_str).unwrap_or_default();
                process_address.trim_end_matches(":tls") == address.trim_end_matches(":tls")
            })
            .collect();
        let is_blocked = reported.is_empty()
            || reported.iter().any(|process| {
                let excluded = process.get("excluded").and_then(Value::as_bool).unwrap_or(false);
                let holds_data = process
                    .get("roles")
                    .and_then(Value::as_array)
                    .map(|roles| {
                        roles
                            .iter()
                            .filter_map(|role| role.get("role").and_then(Value::as_str))
                            .any(|role| DATA_ROLES.contains(&role))
                    })
                    .unwrap_or(false);
                !excluded || holds_data
            });
        if is_blocked {
            blocking.push(address.clone());
        }
    }
    Ok(blocking)
}

/// A provider of admin clients backed by the FoundationDB CLI tooling.
pub struct FdbCliAdminProvider {
    config: Arc<Config>,
}

impl FdbCliAdminProvider {
    /// Create a new instance.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AdminClientProvider for FdbCliAdminProvider {
    async fn admin_client(&self, cluster: &FoundationDBCluster) -> Result<Box<dyn AdminClient>> {
        let connection_string = cluster
            .status
            .as_ref()
            .and_then(|status| status.connection_string.as_deref())
            .filter(|val| !val.is_empty())
            .with_context(|| format!("cluster {}/{} has no connection string", cluster.namespace(), cluster.name()))?;

        let dir = PathBuf::from(&self.config.cluster_file_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("error creating cluster file dir {:?}", dir))?;
        let cluster_file = dir.join(format!("{}-{}.cluster", cluster.namespace(), cluster.name()));
        tokio::fs::write(&cluster_file, connection_string)
            .await
            .with_context(|| format!("error writing cluster file {:?}", cluster_file))?;

        Ok(Box::new(FdbCliAdminClient {
            fdbcli_path: self.config.fdbcli_path.clone(),
            fdbrestore_path: self.config.fdbrestore_path.clone(),
            cluster_file,
            timeout: self.config.api_timeout(),
            knobs: Vec::new(),
        }))
    }
}

/// An admin client which shells out to the FoundationDB CLI tooling.
pub struct FdbCliAdminClient {
    fdbcli_path: String,
    fdbrestore_path: String,
    cluster_file: PathBuf,
    timeout: Duration,
    knobs: Vec<String>,
}

impl FdbCliAdminClient {
    /// Run the given `fdbcli` command, returning its stdout.
    async fn fdbcli(&self, command: &str) -> Result<String> {
        let mut args = vec![
            "--exec".to_string(),
            command.to_string(),
            "-C".to_string(),
            self.cluster_file.to_string_lossy().into_owned(),
            "--timeout".to_string(),
            self.timeout.as_secs().max(1).to_string(),
        ];
        args.extend(self.knobs.iter().cloned());
        run(&self.fdbcli_path, args).await
    }

    /// Run the given `fdbrestore` subcommand, returning its stdout.
    async fn fdbrestore(&self, subcommand: &str, extra: Vec<String>) -> Result<String> {
        let mut args = vec![
            subcommand.to_string(),
            "--dest_cluster_file".to_string(),
            self.cluster_file.to_string_lossy().into_owned(),
        ];
        args.extend(extra);
        args.extend(self.knobs.iter().cloned());
        run(&self.fdbrestore_path, args).await
    }
}

#[async_trait]
impl AdminClient for FdbCliAdminClient {
    async fn exclude(&self, addresses: &[String]) -> Result<()> {
        if addresses.is_empty() {
            return Ok(());
        }
        self.fdbcli(&format!("exclude no_wait {}", addresses.join(" "))).await?;
        Ok(())
    }

    async fn include(&self, addresses: &[String]) -> Result<()> {
        if addresses.is_empty() {
            return Ok(());
        }
        self.fdbcli(&format!("include {}", addresses.join(" "))).await?;
        Ok(())
    }

    async fn can_safely_remove(&self, addresses: &[String]) -> Result<Vec<String>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let status = self.fdbcli("status json").await?;
        unsafe_addresses(&status, addresses)
    }

    async fn restore_status(&self) -> Result<String> {
        let status = self.fdbrestore("status", Vec::new()).await?;
        Ok(status.trim().to_string())
    }

    async fn start_restore(&self, backup_url: &str, key_ranges: &[KeyRange]) -> Result<()> {
        let mut extra = vec!["-r".to_string(), backup_url.to_string()];
        for range in key_ranges {
            extra.push("-k".into());
            extra.push(format!("{} {}", range.start, range.end));
        }
        self.fdbrestore("start", extra).await?;
        Ok(())
    }

    fn set_knobs(&mut self, knobs: Vec<String>) {
        self.knobs = knobs;
    }
}

/// Run the given binary to completion, returning its stdout.
#[tracing::instrument(level = "debug", skip(args))]
async fn run(binary: &str, args: Vec<String>) -> Result<String> {
    tracing::debug!(?args, "running admin command");
    let output = Command::new(binary)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("error spawning {}", binary))?;
    if !output.status.success() {
        bail!("{} exited with {}: {}", binary, output.status, String::from_utf8_lossy(&output.stderr).trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
