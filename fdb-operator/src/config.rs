//! Runtime configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The server's logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,
    /// The port used for HTTP healthchecks and metrics.
    pub http_port: u16,

    /// The Kubernetes namespace watched by this operator.
    pub namespace: String,
    /// The name of the pod on which this instance is running.
    pub pod_name: String,

    /// The maximum number of objects of each kind reconciled concurrently.
    #[serde(default = "Config::default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: u16,
    /// The delay before re-running a pass which stopped without an explicit delay.
    #[serde(default = "Config::default_pending_requeue_seconds")]
    pub pending_requeue_seconds: u64,
    /// The upper bound applied to every requested requeue delay.
    #[serde(default = "Config::default_max_requeue_seconds")]
    pub max_requeue_seconds: u64,
    /// The delay applied by the controller before retrying a failed pass.
    #[serde(default = "Config::default_error_requeue_seconds")]
    pub error_requeue_seconds: u64,
    /// The timeout applied to each individual API and admin call of a pass.
    #[serde(default = "Config::default_api_timeout_seconds")]
    pub api_timeout_seconds: u64,

    /// The path of the `fdbcli` binary.
    #[serde(default = "Config::default_fdbcli_path")]
    pub fdbcli_path: String,
    /// The path of the `fdbrestore` binary.
    #[serde(default = "Config::default_fdbrestore_path")]
    pub fdbrestore_path: String,
    /// The directory in which cluster files are written for the admin tooling.
    #[serde(default = "Config::default_cluster_file_dir")]
    pub cluster_file_dir: String,
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this routing just parses the runtime environment and builds the application
    /// config from that.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        let config: Self = envy::from_env().context("error building config from env")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the relationships between config values which can not be expressed by their types.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_reconciles == 0 {
            anyhow::bail!("MAX_CONCURRENT_RECONCILES must be at least 1");
        }
        if self.max_requeue_seconds < self.pending_requeue_seconds {
            anyhow::bail!(
                "MAX_REQUEUE_SECONDS ({}) must not be less than PENDING_REQUEUE_SECONDS ({})",
                self.max_requeue_seconds,
                self.pending_requeue_seconds
            );
        }
        if self.api_timeout_seconds == 0 {
            anyhow::bail!("API_TIMEOUT_SECONDS must be at least 1");
        }
        Ok(())
    }

    pub fn pending_requeue(&self) -> Duration {
        Duration::from_secs(self.pending_requeue_seconds)
    }

    pub fn max_requeue(&self) -> Duration {
        Duration::from_secs(self.max_requeue_seconds)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_seconds)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_seconds)
    }

    fn default_max_concurrent_reconciles() -> u16 {
        1
    }

    fn default_pending_requeue_seconds() -> u64 {
        10
    }

    fn default_max_requeue_seconds() -> u64 {
        300
    }

    fn default_error_requeue_seconds() -> u64 {
        5
    }

    fn default_api_timeout_seconds() -> u64 {
        30
    }

    fn default_fdbcli_path() -> String {
        "fdbcli".into()
    }

    fn default_fdbrestore_path() -> String {
        "fdbrestore".into()
    }

    fn default_cluster_file_dir() -> String {
        "/var/dynamic-conf".into()
    }
}
