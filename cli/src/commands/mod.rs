//! Subcommands and the options they share.

pub mod acquire;
pub mod config;
pub mod launch;
pub mod owners;
pub mod probe;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use portclaim_core::{AcquisitionConfig, ConfigStore, OutputSink};

/// Service could not be started.
pub const EXIT_SPAWN: u8 = 2;
/// The whole acquisition ran past `--timeout-secs`.
pub const EXIT_TIMEOUT: u8 = 3;
/// Invalid settings (EX_USAGE).
pub const EXIT_CONFIG: u8 = 64;

/// Flags that override the loaded configuration.
#[derive(Args, Debug, Clone)]
pub struct AcquireArgs {
    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Preferred port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Port to use if the preferred one cannot be freed
    #[arg(long, conflicts_with = "no_fallback")]
    pub fallback: Option<u16>,

    /// Fail instead of falling back
    #[arg(long)]
    pub no_fallback: bool,

    /// Never signal the processes holding the port
    #[arg(long)]
    pub no_reclaim: bool,

    /// Never retry a refused kill through sudo
    #[arg(long)]
    pub no_elevation: bool,

    /// Wait after SIGTERM, in milliseconds
    #[arg(long, value_name = "MS")]
    pub grace_wait_ms: Option<u64>,

    /// Wait after SIGKILL, in milliseconds
    #[arg(long, value_name = "MS")]
    pub force_wait_ms: Option<u64>,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub timeout_secs: u64,
}

impl AcquireArgs {
    pub fn apply(&self, config: &mut AcquisitionConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.preferred_port = port;
        }
        if let Some(port) = self.fallback {
            config.fallback_port = Some(port);
        }
        if self.no_fallback {
            config.fallback_port = None;
        }
        if self.no_reclaim {
            config.allow_reclaim = false;
        }
        if self.no_elevation {
            config.allow_elevation = false;
        }
        if let Some(ms) = self.grace_wait_ms {
            config.grace_wait_ms = ms;
        }
        if let Some(ms) = self.force_wait_ms {
            config.force_wait_ms = ms;
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Args, Debug, Clone)]
pub struct LaunchArgs {
    #[command(flatten)]
    pub acquire: AcquireArgs,

    /// Append the service's output to this file
    #[arg(long, value_name = "PATH", conflicts_with = "discard")]
    pub log_file: Option<PathBuf>,

    /// Send the service's output to /dev/null
    #[arg(long)]
    pub discard: bool,

    /// Service command; `{host}` and `{port}` are substituted
    #[arg(last = true, required = true, value_name = "CMD")]
    pub command: Vec<String>,
}

impl LaunchArgs {
    /// The sink from flags, if any flag chose one.
    pub fn sink(&self) -> Option<OutputSink> {
        if self.discard {
            Some(OutputSink::Discard)
        } else {
            self.log_file.clone().map(OutputSink::File)
        }
    }
}

/// Defaults, then the config file, then `PORTCLAIM_*` variables.
pub async fn load_config(path: Option<PathBuf>) -> Result<AcquisitionConfig> {
    let store = config_store(path)?;
    let mut config = store
        .load()
        .await
        .with_context(|| format!("loading {}", store.config_path().display()))?;
    config.apply_env()?;
    Ok(config)
}

/// The store at `path`, or the default one under the home directory.
pub fn config_store(path: Option<PathBuf>) -> Result<ConfigStore> {
    Ok(match path {
        Some(path) => ConfigStore::with_path(path),
        None => ConfigStore::new()?,
    })
}
