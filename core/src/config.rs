//! Acquisition settings.
//!
//! Settings are layered: built-in defaults, then an optional JSON file
//! (`~/.portclaim/config.json` unless a path is given), then `PORTCLAIM_*`
//! environment variables. Command-line flags are applied last by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::adapters::OutputSink;
use crate::application::{AcquisitionPlan, ReclaimPolicy};
use crate::domain::PortSpec;
use crate::error::{Error, Result};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "PORTCLAIM_";

/// Everything needed to acquire a port and start a service on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AcquisitionConfig {
    /// Interface to bind, `127.0.0.1` by default.
    pub host: String,

    pub preferred_port: u16,

    /// `None` disables the fallback entirely.
    pub fallback_port: Option<u16>,

    /// Whether busy owners may be signaled at all.
    pub allow_reclaim: bool,

    /// Whether a refused SIGKILL may be retried through sudo.
    pub allow_elevation: bool,

    pub grace_wait_ms: u64,
    pub force_wait_ms: u64,

    /// Where the launched service's output goes.
    pub output_sink: OutputSink,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            preferred_port: 80,
            fallback_port: Some(8000),
            allow_reclaim: true,
            allow_elevation: true,
            grace_wait_ms: 2000,
            force_wait_ms: 1000,
            output_sink: OutputSink::Discard,
        }
    }
}

impl AcquisitionConfig {
    /// Reject settings that cannot describe a usable acquisition.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if self.preferred_port == 0 {
            return Err(Error::Config("preferred port must be 1-65535".to_string()));
        }
        match self.fallback_port {
            Some(0) => Err(Error::Config("fallback port must be 1-65535".to_string())),
            Some(port) if port == self.preferred_port => Err(Error::Config(format!(
                "fallback port {} is the same as the preferred port",
                port
            ))),
            _ => Ok(()),
        }
    }

    /// Apply `PORTCLAIM_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; keys carry the `PORTCLAIM_` prefix.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(host) = get("HOST") {
            self.host = host;
        }
        if let Some(value) = get("PREFERRED_PORT") {
            self.preferred_port = parse_number("PREFERRED_PORT", &value)?;
        }
        if let Some(value) = get("FALLBACK_PORT") {
            self.fallback_port = match value.trim() {
                "" | "none" => None,
                other => Some(parse_number("FALLBACK_PORT", other)?),
            };
        }
        if let Some(value) = get("ALLOW_RECLAIM") {
            self.allow_reclaim = parse_flag("ALLOW_RECLAIM", &value)?;
        }
        if let Some(value) = get("ALLOW_ELEVATION") {
            self.allow_elevation = parse_flag("ALLOW_ELEVATION", &value)?;
        }
        if let Some(value) = get("GRACE_WAIT_MS") {
            self.grace_wait_ms = parse_number("GRACE_WAIT_MS", &value)?;
        }
        if let Some(value) = get("FORCE_WAIT_MS") {
            self.force_wait_ms = parse_number("FORCE_WAIT_MS", &value)?;
        }
        if let Some(value) = get("OUTPUT") {
            self.output_sink = value.parse()?;
        }
        Ok(())
    }

    pub fn preferred_spec(&self) -> Result<PortSpec> {
        PortSpec::new(self.host.clone(), self.preferred_port)
    }

    pub fn fallback_spec(&self) -> Result<Option<PortSpec>> {
        self.fallback_port
            .map(|port| PortSpec::new(self.host.clone(), port))
            .transpose()
    }

    pub fn reclaim_policy(&self) -> ReclaimPolicy {
        ReclaimPolicy {
            grace_wait: Duration::from_millis(self.grace_wait_ms),
            force_wait: Duration::from_millis(self.force_wait_ms),
            allow_elevation: self.allow_elevation,
        }
    }

    /// Validate and turn the settings into a plan for the acquirer.
    pub fn plan(&self) -> Result<AcquisitionPlan> {
        self.validate()?;
        Ok(AcquisitionPlan::new(self.preferred_spec()?)
            .with_fallback(self.fallback_spec()?)
            .with_reclaim(self.allow_reclaim)
            .with_policy(self.reclaim_policy()))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "{}{} must be a number, got {:?}",
            ENV_PREFIX, name, value
        ))
    })
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{}{} must be true or false, got {:?}",
            ENV_PREFIX, name, value
        ))),
    }
}

/// Reads and writes [`AcquisitionConfig`] as JSON.
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store at the default path, `~/.portclaim/config.json`.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            config_path: home.join(".portclaim").join("config.json"),
        })
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load settings from disk.
    ///
    /// Returns defaults if the file doesn't exist.
    pub async fn load(&self) -> Result<AcquisitionConfig> {
        if !self.config_path.exists() {
            debug!(path = %self.config_path.display(), "No config file, using defaults");
            return Ok(AcquisitionConfig::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save settings to disk, creating the directory if needed.
    pub async fn save(&self, config: &AcquisitionConfig) -> Result<()> {
        if let Some(config_dir) = self.config_path.parent() {
            fs::create_dir_all(config_dir)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write atomically by writing to temp file then renaming
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }
}
