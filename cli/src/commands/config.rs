//! Config command - show or save the effective configuration.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use portclaim_core::{AcquisitionConfig, ConfigStore};
use serde_json::json;

use super::EXIT_CONFIG;

pub fn show(config: &AcquisitionConfig, path: Option<&Path>, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let file = match path {
        Some(path) => path.display().to_string(),
        None => ConfigStore::new()
            .map(|store| store.config_path().display().to_string())
            .unwrap_or_else(|_| "(no home directory)".to_string()),
    };
    let fallback = config
        .fallback_port
        .map(|p| p.to_string())
        .unwrap_or_else(|| "none".to_string());

    println!("Config file:      {}", file);
    println!("Host:             {}", config.host);
    println!("Preferred port:   {}", config.preferred_port);
    println!("Fallback port:    {}", fallback);
    println!("Allow reclaim:    {}", config.allow_reclaim);
    println!("Allow elevation:  {}", config.allow_elevation);
    println!("Grace wait:       {} ms", config.grace_wait_ms);
    println!("Force wait:       {} ms", config.force_wait_ms);
    println!("Output:           {}", config.output_sink);

    if let Err(e) = config.validate() {
        eprintln!("\nWarning: {}", e);
    }
    Ok(ExitCode::SUCCESS)
}

/// Write `config` (file values plus flag and env overrides) to `store`.
///
/// Invalid settings are refused so the file always loads cleanly.
pub async fn save(config: &AcquisitionConfig, store: &ConfigStore, json: bool) -> Result<ExitCode> {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return Ok(ExitCode::from(EXIT_CONFIG));
    }

    store
        .save(config)
        .await
        .with_context(|| format!("saving {}", store.config_path().display()))?;

    if json {
        let out = json!({ "saved": store.config_path().display().to_string() });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Saved configuration to {}", store.config_path().display());
    }
    Ok(ExitCode::SUCCESS)
}
