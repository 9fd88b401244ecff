//! Probe command - check whether a port can be bound.

use std::process::ExitCode;

use anyhow::Result;
use portclaim_core::{PortSpec, TcpProbe};
use serde_json::json;

use super::EXIT_CONFIG;

pub async fn run(host: &str, port: u16, json: bool) -> Result<ExitCode> {
    let spec = match PortSpec::new(host, port) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };

    let outcome = TcpProbe::new().try_bind(&spec).await;

    if json {
        let out = json!({
            "bind": spec.to_string(),
            "bindable": outcome.is_ok(),
            "reason": outcome.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        match &outcome {
            Ok(()) => println!("{} is free", spec),
            Err(e) => println!("{} is busy ({})", spec, e),
        }
    }

    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
