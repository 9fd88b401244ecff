//! Launch command - acquire a port, then start the service on it.

use std::process::ExitCode;

use anyhow::Result;
use portclaim_core::{AcquisitionConfig, Error, ServiceCommand, ServiceLauncher};
use serde_json::json;

use super::acquire::{acquire_port, report};
use super::{LaunchArgs, EXIT_CONFIG, EXIT_SPAWN};

pub async fn run(config: &mut AcquisitionConfig, args: &LaunchArgs, json: bool) -> Result<ExitCode> {
    if let Some(sink) = args.sink() {
        config.output_sink = sink;
    }
    let command = match ServiceCommand::from_argv(&args.command) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
    };

    let result = match acquire_port(config, args.acquire.timeout()).await {
        Ok(result) => result,
        Err(code) => return Ok(code),
    };
    if !result.outcome.is_usable() {
        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            report(&result);
        }
        return Ok(ExitCode::from(result.outcome.exit_code() as u8));
    }
    if !json {
        report(&result);
    }

    let launcher = ServiceLauncher::new(config.output_sink.clone());
    match launcher.start(&result.final_port, &command) {
        Ok(pid) => {
            if json {
                let out = json!({
                    "pid": pid,
                    "bind": result.final_port.to_string(),
                    "output": launcher.sink().to_string(),
                    "acquisition": result,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Started {} (PID {}) on {}", command.program, pid, result.final_port);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ Error::Spawn { .. }) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::from(EXIT_SPAWN))
        }
        Err(e) => Err(e.into()),
    }
}
