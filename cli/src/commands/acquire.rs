//! Acquire command - run the acquisition state machine.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use portclaim_core::{system_acquirer, AcquisitionConfig, AcquisitionOutcome, AcquisitionResult};
use tracing::warn;

use super::{EXIT_CONFIG, EXIT_TIMEOUT};

pub async fn run(config: &AcquisitionConfig, timeout: Duration, json: bool) -> Result<ExitCode> {
    let result = match acquire_port(config, timeout).await {
        Ok(result) => result,
        Err(code) => return Ok(code),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        report(&result);
        if result.outcome.is_usable() {
            println!("{}", result.final_port);
        }
    }

    Ok(ExitCode::from(result.outcome.exit_code() as u8))
}

/// Validate `config` and acquire under `timeout`.
///
/// Configuration errors and timeouts are reported here and come back as the
/// exit code to use.
pub async fn acquire_port(
    config: &AcquisitionConfig,
    timeout: Duration,
) -> std::result::Result<AcquisitionResult, ExitCode> {
    let plan = config.plan().map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_CONFIG)
    })?;

    let acquirer = system_acquirer(config.allow_elevation);
    match tokio::time::timeout(timeout, acquirer.acquire(&plan)).await {
        Ok(result) => Ok(result),
        Err(_) => {
            warn!(port = plan.preferred.port(), secs = timeout.as_secs(), "Acquisition timed out");
            eprintln!(
                "Error: acquiring {} did not finish within {}s",
                plan.preferred,
                timeout.as_secs()
            );
            Err(ExitCode::from(EXIT_TIMEOUT))
        }
    }
}

/// Human-readable status on stderr; FAILED gets the whole attempt log.
pub fn report(result: &AcquisitionResult) {
    match result.outcome {
        AcquisitionOutcome::Acquired if result.attempts.is_empty() => {}
        AcquisitionOutcome::Acquired | AcquisitionOutcome::Fallback => {
            eprintln!("{}", result.summary())
        }
        AcquisitionOutcome::Failed => eprint!("{}", result),
    }
}
