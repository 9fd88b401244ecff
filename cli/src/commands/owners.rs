//! Owners command - show who is listening on a port.

use std::process::ExitCode;

use anyhow::Result;
use portclaim_core::ports::OwnerResolverPort;
use portclaim_core::OwnerResolver;

pub async fn run(port: u16, json: bool) -> Result<ExitCode> {
    let owners = OwnerResolver::new().find_owners(port).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&owners)?);
        return Ok(ExitCode::SUCCESS);
    }

    if owners.is_empty() {
        println!("No listening processes found on port {} (via {}).", port, owners.discovered_via());
        return Ok(ExitCode::SUCCESS);
    }

    // Table header
    println!("{:<6} {:<8} {}", "PORT", "PID", "VIA");
    println!("{}", "-".repeat(24));

    for handle in owners.handles() {
        println!("{:<6} {:<8} {}", port, handle.pid, handle.discovered_via);
    }

    println!("\nTotal: {} processes", owners.len());
    Ok(ExitCode::SUCCESS)
}
