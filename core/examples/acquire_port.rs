//! Example: Acquire a port without signaling anyone and print what happened.
//!
//! ```text
//! cargo run -p portclaim-core --example acquire_port -- 8080 8081
//! ```

use portclaim_core::{system_acquirer, AcquisitionPlan, PortSpec};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut args = std::env::args().skip(1);
    let preferred: u16 = args.next().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let fallback: Option<u16> = args.next().and_then(|p| p.parse().ok());

    let spec = match PortSpec::new("127.0.0.1", preferred) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("Invalid port: {}", e);
            return;
        }
    };
    let fallback = fallback.and_then(|port| spec.with_port(port).ok());

    println!("Acquiring {}...\n", spec);

    let plan = AcquisitionPlan::new(spec)
        .with_fallback(fallback)
        .with_reclaim(false);
    let result = system_acquirer(false).acquire(&plan).await;

    println!("{}", result);
    println!("Bind to: {}", result.final_port);
}
