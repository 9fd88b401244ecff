//! Acquisition against the real host: real sockets, real introspection.

use std::net::TcpListener;
use std::time::Duration;

use portclaim_core::ports::{OwnerResolverPort, PortProbe};
use portclaim_core::{
    system_acquirer, AcquisitionOutcome, AcquisitionPlan, AcquisitionState, OwnerResolver,
    PortSpec, ReclaimPolicy, ReclaimStatus, TcpProbe,
};

fn fast_policy() -> ReclaimPolicy {
    ReclaimPolicy {
        grace_wait: Duration::from_millis(50),
        force_wait: Duration::from_millis(50),
        allow_elevation: false,
    }
}

/// A port nobody is listening on right now.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn local(port: u16) -> PortSpec {
    PortSpec::new("127.0.0.1", port).unwrap()
}

#[tokio::test]
async fn free_port_is_acquired_without_signals() {
    let plan = AcquisitionPlan::new(local(free_port())).with_policy(fast_policy());
    let result = system_acquirer(false).acquire(&plan).await;

    assert_eq!(result.outcome, AcquisitionOutcome::Acquired);
    assert_eq!(result.final_port, plan.preferred);
    assert_eq!(result.signals_sent(), 0);
    assert!(TcpProbe::new().is_bindable(&result.final_port).await);
}

#[tokio::test]
async fn held_port_falls_back_without_signals() {
    let holder = TcpListener::bind("127.0.0.1:0").unwrap();
    let busy = holder.local_addr().unwrap().port();
    let fallback = local(free_port());

    let plan = AcquisitionPlan::new(local(busy))
        .with_fallback(Some(fallback.clone()))
        .with_reclaim(false)
        .with_policy(fast_policy());
    let result = system_acquirer(false).acquire(&plan).await;

    assert_eq!(result.outcome, AcquisitionOutcome::Fallback);
    assert_eq!(result.final_port, fallback);
    assert_eq!(
        result.transitions,
        vec![
            AcquisitionState::Probing,
            AcquisitionState::Busy,
            AcquisitionState::Fallback
        ]
    );
    assert_eq!(result.signals_sent(), 0);
    drop(holder);
}

#[tokio::test]
async fn port_held_by_this_process_is_never_acquired() {
    // Our own PID is excluded from the owner set, so reclamation finds
    // nobody to signal and never escalates. The final probe must still see
    // the port as busy.
    let holder = TcpListener::bind("127.0.0.1:0").unwrap();
    let busy = holder.local_addr().unwrap().port();

    let plan = AcquisitionPlan::new(local(busy)).with_policy(fast_policy());
    let result = system_acquirer(false).acquire(&plan).await;

    assert_eq!(result.outcome, AcquisitionOutcome::Failed);
    // The exact status depends on which facilities this host has
    assert_ne!(result.reclaim_status, Some(ReclaimStatus::Reclaimed));
    assert_eq!(result.signals_sent(), 0);
    assert_eq!(result.final_port.port(), busy);
    drop(holder);
}

#[tokio::test]
async fn resolver_never_reports_itself() {
    let holder = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let owners = OwnerResolver::new().find_owners(port).await;
    assert!(!owners.contains(std::process::id()));
    drop(holder);
}

#[cfg(unix)]
#[tokio::test]
async fn child_listener_is_reclaimed() {
    use std::process::{Command, Stdio};

    let port = free_port();
    let script = format!(
        "import socket,time\ns=socket.socket()\ns.setsockopt(socket.SOL_SOCKET,socket.SO_REUSEADDR,1)\ns.bind(('127.0.0.1',{}))\ns.listen()\ntime.sleep(60)\n",
        port
    );
    let Ok(mut child) = Command::new("python3")
        .arg("-c")
        .arg(&script)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    else {
        eprintln!("skipping child_listener_is_reclaimed: python3 is not available");
        return;
    };

    let spec = local(port);
    let probe = TcpProbe::new();
    let mut listening = false;
    for _ in 0..100 {
        if !probe.is_bindable(&spec).await {
            listening = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    if !listening {
        eprintln!("skipping child_listener_is_reclaimed: child never bound port {}", port);
        let _ = child.kill();
        let _ = child.wait();
        return;
    }

    // Introspection may be missing in minimal containers
    if OwnerResolver::new().find_owners(port).await.is_empty() {
        eprintln!("skipping child_listener_is_reclaimed: no introspection facility sees the child");
        let _ = child.kill();
        let _ = child.wait();
        return;
    }

    let plan = AcquisitionPlan::new(spec).with_policy(fast_policy());
    let result = system_acquirer(false).acquire(&plan).await;

    assert_eq!(result.outcome, AcquisitionOutcome::Acquired);
    assert_eq!(result.reclaim_status, Some(ReclaimStatus::Reclaimed));
    assert!(result.signals_sent() >= 1);
    let _ = child.wait();
}

#[test]
fn probe_works_outside_an_async_context() {
    let spec = local(free_port());
    assert!(tokio_test::block_on(TcpProbe::new().is_bindable(&spec)));
}
