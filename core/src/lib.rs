//! portclaim Core Library
//!
//! Guarantees a TCP port is free before a service starts on it.
//! Provides functionality to:
//! - Probe whether a port is bindable
//! - Find the processes listening on a port (`lsof`, `ss`, `/proc`)
//! - Reclaim a busy port with escalating signals (TERM, KILL, elevated KILL)
//! - Fall back to an alternate port when reclamation is not allowed or fails
//! - Start the dependent service detached from the invoking session
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: Host implementations
//! - `application`: The reclaimer and the acquisition state machine
//!
//! # Platform Support
//! - Linux: `lsof`, then `ss`, then `/proc/net/tcp*`
//! - macOS: `lsof`
//! - Signals and detached launch require a Unix host

// Hexagonal architecture layers
pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub mod config;
pub mod error;

#[cfg(test)]
pub(crate) mod testing;

// Re-export domain types (primary API)
pub use domain::{
    AcquisitionOutcome, AcquisitionResult, AcquisitionState, AttemptLog, Delivery, Discovery,
    Owners, PortSpec, Privilege, ProcessHandle, ReclaimStatus, ReclamationAttempt, SignalKind,
    UnresolvedReason,
};

// Re-export other commonly used types
pub use adapters::{OutputSink, OwnerResolver, ServiceCommand, ServiceLauncher, TcpProbe, UnixSignaller};
pub use application::{AcquisitionPlan, PortAcquirer, ReclaimPolicy, ReclaimReport, Reclaimer};
pub use config::{AcquisitionConfig, ConfigStore};
pub use error::{Error, Result};

/// Acquirer wired to the real host.
pub type SystemAcquirer = PortAcquirer<OwnerResolver, UnixSignaller, TcpProbe>;

/// Build an acquirer over the host's introspection tools, `kill(2)` and sudo.
///
/// With `allow_elevation` false the signaller never looks for sudo, so a
/// refused kill is reported as permission denied instead of being retried.
pub fn system_acquirer(allow_elevation: bool) -> SystemAcquirer {
    let (resolver, signaller) = if allow_elevation {
        (OwnerResolver::new(), UnixSignaller::new())
    } else {
        (OwnerResolver::without_elevation(), UnixSignaller::without_elevation())
    };
    PortAcquirer::new(Reclaimer::new(resolver, signaller, TcpProbe::new()))
}
