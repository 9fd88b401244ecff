//! Adapters layer - Host implementations of the port traits.
//!
//! This module contains implementations of the traits defined in `ports`,
//! plus the launcher that starts the dependent service.

pub(crate) mod exec;
pub mod launcher;
pub mod probe;
pub mod resolver;
pub mod signal;

// Re-export main types for convenience
pub use launcher::{OutputSink, ServiceCommand, ServiceLauncher};
pub use probe::TcpProbe;
pub use resolver::{LsofBackend, OwnerResolver, ProcFsBackend, SsBackend, SystemBackend};
pub use signal::UnixSignaller;
