//! Port probe port (interface).

use crate::domain::PortSpec;

/// Port for checking whether a TCP port can be bound right now.
///
/// The answer is a snapshot of shared host state. Callers probe again
/// immediately before acting instead of reusing an earlier answer.
pub trait PortProbe: Send + Sync {
    /// True only if a listening socket could be bound on `spec` and released.
    ///
    /// Bind failures of any kind yield `false`; they are never fatal.
    fn is_bindable(&self, spec: &PortSpec) -> impl std::future::Future<Output = bool> + Send;
}
