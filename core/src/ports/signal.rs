//! Signal delivery port (interface).

use crate::domain::{Privilege, SignalKind};
use crate::error::Result;

/// Port for sending termination signals to foreign processes.
///
/// Sending is destructive and cannot be undone; callers decide when.
pub trait SignalSender: Send + Sync {
    /// Send `signal` to `pid` with the given privilege.
    ///
    /// Expected errors: [`crate::Error::ProcessNotFound`] when the target is
    /// gone, [`crate::Error::PermissionDenied`] when the caller may not signal
    /// it, [`crate::Error::ElevationUnavailable`] when `Elevated` was asked for
    /// but cannot be obtained.
    fn send(
        &self,
        pid: u32,
        signal: SignalKind,
        privilege: Privilege,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Whether `Privilege::Elevated` can be used on this host.
    ///
    /// Must be cheap and must not prompt.
    fn can_elevate(&self) -> bool;
}
