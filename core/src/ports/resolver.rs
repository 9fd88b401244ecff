//! Owner resolution ports (interfaces).

use crate::domain::{Discovery, Owners};
use crate::error::Result;

/// Port for finding the processes listening on a TCP port.
///
/// Implementations never fail: a host with no usable facility yields
/// [`Owners::none`].
pub trait OwnerResolverPort: Send + Sync {
    /// Deduplicated owners of `port`, excluding the calling process.
    fn find_owners(&self, port: u16) -> impl std::future::Future<Output = Owners> + Send;

    /// Like [`find_owners`](Self::find_owners), but with elevated privilege,
    /// so listeners owned by other users are visible.
    ///
    /// Empty when elevation is not available. Only called after an
    /// unprivileged lookup came back empty for a port that is still bound.
    fn find_owners_elevated(&self, port: u16)
        -> impl std::future::Future<Output = Owners> + Send;
}

/// One introspection facility (lsof, ss, /proc, ...).
///
/// Returning [`crate::Error::IntrospectionUnavailable`] tells the resolver to
/// move on to the next facility.
pub trait IntrospectionBackend: Send + Sync {
    /// Which facility this is, for the owner set and the attempt log.
    fn facility(&self) -> Discovery;

    /// Raw PIDs listening on `port`. May contain duplicates.
    fn listening_pids(
        &self,
        port: u16,
    ) -> impl std::future::Future<Output = Result<Vec<u32>>> + Send;
}
