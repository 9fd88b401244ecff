//! Owner resolution adapters.
//!
//! Each facility is an [`IntrospectionBackend`]; [`OwnerResolver`] tries them
//! in order and turns whatever it gets into a deduplicated [`Owners`] set.

mod lsof;
mod procfs;
mod ss;
mod utils;

pub use lsof::LsofBackend;
pub use procfs::ProcFsBackend;
pub use ss::SsBackend;

use tracing::{debug, info, warn};

use crate::adapters::exec::{find_sudo, running_as_root};
use crate::domain::{Discovery, Owners};
use crate::error::Result;
use crate::ports::{IntrospectionBackend, OwnerResolverPort};

/// The facilities available on a stock host, as one type.
pub enum SystemBackend {
    Lsof(LsofBackend),
    Ss(SsBackend),
    ProcFs(ProcFsBackend),
}

impl SystemBackend {
    /// Backends in preference order for the current platform.
    pub fn platform_defaults() -> Vec<SystemBackend> {
        let mut backends = vec![
            SystemBackend::Lsof(LsofBackend::new()),
            SystemBackend::Ss(SsBackend::new()),
        ];
        if cfg!(target_os = "linux") {
            backends.push(SystemBackend::ProcFs(ProcFsBackend::new()));
        }
        backends
    }
}

impl IntrospectionBackend for SystemBackend {
    fn facility(&self) -> Discovery {
        match self {
            SystemBackend::Lsof(b) => b.facility(),
            SystemBackend::Ss(b) => b.facility(),
            SystemBackend::ProcFs(b) => b.facility(),
        }
    }

    async fn listening_pids(&self, port: u16) -> Result<Vec<u32>> {
        match self {
            SystemBackend::Lsof(b) => b.listening_pids(port).await,
            SystemBackend::Ss(b) => b.listening_pids(port).await,
            SystemBackend::ProcFs(b) => b.listening_pids(port).await,
        }
    }
}

/// Resolves port owners by asking each backend in turn.
///
/// The first backend that names at least one owner wins. A backend that
/// works but sees nobody does not end the search, since unprivileged
/// facilities differ in what they can see. When every usable backend comes
/// back empty, the result is empty and tagged with the first one that
/// answered; when none is usable it is tagged [`Discovery::None`].
///
/// An optional elevated backend serves
/// [`OwnerResolverPort::find_owners_elevated`].
pub struct OwnerResolver<B = SystemBackend> {
    backends: Vec<B>,
    elevated: Option<B>,
    own_pid: u32,
}

impl OwnerResolver<SystemBackend> {
    /// Resolver over the platform's default facilities.
    ///
    /// Unless already root, `sudo -n lsof` is kept as the elevated backend
    /// when sudo is installed. As root the normal backends already see
    /// every socket.
    pub fn new() -> Self {
        let resolver = Self::with_backends(SystemBackend::platform_defaults());
        if running_as_root() {
            return resolver;
        }
        match find_sudo() {
            Some(sudo) => resolver.with_elevated(SystemBackend::Lsof(LsofBackend::new().via_sudo(sudo))),
            None => resolver,
        }
    }

    /// Resolver that never runs introspection through sudo.
    pub fn without_elevation() -> Self {
        Self::with_backends(SystemBackend::platform_defaults())
    }
}

impl Default for OwnerResolver<SystemBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: IntrospectionBackend> OwnerResolver<B> {
    /// Resolver over custom backends, tried in the given order.
    pub fn with_backends(backends: Vec<B>) -> Self {
        Self {
            backends,
            elevated: None,
            own_pid: std::process::id(),
        }
    }

    /// Backend used for elevated lookups.
    pub fn with_elevated(mut self, backend: B) -> Self {
        self.elevated = Some(backend);
        self
    }

    pub fn can_elevate(&self) -> bool {
        self.elevated.is_some()
    }

    /// Treat `pid` as "self" and never report it (for testing).
    pub fn excluding(mut self, pid: u32) -> Self {
        self.own_pid = pid;
        self
    }
}

impl<B: IntrospectionBackend> OwnerResolverPort for OwnerResolver<B> {
    async fn find_owners(&self, port: u16) -> Owners {
        let mut first_answer: Option<Discovery> = None;
        let mut saw_self = false;

        for backend in &self.backends {
            let facility = backend.facility();
            match backend.listening_pids(port).await {
                Ok(pids) => {
                    let owners = Owners::from_pids(facility, pids, self.own_pid);
                    debug!(port, facility = %facility, owners = owners.len(), "Introspection answered");
                    if !owners.is_empty() {
                        return owners;
                    }
                    saw_self |= owners.held_by_self();
                    first_answer.get_or_insert(facility);
                }
                Err(e) => {
                    debug!(port, facility = %facility, error = %e, "Introspection unavailable");
                }
            }
        }

        match first_answer {
            Some(facility) => {
                let seen = saw_self.then_some(self.own_pid);
                Owners::from_pids(facility, seen, self.own_pid)
            }
            None => Owners::none(),
        }
    }

    async fn find_owners_elevated(&self, port: u16) -> Owners {
        let Some(backend) = &self.elevated else {
            debug!(port, "No elevated introspection available");
            return Owners::none();
        };

        let facility = backend.facility();
        match backend.listening_pids(port).await {
            Ok(pids) => {
                let owners = Owners::from_pids(facility, pids, self.own_pid);
                info!(port, facility = %facility, owners = owners.len(), "Elevated introspection answered");
                owners
            }
            Err(e) => {
                warn!(port, facility = %facility, error = %e, "Elevated introspection unavailable");
                Owners::none()
            }
        }
    }
}
