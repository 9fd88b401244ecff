//! A simulated host for exercising the reclaimer and the state machine.
//!
//! One shared port table backs a fake probe, resolver and signaller, so
//! signals sent through the signaller change what the probe sees next.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::{PortAcquirer, Reclaimer};
use crate::domain::{Discovery, Owners, PortSpec, Privilege, SignalKind};
use crate::error::{Error, Result};
use crate::ports::{OwnerResolverPort, PortProbe, SignalSender};

/// How a simulated process reacts to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// Exits on SIGTERM.
    ExitOnTerm,
    /// Ignores SIGTERM, dies on SIGKILL.
    ExitOnKill,
    /// Owned by another user: normal signals are refused, elevated ones work.
    ForeignUser,
    /// Normal signals refused; elevated SIGKILL fails too.
    Unkillable,
    /// Stale entry: reported by introspection but already gone.
    Vanished,
    /// Owned by another user and invisible to unprivileged introspection.
    Hidden,
    /// Holds the port and no lookup ever reports it.
    Phantom,
}

struct Listener {
    port: u16,
    pid: u32,
    behavior: Behavior,
    alive: bool,
}

impl Listener {
    fn holds(&self, port: u16) -> bool {
        self.port == port && self.alive && self.behavior != Behavior::Vanished
    }

    fn reported_on(&self, port: u16) -> bool {
        self.port == port
            && !matches!(self.behavior, Behavior::Hidden | Behavior::Phantom)
            && (self.alive || self.behavior == Behavior::Vanished)
    }

    fn reported_elevated_on(&self, port: u16) -> bool {
        self.port == port
            && self.behavior != Behavior::Phantom
            && (self.alive || self.behavior == Behavior::Vanished)
    }
}

struct HostState {
    listeners: Vec<Listener>,
    pending: Vec<Listener>,
    received: HashMap<u32, usize>,
    elevation: bool,
    introspection: bool,
    elevated_lookups: usize,
}

#[derive(Clone)]
pub(crate) struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
}

impl SimulatedHost {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                listeners: Vec::new(),
                pending: Vec::new(),
                received: HashMap::new(),
                elevation: false,
                introspection: true,
                elevated_lookups: 0,
            })),
        }
    }

    pub(crate) fn with_elevation(self, elevation: bool) -> Self {
        self.state.lock().elevation = elevation;
        self
    }

    pub(crate) fn without_introspection(self) -> Self {
        self.state.lock().introspection = false;
        self
    }

    pub(crate) fn listen(&self, port: u16, pid: u32, behavior: Behavior) {
        self.state.lock().listeners.push(Listener {
            port,
            pid,
            behavior,
            alive: true,
        });
    }

    /// Start listening as soon as the first SIGTERM goes out.
    pub(crate) fn listen_after_term(&self, port: u16, pid: u32, behavior: Behavior) {
        self.state.lock().pending.push(Listener {
            port,
            pid,
            behavior,
            alive: true,
        });
    }

    pub(crate) fn signals_received(&self, pid: u32) -> usize {
        self.state.lock().received.get(&pid).copied().unwrap_or(0)
    }

    pub(crate) fn total_signals(&self) -> usize {
        self.state.lock().received.values().sum()
    }

    pub(crate) fn elevated_lookups(&self) -> usize {
        self.state.lock().elevated_lookups
    }

    pub(crate) fn reclaimer(&self) -> Reclaimer<FakeResolver, FakeSignaller, FakeProbe> {
        Reclaimer::new(
            FakeResolver(self.clone()),
            FakeSignaller(self.clone()),
            FakeProbe(self.clone()),
        )
    }

    pub(crate) fn acquirer(&self) -> PortAcquirer<FakeResolver, FakeSignaller, FakeProbe> {
        PortAcquirer::new(self.reclaimer())
    }

    fn deliver(&self, pid: u32, signal: SignalKind, privilege: Privilege) -> Result<()> {
        let mut state = self.state.lock();
        *state.received.entry(pid).or_default() += 1;

        if signal == SignalKind::Terminate && !state.pending.is_empty() {
            let joined: Vec<Listener> = state.pending.drain(..).collect();
            state.listeners.extend(joined);
        }
        let elevation = state.elevation;

        let Some(listener) = state.listeners.iter_mut().find(|l| l.pid == pid) else {
            return Err(Error::ProcessNotFound(pid));
        };
        if !listener.alive || listener.behavior == Behavior::Vanished {
            return Err(Error::ProcessNotFound(pid));
        }

        let refused = || Error::PermissionDenied(format!("pid {} belongs to another user", pid));
        match (listener.behavior, privilege) {
            (Behavior::ExitOnTerm, _) => {
                listener.alive = false;
                Ok(())
            }
            (Behavior::ExitOnKill, _) => {
                if signal == SignalKind::Kill {
                    listener.alive = false;
                }
                Ok(())
            }
            (Behavior::ForeignUser | Behavior::Hidden, Privilege::Elevated) if elevation => {
                if signal == SignalKind::Kill {
                    listener.alive = false;
                }
                Ok(())
            }
            (Behavior::Unkillable, Privilege::Elevated) if elevation => {
                Err(Error::SignalDelivery {
                    pid,
                    reason: "process did not die".to_string(),
                })
            }
            (_, Privilege::Elevated) => {
                Err(Error::ElevationUnavailable("simulated host has no sudo".to_string()))
            }
            (
                Behavior::ForeignUser | Behavior::Unkillable | Behavior::Hidden | Behavior::Phantom,
                Privilege::Normal,
            ) => Err(refused()),
            (Behavior::Vanished, _) => Err(Error::ProcessNotFound(pid)),
        }
    }
}

pub(crate) struct FakeProbe(SimulatedHost);

impl PortProbe for FakeProbe {
    async fn is_bindable(&self, spec: &PortSpec) -> bool {
        let state = self.0.state.lock();
        !state.listeners.iter().any(|l| l.holds(spec.port()))
    }
}

pub(crate) struct FakeResolver(SimulatedHost);

impl OwnerResolverPort for FakeResolver {
    async fn find_owners(&self, port: u16) -> Owners {
        let state = self.0.state.lock();
        if !state.introspection {
            return Owners::none();
        }
        let pids: Vec<u32> = state
            .listeners
            .iter()
            .filter(|l| l.reported_on(port))
            .map(|l| l.pid)
            .collect();
        Owners::from_pids(Discovery::Lsof, pids, std::process::id())
    }

    async fn find_owners_elevated(&self, port: u16) -> Owners {
        let mut state = self.0.state.lock();
        state.elevated_lookups += 1;
        if !state.introspection || !state.elevation {
            return Owners::none();
        }
        let pids: Vec<u32> = state
            .listeners
            .iter()
            .filter(|l| l.reported_elevated_on(port))
            .map(|l| l.pid)
            .collect();
        Owners::from_pids(Discovery::Lsof, pids, std::process::id())
    }
}

pub(crate) struct FakeSignaller(SimulatedHost);

impl SignalSender for FakeSignaller {
    async fn send(&self, pid: u32, signal: SignalKind, privilege: Privilege) -> Result<()> {
        self.0.deliver(pid, signal, privilege)
    }

    fn can_elevate(&self) -> bool {
        self.0.state.lock().elevation
    }
}
