//! Processes observed to own a port.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// The introspection facility that reported a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Discovery {
    /// `lsof -t -iTCP:<port> -sTCP:LISTEN`
    Lsof,
    /// `ss -Htlnp`
    SocketStats,
    /// `/proc/net/tcp*` joined with `/proc/<pid>/fd`
    ProcFs,
    /// No facility was usable.
    #[default]
    None,
}

impl Discovery {
    /// Short label used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Discovery::Lsof => "lsof",
            Discovery::SocketStats => "ss",
            Discovery::ProcFs => "procfs",
            Discovery::None => "none",
        }
    }
}

impl fmt::Display for Discovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A foreign process seen listening on a port.
///
/// This is a back-reference for signaling only. Holding one does not keep
/// the process alive, and the PID may be reused by the time it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHandle {
    pub pid: u32,
    pub discovered_via: Discovery,
}

/// Deduplicated owners of a port, plus the facility that found them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Owners {
    discovered_via: Discovery,
    pids: BTreeSet<u32>,
    held_by_self: bool,
}

impl Owners {
    /// Empty result from a host with no usable facility.
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from raw PIDs. Zero and `exclude` (normally our own PID) are dropped.
    pub fn from_pids(
        discovered_via: Discovery,
        pids: impl IntoIterator<Item = u32>,
        exclude: u32,
    ) -> Self {
        let mut held_by_self = false;
        let pids = pids
            .into_iter()
            .filter(|&pid| {
                held_by_self |= pid == exclude;
                pid != 0 && pid != exclude
            })
            .collect();
        Self {
            discovered_via,
            pids,
            held_by_self,
        }
    }

    pub fn discovered_via(&self) -> Discovery {
        self.discovered_via
    }

    /// The excluded PID (normally ours) was among the listeners.
    pub fn held_by_self(&self) -> bool {
        self.held_by_self
    }

    /// Whether any facility answered, even if it saw nobody.
    pub fn was_observed(&self) -> bool {
        self.discovered_via != Discovery::None
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }

    /// PIDs in ascending order.
    pub fn pids(&self) -> impl Iterator<Item = u32> + '_ {
        self.pids.iter().copied()
    }

    pub fn handles(&self) -> impl Iterator<Item = ProcessHandle> + '_ {
        let via = self.discovered_via;
        self.pids.iter().map(move |&pid| ProcessHandle {
            pid,
            discovered_via: via,
        })
    }
}
