//! Signals sent while reclaiming a port, and the ordered log they form.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ProcessHandle;
use crate::error::Error;

// ============================================================================
// Signal / privilege
// ============================================================================

/// Which termination signal was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    /// SIGTERM: ask the process to exit.
    Terminate,
    /// SIGKILL: the kernel ends the process.
    Kill,
}

impl SignalKind {
    /// Signal name without the `SIG` prefix, as `kill -s` expects it.
    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::Terminate => "TERM",
            SignalKind::Kill => "KILL",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Privilege a signal was sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privilege {
    Normal,
    Elevated,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privilege::Normal => f.write_str("normal"),
            Privilege::Elevated => f.write_str("elevated"),
        }
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// What happened when a signal was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Delivery {
    Delivered,
    /// The process was already gone.
    AlreadyExited,
    PermissionDenied { reason: String },
    Failed { reason: String },
}

impl Delivery {
    /// Classify the result of a send.
    pub fn from_result(result: &std::result::Result<(), Error>) -> Self {
        match result {
            Ok(()) => Delivery::Delivered,
            Err(Error::ProcessNotFound(_)) => Delivery::AlreadyExited,
            Err(e) if e.is_permission_denied() => Delivery::PermissionDenied {
                reason: e.to_string(),
            },
            Err(e) => Delivery::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Delivered, or nothing left to deliver to.
    pub fn is_success(&self) -> bool {
        matches!(self, Delivery::Delivered | Delivery::AlreadyExited)
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Delivery::PermissionDenied { .. })
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Delivered => f.write_str("delivered"),
            Delivery::AlreadyExited => f.write_str("already exited"),
            Delivery::PermissionDenied { reason } => write!(f, "permission denied ({})", reason),
            Delivery::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

// ============================================================================
// Attempt log
// ============================================================================

/// One signal sent to one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclamationAttempt {
    pub target: ProcessHandle,
    pub signal_kind: SignalKind,
    pub issued_at: DateTime<Utc>,
    pub privilege: Privilege,
    pub delivery: Delivery,
}

impl fmt::Display for ReclamationAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} SIG{:<4} {:<8} pid={:<7} via={:<6} {}",
            self.issued_at.format("%H:%M:%S%.3f"),
            self.signal_kind,
            self.privilege,
            self.target.pid,
            self.target.discovered_via,
            self.delivery
        )
    }
}

/// Append-only, ordered record of every signal sent during one acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(transparent)]
pub struct AttemptLog {
    entries: Vec<ReclamationAttempt>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt at the current time.
    pub fn record(
        &mut self,
        target: ProcessHandle,
        signal_kind: SignalKind,
        privilege: Privilege,
        delivery: Delivery,
    ) -> &ReclamationAttempt {
        self.entries.push(ReclamationAttempt {
            target,
            signal_kind,
            issued_at: Utc::now(),
            privilege,
            delivery,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Append every entry of `other`, keeping order.
    pub fn append(&mut self, other: AttemptLog) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReclamationAttempt> {
        self.entries.iter()
    }

    /// Number of entries with the given signal and privilege.
    pub fn count(&self, signal_kind: SignalKind, privilege: Privilege) -> usize {
        self.entries
            .iter()
            .filter(|a| a.signal_kind == signal_kind && a.privilege == privilege)
            .count()
    }
}

impl<'a> IntoIterator for &'a AttemptLog {
    type Item = &'a ReclamationAttempt;
    type IntoIter = std::slice::Iter<'a, ReclamationAttempt>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for AttemptLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "  (no signals sent)");
        }
        for (i, attempt) in self.entries.iter().enumerate() {
            writeln!(f, "  {:>2}. {}", i + 1, attempt)?;
        }
        Ok(())
    }
}
