//! Outcomes of reclamation and of the acquisition state machine.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use super::{AttemptLog, PortSpec};

// ============================================================================
// Reclamation
// ============================================================================

/// Why a reclamation ended without freeing the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvedReason {
    /// Signals went out but something still holds the port.
    StillBound,
    /// A kill was refused, or the owner could not even be seen, and
    /// elevation was disabled or unavailable.
    PermissionDenied,
    /// The port is bound but no owner is visible, even with elevation.
    OwnerHidden,
}

/// Result of one `reclaim` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum ReclaimStatus {
    /// No owners were found; nothing was signaled.
    AlreadyFree,
    /// A post-signal probe found the port bindable.
    Reclaimed,
    Unresolved(UnresolvedReason),
}

impl fmt::Display for ReclaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReclaimStatus::AlreadyFree => f.write_str("already free"),
            ReclaimStatus::Reclaimed => f.write_str("reclaimed"),
            ReclaimStatus::Unresolved(UnresolvedReason::StillBound) => {
                f.write_str("unresolved: port still bound")
            }
            ReclaimStatus::Unresolved(UnresolvedReason::PermissionDenied) => {
                f.write_str("unresolved: permission denied")
            }
            ReclaimStatus::Unresolved(UnresolvedReason::OwnerHidden) => {
                f.write_str("unresolved: owner not visible")
            }
        }
    }
}

// ============================================================================
// Acquisition
// ============================================================================

/// States of the acquisition state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquisitionState {
    Probing,
    Busy,
    Reclaiming,
    Acquired,
    Fallback,
    Failed,
}

impl AcquisitionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcquisitionState::Acquired | AcquisitionState::Fallback | AcquisitionState::Failed
        )
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: AcquisitionState) -> bool {
        use AcquisitionState::*;
        matches!(
            (self, next),
            (Probing, Acquired)
                | (Probing, Busy)
                | (Busy, Reclaiming)
                | (Busy, Fallback)
                | (Busy, Failed)
                | (Reclaiming, Acquired)
                | (Reclaiming, Fallback)
                | (Reclaiming, Failed)
        )
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Probing => "PROBING",
            AcquisitionState::Busy => "BUSY",
            AcquisitionState::Reclaiming => "RECLAIMING",
            AcquisitionState::Acquired => "ACQUIRED",
            AcquisitionState::Fallback => "FALLBACK",
            AcquisitionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquisitionOutcome {
    Acquired,
    Fallback,
    Failed,
}

impl AcquisitionOutcome {
    /// Process exit code: 0 for ACQUIRED and FALLBACK, 1 for FAILED.
    pub fn exit_code(&self) -> i32 {
        match self {
            AcquisitionOutcome::Acquired | AcquisitionOutcome::Fallback => 0,
            AcquisitionOutcome::Failed => 1,
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, AcquisitionOutcome::Failed)
    }
}

impl From<AcquisitionOutcome> for AcquisitionState {
    fn from(outcome: AcquisitionOutcome) -> Self {
        match outcome {
            AcquisitionOutcome::Acquired => AcquisitionState::Acquired,
            AcquisitionOutcome::Fallback => AcquisitionState::Fallback,
            AcquisitionOutcome::Failed => AcquisitionState::Failed,
        }
    }
}

/// Everything an acquisition produced.
///
/// On FAILED, `final_port` is the preferred port that could not be freed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionResult {
    pub run_id: Uuid,
    pub outcome: AcquisitionOutcome,
    pub preferred_port: PortSpec,
    pub final_port: PortSpec,
    pub reclaim_status: Option<ReclaimStatus>,
    pub transitions: Vec<AcquisitionState>,
    pub attempts: AttemptLog,
}

impl AcquisitionResult {
    pub fn signals_sent(&self) -> usize {
        self.attempts.len()
    }

    /// One-line status for the operator.
    pub fn summary(&self) -> String {
        match self.outcome {
            AcquisitionOutcome::Acquired => format!("acquired {}", self.final_port),
            AcquisitionOutcome::Fallback => format!(
                "preferred {} unavailable; using fallback {}",
                self.preferred_port, self.final_port
            ),
            AcquisitionOutcome::Failed => match self.reclaim_status {
                Some(ReclaimStatus::Unresolved(UnresolvedReason::PermissionDenied)) => format!(
                    "could not free {}: owner belongs to another user and elevation is \
                     disabled or unavailable (allow elevation, or run as root)",
                    self.preferred_port
                ),
                Some(ReclaimStatus::Unresolved(UnresolvedReason::OwnerHidden)) => format!(
                    "could not free {}: it is bound but no owning process is visible, \
                     even with elevation",
                    self.preferred_port
                ),
                _ => format!("could not acquire {}", self.preferred_port),
            },
        }
    }
}

impl fmt::Display for AcquisitionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.outcome_label(), self.summary())?;
        let path: Vec<String> = self.transitions.iter().map(|s| s.to_string()).collect();
        writeln!(f, "  states: {}", path.join(" -> "))?;
        if let Some(status) = self.reclaim_status {
            writeln!(f, "  reclamation: {}", status)?;
        }
        writeln!(f, "  attempts ({}):", self.attempts.len())?;
        write!(f, "{}", self.attempts)
    }
}

impl AcquisitionResult {
    fn outcome_label(&self) -> &'static str {
        match self.outcome {
            AcquisitionOutcome::Acquired => "ACQUIRED",
            AcquisitionOutcome::Fallback => "FALLBACK",
            AcquisitionOutcome::Failed => "FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(AcquisitionOutcome::Acquired.exit_code(), 0);
        assert_eq!(AcquisitionOutcome::Fallback.exit_code(), 0);
        assert_ne!(AcquisitionOutcome::Failed.exit_code(), 0);
    }

    #[test]
    fn test_transition_table() {
        use AcquisitionState::*;
        assert!(Probing.can_transition_to(Acquired));
        assert!(Probing.can_transition_to(Busy));
        assert!(Busy.can_transition_to(Reclaiming));
        assert!(Reclaiming.can_transition_to(Fallback));
        assert!(!Probing.can_transition_to(Reclaiming));
        assert!(!Acquired.can_transition_to(Probing));
        assert!(!Failed.can_transition_to(Acquired));
        assert!(Failed.is_terminal());
        assert!(!Busy.is_terminal());
    }

    #[test]
    fn test_failed_summary_mentions_permission() {
        let spec = PortSpec::new("127.0.0.1", 80).unwrap();
        let result = AcquisitionResult {
            run_id: Uuid::new_v4(),
            outcome: AcquisitionOutcome::Failed,
            preferred_port: spec.clone(),
            final_port: spec,
            reclaim_status: Some(ReclaimStatus::Unresolved(UnresolvedReason::PermissionDenied)),
            transitions: vec![
                AcquisitionState::Probing,
                AcquisitionState::Busy,
                AcquisitionState::Reclaiming,
                AcquisitionState::Failed,
            ],
            attempts: AttemptLog::new(),
        };
        assert!(result.summary().contains("elevation"));
        let text = result.to_string();
        assert!(text.starts_with("FAILED"));
        assert!(text.contains("PROBING -> BUSY -> RECLAIMING -> FAILED"));
    }

    #[test]
    fn test_hidden_owner_status_text() {
        let status = ReclaimStatus::Unresolved(UnresolvedReason::OwnerHidden);
        assert_eq!(status.to_string(), "unresolved: owner not visible");
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["status"], "unresolved");
        assert_eq!(json["reason"], "ownerHidden");
    }
}
