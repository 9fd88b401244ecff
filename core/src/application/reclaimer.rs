//! Escalating reclamation of a busy port.
//!
//! The escalation runs as an explicit stage machine:
//!
//! ```text
//! Graceful --(still bound)--> Forced --(kill refused, may elevate)--> Elevated
//!     |                         |                                       |
//!  (bindable)                   +---------------> Settle <--------------+
//!     v                                             |
//! Reclaimed                          Reclaimed | Exhausted(reason)
//! ```
//!
//! Every signal sent here goes to a process this crate does not own. It is
//! destructive and irreversible; the owner's work in progress is lost.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::{
    AttemptLog, Delivery, Owners, PortSpec, Privilege, ProcessHandle, ReclaimStatus, SignalKind,
    UnresolvedReason,
};
use crate::ports::{OwnerResolverPort, PortProbe, SignalSender};

/// Default wait after SIGTERM before escalating.
pub const DEFAULT_GRACE_WAIT: Duration = Duration::from_millis(2000);

/// Default wait after SIGKILL before the final probe.
pub const DEFAULT_FORCE_WAIT: Duration = Duration::from_millis(1000);

/// Knobs for one reclamation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimPolicy {
    pub grace_wait: Duration,
    pub force_wait: Duration,
    pub allow_elevation: bool,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            grace_wait: DEFAULT_GRACE_WAIT,
            force_wait: DEFAULT_FORCE_WAIT,
            allow_elevation: true,
        }
    }
}

/// What a reclamation did and how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimReport {
    pub status: ReclaimStatus,
    pub attempts: AttemptLog,
}

/// Escalation stages.
#[derive(Debug)]
enum Stage {
    /// SIGTERM every owner at normal privilege, then wait the grace period.
    Graceful(Owners),
    /// Re-resolve and SIGKILL at normal privilege.
    Forced,
    /// SIGKILL with elevation, only for owners that refused a normal kill.
    Elevated(Vec<ProcessHandle>),
    /// Wait the force period and probe one last time.
    Settle { permission_blocked: bool },
    Done(ReclaimStatus),
}

/// Frees a port by signaling whoever holds it.
pub struct Reclaimer<R, S, P> {
    resolver: R,
    signaller: S,
    probe: P,
}

impl<R, S, P> Reclaimer<R, S, P>
where
    R: OwnerResolverPort,
    S: SignalSender,
    P: PortProbe,
{
    pub fn new(resolver: R, signaller: S, probe: P) -> Self {
        Self {
            resolver,
            signaller,
            probe,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Try to free `spec`'s port.
    ///
    /// Returns `AlreadyFree` without signaling anyone when no owner can be
    /// found and either no introspection facility works or the port probes
    /// free; the caller must still probe before trusting the port.
    ///
    /// When a facility answered but saw nobody while the port is still
    /// bound, the owner most likely belongs to another user. If elevation
    /// is allowed and available the owners are looked up again with
    /// elevated privilege and the escalation keeps using that view.
    pub async fn reclaim(&self, spec: &PortSpec, policy: &ReclaimPolicy) -> ReclaimReport {
        let mut log = AttemptLog::new();
        let mut elevated_view = false;

        let owners = self.resolver.find_owners(spec.port()).await;
        let mut stage = if !owners.is_empty() {
            Stage::Graceful(owners)
        } else if !owners.was_observed() {
            debug!(port = spec.port(), "No introspection facility answered");
            Stage::Done(ReclaimStatus::AlreadyFree)
        } else if self.probe.is_bindable(spec).await {
            debug!(port = spec.port(), via = %owners.discovered_via(), "No owners found");
            Stage::Done(ReclaimStatus::AlreadyFree)
        } else if owners.held_by_self() {
            warn!(port = spec.port(), "Port is held by this process");
            Stage::Done(ReclaimStatus::Unresolved(UnresolvedReason::StillBound))
        } else if policy.allow_elevation && self.signaller.can_elevate() {
            warn!(port = spec.port(), "Owner not visible, looking up with elevated privilege");
            let owners = self.resolver.find_owners_elevated(spec.port()).await;
            if owners.is_empty() {
                Stage::Done(ReclaimStatus::Unresolved(UnresolvedReason::OwnerHidden))
            } else {
                elevated_view = true;
                Stage::Graceful(owners)
            }
        } else {
            warn!(
                port = spec.port(),
                allowed = policy.allow_elevation,
                "Port bound by an invisible owner and elevation is not possible"
            );
            Stage::Done(ReclaimStatus::Unresolved(UnresolvedReason::PermissionDenied))
        };

        loop {
            stage = match stage {
                Stage::Graceful(owners) => {
                    info!(port = spec.port(), owners = owners.len(), "Asking owners to exit (SIGTERM)");
                    self.signal_all(owners.handles(), SignalKind::Terminate, Privilege::Normal, &mut log)
                        .await;
                    sleep(policy.grace_wait).await;

                    if self.probe.is_bindable(spec).await {
                        Stage::Done(ReclaimStatus::Reclaimed)
                    } else {
                        Stage::Forced
                    }
                }
                Stage::Forced => {
                    // The owner set may have changed while we waited.
                    let owners = if elevated_view {
                        self.resolver.find_owners_elevated(spec.port()).await
                    } else {
                        self.resolver.find_owners(spec.port()).await
                    };
                    warn!(port = spec.port(), owners = owners.len(), "Port still bound, sending SIGKILL");
                    let refused = self
                        .signal_all(owners.handles(), SignalKind::Kill, Privilege::Normal, &mut log)
                        .await;

                    if refused.is_empty() {
                        Stage::Settle { permission_blocked: false }
                    } else if policy.allow_elevation && self.signaller.can_elevate() {
                        Stage::Elevated(refused)
                    } else {
                        warn!(
                            port = spec.port(),
                            refused = refused.len(),
                            allowed = policy.allow_elevation,
                            "Kill refused and elevation is not possible"
                        );
                        Stage::Settle { permission_blocked: true }
                    }
                }
                Stage::Elevated(refused) => {
                    warn!(port = spec.port(), targets = refused.len(), "Retrying SIGKILL with elevated privilege");
                    let still_refused = self
                        .signal_all(refused.into_iter(), SignalKind::Kill, Privilege::Elevated, &mut log)
                        .await;
                    Stage::Settle {
                        permission_blocked: !still_refused.is_empty(),
                    }
                }
                Stage::Settle { permission_blocked } => {
                    sleep(policy.force_wait).await;
                    if self.probe.is_bindable(spec).await {
                        Stage::Done(ReclaimStatus::Reclaimed)
                    } else if permission_blocked {
                        Stage::Done(ReclaimStatus::Unresolved(UnresolvedReason::PermissionDenied))
                    } else {
                        Stage::Done(ReclaimStatus::Unresolved(UnresolvedReason::StillBound))
                    }
                }
                Stage::Done(status) => {
                    info!(port = spec.port(), status = %status, signals = log.len(), "Reclamation finished");
                    return ReclaimReport {
                        status,
                        attempts: log,
                    };
                }
            };
        }
    }

    /// Signal each target once, logging every attempt.
    ///
    /// Per-process failures never stop the batch. Returns the targets that
    /// refused for lack of permission.
    async fn signal_all(
        &self,
        targets: impl Iterator<Item = ProcessHandle>,
        signal: SignalKind,
        privilege: Privilege,
        log: &mut AttemptLog,
    ) -> Vec<ProcessHandle> {
        let mut refused = Vec::new();

        for target in targets {
            let result = self.signaller.send(target.pid, signal, privilege).await;
            let delivery = Delivery::from_result(&result);
            if delivery.is_permission_denied() {
                refused.push(target);
            }
            log.record(target, signal, privilege, delivery);
        }

        refused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behavior, SimulatedHost};

    fn fast() -> ReclaimPolicy {
        ReclaimPolicy {
            grace_wait: Duration::from_millis(5),
            force_wait: Duration::from_millis(5),
            allow_elevation: true,
        }
    }

    fn spec() -> PortSpec {
        PortSpec::new("127.0.0.1", 80).unwrap()
    }

    #[tokio::test]
    async fn test_no_owner_is_already_free() {
        let host = SimulatedHost::new();
        let reclaimer = host.reclaimer();
        let report = reclaimer.reclaim(&spec(), &fast()).await;
        assert_eq!(report.status, ReclaimStatus::AlreadyFree);
        assert!(report.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_hidden_owner_found_with_elevated_lookup() {
        let host = SimulatedHost::new().with_elevation(true);
        host.listen(80, 510, Behavior::Hidden);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(report.status, ReclaimStatus::Reclaimed);
        assert!(host.elevated_lookups() >= 1);
        assert!(report.attempts.iter().all(|a| a.target.pid == 510));
        let steps: Vec<_> = report
            .attempts
            .iter()
            .map(|a| (a.signal_kind, a.privilege))
            .collect();
        assert_eq!(
            steps,
            vec![
                (SignalKind::Terminate, Privilege::Normal),
                (SignalKind::Kill, Privilege::Normal),
                (SignalKind::Kill, Privilege::Elevated),
            ]
        );
    }

    #[tokio::test]
    async fn test_hidden_owner_without_elevation_is_permission_denied() {
        let host = SimulatedHost::new().with_elevation(false);
        host.listen(80, 511, Behavior::Hidden);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(
            report.status,
            ReclaimStatus::Unresolved(UnresolvedReason::PermissionDenied)
        );
        assert!(report.attempts.is_empty());
        assert_eq!(host.elevated_lookups(), 0);
    }

    #[tokio::test]
    async fn test_hidden_owner_elevation_disabled_by_policy() {
        let host = SimulatedHost::new().with_elevation(true);
        host.listen(80, 512, Behavior::Hidden);

        let policy = ReclaimPolicy {
            allow_elevation: false,
            ..fast()
        };
        let report = host.reclaimer().reclaim(&spec(), &policy).await;
        assert_eq!(
            report.status,
            ReclaimStatus::Unresolved(UnresolvedReason::PermissionDenied)
        );
        assert_eq!(host.elevated_lookups(), 0);
        assert_eq!(host.total_signals(), 0);
    }

    #[tokio::test]
    async fn test_owner_invisible_even_with_elevation() {
        let host = SimulatedHost::new().with_elevation(true);
        host.listen(80, 513, Behavior::Phantom);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(
            report.status,
            ReclaimStatus::Unresolved(UnresolvedReason::OwnerHidden)
        );
        assert_eq!(host.elevated_lookups(), 1);
        assert!(report.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_port_held_by_self_never_escalates() {
        let host = SimulatedHost::new().with_elevation(true);
        host.listen(80, std::process::id(), Behavior::ExitOnTerm);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(
            report.status,
            ReclaimStatus::Unresolved(UnresolvedReason::StillBound)
        );
        assert_eq!(host.elevated_lookups(), 0);
        assert_eq!(host.total_signals(), 0);
    }

    #[tokio::test]
    async fn test_no_facility_is_already_free_without_lookup() {
        let host = SimulatedHost::new().with_elevation(true).without_introspection();
        host.listen(80, 514, Behavior::ExitOnTerm);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(report.status, ReclaimStatus::AlreadyFree);
        assert_eq!(host.elevated_lookups(), 0);
        assert_eq!(host.total_signals(), 0);
    }

    #[tokio::test]
    async fn test_owner_exits_on_terminate() {
        let host = SimulatedHost::new();
        host.listen(80, 500, Behavior::ExitOnTerm);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(report.status, ReclaimStatus::Reclaimed);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts.count(SignalKind::Terminate, Privilege::Normal), 1);
    }

    #[tokio::test]
    async fn test_term_then_kill() {
        let host = SimulatedHost::new();
        host.listen(80, 501, Behavior::ExitOnKill);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(report.status, ReclaimStatus::Reclaimed);
        let signals: Vec<_> = report.attempts.iter().map(|a| a.signal_kind).collect();
        assert_eq!(signals, vec![SignalKind::Terminate, SignalKind::Kill]);
        assert!(report.attempts.iter().all(|a| a.privilege == Privilege::Normal));
    }

    #[tokio::test]
    async fn test_elevation_only_after_normal_refusal() {
        let host = SimulatedHost::new().with_elevation(true);
        host.listen(80, 502, Behavior::ForeignUser);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(report.status, ReclaimStatus::Reclaimed);

        let steps: Vec<_> = report
            .attempts
            .iter()
            .map(|a| (a.signal_kind, a.privilege))
            .collect();
        assert_eq!(
            steps,
            vec![
                (SignalKind::Terminate, Privilege::Normal),
                (SignalKind::Kill, Privilege::Normal),
                (SignalKind::Kill, Privilege::Elevated),
            ]
        );
        // The elevated attempt comes after the grace wait that followed SIGTERM
        let term_at = report.attempts.iter().next().unwrap().issued_at;
        let elevated_at = report.attempts.iter().last().unwrap().issued_at;
        assert!(elevated_at - term_at >= chrono::Duration::milliseconds(5));
    }

    #[tokio::test]
    async fn test_permission_denied_without_elevation() {
        let host = SimulatedHost::new().with_elevation(false);
        host.listen(80, 503, Behavior::ForeignUser);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(
            report.status,
            ReclaimStatus::Unresolved(UnresolvedReason::PermissionDenied)
        );
        assert_eq!(report.attempts.count(SignalKind::Kill, Privilege::Elevated), 0);
    }

    #[tokio::test]
    async fn test_elevation_disabled_by_policy() {
        let host = SimulatedHost::new().with_elevation(true);
        host.listen(80, 504, Behavior::ForeignUser);

        let policy = ReclaimPolicy {
            allow_elevation: false,
            ..fast()
        };
        let report = host.reclaimer().reclaim(&spec(), &policy).await;
        assert_eq!(
            report.status,
            ReclaimStatus::Unresolved(UnresolvedReason::PermissionDenied)
        );
        assert_eq!(host.signals_received(504), 2);
    }

    #[tokio::test]
    async fn test_unkillable_owner_is_still_bound() {
        let host = SimulatedHost::new().with_elevation(true);
        host.listen(80, 505, Behavior::Unkillable);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(
            report.status,
            ReclaimStatus::Unresolved(UnresolvedReason::StillBound)
        );
        let elevated: Vec<_> = report
            .attempts
            .iter()
            .filter(|a| a.privilege == Privilege::Elevated)
            .collect();
        assert_eq!(elevated.len(), 1);
        assert!(!elevated[0].delivery.is_success());
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let host = SimulatedHost::new();
        host.listen(80, 600, Behavior::Vanished);
        host.listen(80, 601, Behavior::ExitOnTerm);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(report.status, ReclaimStatus::Reclaimed);
        assert_eq!(report.attempts.len(), 2);
        let deliveries: Vec<_> = report.attempts.iter().map(|a| a.delivery.clone()).collect();
        assert_eq!(deliveries, vec![Delivery::AlreadyExited, Delivery::Delivered]);
    }

    #[tokio::test]
    async fn test_kill_targets_are_re_resolved() {
        let host = SimulatedHost::new();
        host.listen(80, 700, Behavior::ExitOnKill);
        // Joins the port after the first resolution; must receive the KILL too
        host.listen_after_term(80, 701, Behavior::ExitOnKill);

        let report = host.reclaimer().reclaim(&spec(), &fast()).await;
        assert_eq!(report.status, ReclaimStatus::Reclaimed);
        let killed: Vec<_> = report
            .attempts
            .iter()
            .filter(|a| a.signal_kind == SignalKind::Kill)
            .map(|a| a.target.pid)
            .collect();
        assert_eq!(killed, vec![700, 701]);
    }
}
