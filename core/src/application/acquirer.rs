//! The acquisition state machine.

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::reclaimer::{ReclaimPolicy, Reclaimer};
use crate::domain::{
    AcquisitionOutcome, AcquisitionResult, AcquisitionState, AttemptLog, PortSpec, ReclaimStatus,
};
use crate::ports::{OwnerResolverPort, PortProbe, SignalSender};

/// What to acquire and how hard to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionPlan {
    pub preferred: PortSpec,
    pub fallback: Option<PortSpec>,
    pub allow_reclaim: bool,
    pub reclaim: ReclaimPolicy,
}

impl AcquisitionPlan {
    /// Reclaim allowed, no fallback, default waits.
    pub fn new(preferred: PortSpec) -> Self {
        Self {
            preferred,
            fallback: None,
            allow_reclaim: true,
            reclaim: ReclaimPolicy::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: Option<PortSpec>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_reclaim(mut self, allow_reclaim: bool) -> Self {
        self.allow_reclaim = allow_reclaim;
        self
    }

    pub fn with_policy(mut self, policy: ReclaimPolicy) -> Self {
        self.reclaim = policy;
        self
    }
}

/// Visited states, checked against the transition table.
struct StateTrail(Vec<AcquisitionState>);

impl StateTrail {
    fn new() -> Self {
        Self(vec![AcquisitionState::Probing])
    }

    fn current(&self) -> AcquisitionState {
        self.0.last().copied().unwrap_or(AcquisitionState::Probing)
    }

    fn advance(&mut self, next: AcquisitionState) {
        let from = self.current();
        debug_assert!(
            from.can_transition_to(next),
            "illegal transition {} -> {}",
            from,
            next
        );
        debug!(from = %from, to = %next, "State transition");
        self.0.push(next);
    }

    fn into_inner(self) -> Vec<AcquisitionState> {
        self.0
    }
}

/// Drives one preferred port through probe, reclaim and fallback.
///
/// The acquirer remembers the last usable result it handed out, together
/// with the plan that produced it. Asking again with an identical plan
/// returns that result without probing or signaling; any change to the plan
/// runs again. [`PortAcquirer::release`] forgets it.
pub struct PortAcquirer<R, S, P> {
    reclaimer: Reclaimer<R, S, P>,
    claimed: Mutex<Option<(AcquisitionPlan, AcquisitionResult)>>,
}

impl<R, S, P> PortAcquirer<R, S, P>
where
    R: OwnerResolverPort,
    S: SignalSender,
    P: PortProbe,
{
    pub fn new(reclaimer: Reclaimer<R, S, P>) -> Self {
        Self {
            reclaimer,
            claimed: Mutex::new(None),
        }
    }

    pub fn reclaimer(&self) -> &Reclaimer<R, S, P> {
        &self.reclaimer
    }

    /// The result currently held, if any.
    pub fn claimed(&self) -> Option<AcquisitionResult> {
        self.claimed.lock().as_ref().map(|(_, held)| held.clone())
    }

    /// Forget the held result so the next `acquire` runs from scratch.
    pub fn release(&self) -> Option<AcquisitionResult> {
        self.claimed.lock().take().map(|(_, held)| held)
    }

    /// Run the state machine for `plan`.
    pub async fn acquire(&self, plan: &AcquisitionPlan) -> AcquisitionResult {
        if let Some(held) = self.memo_for(plan) {
            info!(port = plan.preferred.port(), run_id = %held.run_id, "Port already acquired by this run");
            return held;
        }

        let result = self.run(plan).await;
        if result.outcome.is_usable() {
            *self.claimed.lock() = Some((plan.clone(), result.clone()));
        }
        result
    }

    fn memo_for(&self, plan: &AcquisitionPlan) -> Option<AcquisitionResult> {
        self.claimed
            .lock()
            .as_ref()
            .filter(|(held_plan, _)| held_plan == plan)
            .map(|(_, held)| held.clone())
    }

    async fn run(&self, plan: &AcquisitionPlan) -> AcquisitionResult {
        let run_id = Uuid::new_v4();
        let probe = self.reclaimer.probe();
        let mut trail = StateTrail::new();

        debug!(run_id = %run_id, addr = %plan.preferred, "Probing preferred port");
        if probe.is_bindable(&plan.preferred).await {
            trail.advance(AcquisitionState::Acquired);
            return finish(run_id, plan, AcquisitionOutcome::Acquired, None, trail, AttemptLog::new());
        }
        trail.advance(AcquisitionState::Busy);

        if !plan.allow_reclaim {
            info!(port = plan.preferred.port(), "Port busy and reclamation is disabled");
            let outcome = self.fall_back(plan).await;
            trail.advance(outcome.into());
            return finish(run_id, plan, outcome, None, trail, AttemptLog::new());
        }

        trail.advance(AcquisitionState::Reclaiming);
        let report = self.reclaimer.reclaim(&plan.preferred, &plan.reclaim).await;

        // Never trust the report alone; the port table may have moved again.
        let outcome = if probe.is_bindable(&plan.preferred).await {
            AcquisitionOutcome::Acquired
        } else {
            if report.status == ReclaimStatus::AlreadyFree {
                warn!(port = plan.preferred.port(), "No owner found but the port is still bound");
            }
            self.fall_back(plan).await
        };
        trail.advance(outcome.into());
        finish(run_id, plan, outcome, Some(report.status), trail, report.attempts)
    }

    /// FALLBACK if a fallback is configured and bindable right now, else FAILED.
    async fn fall_back(&self, plan: &AcquisitionPlan) -> AcquisitionOutcome {
        match &plan.fallback {
            Some(fallback) if self.reclaimer.probe().is_bindable(fallback).await => {
                AcquisitionOutcome::Fallback
            }
            Some(fallback) => {
                warn!(addr = %fallback, "Fallback port is not bindable either");
                AcquisitionOutcome::Failed
            }
            None => AcquisitionOutcome::Failed,
        }
    }
}

fn finish(
    run_id: Uuid,
    plan: &AcquisitionPlan,
    outcome: AcquisitionOutcome,
    reclaim_status: Option<ReclaimStatus>,
    trail: StateTrail,
    attempts: AttemptLog,
) -> AcquisitionResult {
    let final_port = match (outcome, &plan.fallback) {
        (AcquisitionOutcome::Fallback, Some(fallback)) => fallback.clone(),
        _ => plan.preferred.clone(),
    };
    let result = AcquisitionResult {
        run_id,
        outcome,
        preferred_port: plan.preferred.clone(),
        final_port,
        reclaim_status,
        transitions: trail.into_inner(),
        attempts,
    };
    match outcome {
        AcquisitionOutcome::Failed => {
            warn!(run_id = %run_id, signals = result.signals_sent(), "{}", result.summary())
        }
        _ => info!(run_id = %run_id, signals = result.signals_sent(), "{}", result.summary()),
    }
    result
}
