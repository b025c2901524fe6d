//! The workflow's transition table.
//!
//! Every phase change goes through [`transition`]; an edge that is not in the
//! table is an [`RepoGuardError::InvalidTransition`].

use std::fmt;

use repoguard_types::{Phase, RepoGuardError, Result};

/// What just happened, from the engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Resolved,
    GuardrailPassed,
    GuardrailFailed,
    Approved,
    Cancelled,
    Dispatched,
    Aggregated,
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseEvent::Resolved => "resolved",
            PhaseEvent::GuardrailPassed => "guardrail_passed",
            PhaseEvent::GuardrailFailed => "guardrail_failed",
            PhaseEvent::Approved => "approved",
            PhaseEvent::Cancelled => "cancelled",
            PhaseEvent::Dispatched => "dispatched",
            PhaseEvent::Aggregated => "aggregated",
        };
        f.write_str(s)
    }
}

pub fn transition(from: Phase, event: PhaseEvent) -> Result<Phase> {
    use Phase::*;
    use PhaseEvent as E;
    let next = match (from, event) {
        (Resolving, E::Resolved) => RiskChecking,
        (RiskChecking, E::GuardrailFailed) => Halted,
        (RiskChecking, E::GuardrailPassed) => AwaitingApproval,
        (AwaitingApproval, E::Approved) => Dispatching,
        (AwaitingApproval, E::Cancelled) => Cancelled,
        (Dispatching, E::Dispatched) => Aggregating,
        (Aggregating, E::Aggregated) => Done,
        _ => {
            return Err(RepoGuardError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            })
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut phase = Phase::Resolving;
        for event in [
            PhaseEvent::Resolved,
            PhaseEvent::GuardrailPassed,
            PhaseEvent::Approved,
            PhaseEvent::Dispatched,
            PhaseEvent::Aggregated,
        ] {
            phase = transition(phase, event).unwrap();
        }
        assert_eq!(phase, Phase::Done);
    }

    #[test]
    fn guardrail_fail_halts() {
        assert_eq!(
            transition(Phase::RiskChecking, PhaseEvent::GuardrailFailed).unwrap(),
            Phase::Halted
        );
    }

    #[test]
    fn cancel_only_from_awaiting_approval() {
        assert_eq!(
            transition(Phase::AwaitingApproval, PhaseEvent::Cancelled).unwrap(),
            Phase::Cancelled
        );
        assert!(transition(Phase::Dispatching, PhaseEvent::Cancelled).is_err());
    }

    #[test]
    fn terminal_phases_absorb() {
        for phase in [Phase::Done, Phase::Halted, Phase::Cancelled] {
            for event in [
                PhaseEvent::Resolved,
                PhaseEvent::GuardrailPassed,
                PhaseEvent::Approved,
                PhaseEvent::Dispatched,
                PhaseEvent::Aggregated,
            ] {
                assert!(transition(phase, event).is_err(), "{phase} + {event}");
            }
        }
    }

    #[test]
    fn halted_cannot_reach_dispatching() {
        let err = transition(Phase::Halted, PhaseEvent::Approved).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transition from phase 'halted' on event 'approved'"
        );
    }
}
