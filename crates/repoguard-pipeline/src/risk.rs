//! Risk gate: a pure classification of the resolved targets.

use repoguard_types::{GuardrailStatus, RiskLevel, StateUpdate};

use crate::phase::PhaseEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskVerdict {
    pub status: GuardrailStatus,
    pub level: Option<RiskLevel>,
    pub reason: Option<String>,
    pub error: Option<String>,
    /// Targets containing a sensitive signal, in target order.
    pub flagged: Vec<String>,
}

impl RiskVerdict {
    pub fn into_update(self) -> StateUpdate {
        StateUpdate {
            guardrail_status: Some(self.status),
            risk_level: self.level,
            risk_reason: self.reason,
            error_message: self.error,
            flagged_files: Some(self.flagged),
            ..StateUpdate::default()
        }
    }
}

/// Evaluate the rules in order: empty input fails, any sensitive target makes
/// the run high risk, anything else is normal. Signals match case-sensitively
/// anywhere in the path.
pub fn evaluate<S: AsRef<str>>(targets: &[String], signals: &[S]) -> RiskVerdict {
    if targets.is_empty() {
        return RiskVerdict {
            status: GuardrailStatus::Fail,
            level: None,
            reason: None,
            error: Some("No files found to scan.".into()),
            flagged: Vec::new(),
        };
    }

    let flagged: Vec<String> = targets
        .iter()
        .filter(|t| signals.iter().any(|s| t.contains(s.as_ref())))
        .cloned()
        .collect();

    if flagged.is_empty() {
        RiskVerdict {
            status: GuardrailStatus::Pass,
            level: Some(RiskLevel::Normal),
            reason: Some("Standard code scan".into()),
            error: None,
            flagged,
        }
    } else {
        RiskVerdict {
            status: GuardrailStatus::Pass,
            level: Some(RiskLevel::High),
            reason: Some(format!(
                "Sensitive files detected: {}",
                flagged.join(", ")
            )),
            error: None,
            flagged,
        }
    }
}

/// Routing after the gate: fail halts, pass (any level) goes to approval.
pub fn route(status: GuardrailStatus) -> PhaseEvent {
    match status {
        GuardrailStatus::Fail => PhaseEvent::GuardrailFailed,
        GuardrailStatus::Pass => PhaseEvent::GuardrailPassed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNALS: &[&str] = &[".env", "secrets", "credentials", "key.pem", "id_rsa"];

    fn targets(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_targets_fail() {
        let v = evaluate::<&str>(&[], SIGNALS);
        assert_eq!(v.status, GuardrailStatus::Fail);
        assert!(v.error.is_some());
        assert_eq!(route(v.status), PhaseEvent::GuardrailFailed);
    }

    #[test]
    fn sensitive_targets_are_high_risk() {
        let t = targets(&["repo/app.py", "repo/.env", "repo/config/secrets.json"]);
        let v = evaluate(&t, SIGNALS);
        assert_eq!(v.status, GuardrailStatus::Pass);
        assert_eq!(v.level, Some(RiskLevel::High));
        assert_eq!(v.flagged, vec!["repo/.env", "repo/config/secrets.json"]);
        assert!(v.reason.unwrap().contains("repo/.env"));
        assert_eq!(route(v.status), PhaseEvent::GuardrailPassed);
    }

    #[test]
    fn signals_are_case_sensitive() {
        let v = evaluate(&targets(&["repo/SECRETS.md", "repo/.ENV"]), SIGNALS);
        assert_eq!(v.level, Some(RiskLevel::Normal));
        assert!(v.flagged.is_empty());
    }

    #[test]
    fn evaluation_is_pure() {
        let t = targets(&["a/id_rsa", "b/main.py"]);
        let before = t.clone();
        let first = evaluate(&t, SIGNALS);
        let second = evaluate(&t, SIGNALS);
        assert_eq!(first, second);
        assert_eq!(t, before);
    }

    #[test]
    fn update_carries_verdict() {
        let v = evaluate(&targets(&["x/.env"]), SIGNALS);
        let update = v.into_update();
        assert_eq!(update.guardrail_status, Some(GuardrailStatus::Pass));
        assert_eq!(update.risk_level, Some(RiskLevel::High));
        assert_eq!(update.flagged_files, Some(vec!["x/.env".to_string()]));
        assert!(update.target_files.is_none());
    }
}
