//! The pipeline state object and the partial updates stages hand back to the engine.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{ResultRecord, Task};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Where a run currently sits in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Resolving,
    RiskChecking,
    AwaitingApproval,
    Dispatching,
    Aggregating,
    Done,
    Halted,
    Cancelled,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Resolving => "resolving",
            Phase::RiskChecking => "risk_checking",
            Phase::AwaitingApproval => "awaiting_approval",
            Phase::Dispatching => "dispatching",
            Phase::Aggregating => "aggregating",
            Phase::Done => "done",
            Phase::Halted => "halted",
            Phase::Cancelled => "cancelled",
        }
    }

    /// Absorbing phases: no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Halted | Phase::Cancelled)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailStatus {
    Pass,
    Fail,
}

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// The single state object threaded through every stage of a run.
///
/// Owned by the engine. Stages read it and return a [`StateUpdate`]; only
/// [`PipelineState::apply`] mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: String,
    pub phase: Phase,
    pub user_input: String,
    #[serde(default)]
    pub target_files: Vec<String>,
    #[serde(default)]
    pub scan_results: Vec<ResultRecord>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub risk_reason: Option<String>,
    #[serde(default)]
    pub guardrail_status: Option<GuardrailStatus>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub final_report: Option<String>,
    /// Targets the risk gate flagged as sensitive.
    #[serde(default)]
    pub flagged_files: Vec<String>,
    /// Resolver notices such as cap truncation.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Paths that failed existence validation during planning.
    #[serde(default)]
    pub planning_errors: Vec<String>,
    /// (target, analyzer) pairs planned from the resolved targets.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Set once an operator replaced `target_files` at the approval pause.
    #[serde(default)]
    pub filter_applied: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    /// Fresh state for a new run, parked at `Resolving`.
    pub fn new(run_id: impl Into<String>, user_input: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            phase: Phase::Resolving,
            user_input: user_input.into(),
            target_files: Vec::new(),
            scan_results: Vec::new(),
            risk_level: None,
            risk_reason: None,
            guardrail_status: None,
            error_message: None,
            final_report: None,
            flagged_files: Vec::new(),
            warnings: Vec::new(),
            planning_errors: Vec::new(),
            tasks: Vec::new(),
            filter_applied: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when a record for this (file, tool) pair is already accumulated.
    pub fn has_result(&self, file: &str, tool_used: &str) -> bool {
        self.scan_results
            .iter()
            .any(|r| r.file == file && r.tool_used == tool_used)
    }

    /// Append records, skipping any (file, tool) pair already present.
    ///
    /// Existing entries are never reordered or replaced. Returns how many
    /// records were actually appended.
    pub fn append_results(&mut self, records: Vec<ResultRecord>) -> usize {
        let mut seen: HashSet<(String, String)> = self
            .scan_results
            .iter()
            .map(|r| (r.file.clone(), r.tool_used.clone()))
            .collect();
        let before = self.scan_results.len();
        for record in records {
            if seen.insert((record.file.clone(), record.tool_used.clone())) {
                self.scan_results.push(record);
            }
        }
        self.scan_results.len() - before
    }

    /// Merge a stage's partial update into the state.
    pub fn apply(&mut self, update: StateUpdate) -> usize {
        if let Some(files) = update.target_files {
            self.target_files = files;
        }
        if let Some(level) = update.risk_level {
            self.risk_level = Some(level);
        }
        if let Some(reason) = update.risk_reason {
            self.risk_reason = Some(reason);
        }
        if let Some(status) = update.guardrail_status {
            self.guardrail_status = Some(status);
        }
        if let Some(msg) = update.error_message {
            self.error_message = Some(msg);
        }
        if let Some(report) = update.final_report {
            self.final_report = Some(report);
        }
        if let Some(flagged) = update.flagged_files {
            self.flagged_files = flagged;
        }
        if let Some(tasks) = update.tasks {
            self.tasks = tasks;
        }
        self.warnings.extend(update.warnings);
        self.planning_errors.extend(update.planning_errors);
        let appended = self.append_results(update.append_results);
        self.updated_at = Utc::now();
        appended
    }
}

// ---------------------------------------------------------------------------
// StateUpdate: partial update produced by a stage
// ---------------------------------------------------------------------------

/// Partial update computed by a stage. `None` fields leave the state untouched;
/// `append_results` is merged with [`PipelineState::append_results`].
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub target_files: Option<Vec<String>>,
    pub append_results: Vec<ResultRecord>,
    pub risk_level: Option<RiskLevel>,
    pub risk_reason: Option<String>,
    pub guardrail_status: Option<GuardrailStatus>,
    pub error_message: Option<String>,
    pub final_report: Option<String>,
    pub flagged_files: Option<Vec<String>>,
    pub warnings: Vec<String>,
    pub planning_errors: Vec<String>,
    pub tasks: Option<Vec<Task>>,
}

impl StateUpdate {
    pub fn results(records: Vec<ResultRecord>) -> Self {
        Self {
            append_results: records,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AnalyzerKind, ToolReport};

    fn record(file: &str, kind: AnalyzerKind) -> ResultRecord {
        ResultRecord::report(file, kind, ToolReport::error(kind.tool_name(), file, "X", "m", 0))
    }

    #[test]
    fn new_state_starts_resolving() {
        let state = PipelineState::new("run-1", "./repo");
        assert_eq!(state.phase, Phase::Resolving);
        assert!(state.target_files.is_empty());
        assert!(state.final_report.is_none());
    }

    #[test]
    fn append_results_is_idempotent_per_pair() {
        let mut state = PipelineState::new("r", "x");
        assert_eq!(
            state.append_results(vec![
                record("a.py", AnalyzerKind::Python),
                record("a.py", AnalyzerKind::Secrets),
            ]),
            2
        );
        assert_eq!(
            state.append_results(vec![
                record("a.py", AnalyzerKind::Python),
                record("b.md", AnalyzerKind::Markdown),
            ]),
            1
        );
        let keys: Vec<_> = state.scan_results.iter().map(|r| r.key()).collect();
        assert_eq!(
            keys,
            vec![("a.py", "python"), ("a.py", "secrets"), ("b.md", "markdown")]
        );
    }

    #[test]
    fn duplicate_within_one_batch_is_dropped() {
        let mut state = PipelineState::new("r", "x");
        let appended = state.append_results(vec![
            record("a.py", AnalyzerKind::Python),
            ResultRecord::failure("a.py", AnalyzerKind::Python, "second attempt"),
        ]);
        assert_eq!(appended, 1);
        assert!(!state.scan_results[0].details.is_failure());
    }

    #[test]
    fn apply_replaces_options_and_extends_lists() {
        let mut state = PipelineState::new("r", "x");
        state.apply(StateUpdate {
            target_files: Some(vec!["a".into(), "b".into()]),
            warnings: vec!["w1".into()],
            ..StateUpdate::default()
        });
        state.apply(StateUpdate {
            risk_level: Some(RiskLevel::High),
            guardrail_status: Some(GuardrailStatus::Pass),
            warnings: vec!["w2".into()],
            ..StateUpdate::default()
        });
        assert_eq!(state.target_files, vec!["a", "b"]);
        assert_eq!(state.risk_level, Some(RiskLevel::High));
        assert_eq!(state.warnings, vec!["w1", "w2"]);
    }

    #[test]
    fn phase_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&Phase::AwaitingApproval).unwrap(),
            "\"awaiting_approval\""
        );
        let p: Phase = serde_json::from_str("\"risk_checking\"").unwrap();
        assert_eq!(p, Phase::RiskChecking);
        assert_eq!(Phase::RiskChecking.to_string(), "risk_checking");
    }

    #[test]
    fn terminal_phases() {
        assert!(Phase::Done.is_terminal());
        assert!(Phase::Halted.is_terminal());
        assert!(Phase::Cancelled.is_terminal());
        assert!(!Phase::AwaitingApproval.is_terminal());
    }

    #[test]
    fn state_survives_json_round_trip() {
        let mut state = PipelineState::new("r", "x");
        state.append_results(vec![record("a.py", AnalyzerKind::Python)]);
        let json = serde_json::to_string(&state).unwrap();
        let back: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
