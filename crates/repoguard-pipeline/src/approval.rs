//! The approval pause: gate trait and built-in gates.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use repoguard_types::{PipelineState, RepoGuardError, Result, RiskLevel};

/// Operator decision at the approval pause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    ApproveAll,
    /// Replace the target list, then dispatch.
    ApproveFiltered(Vec<String>),
    Cancel,
}

impl Decision {
    /// "approve-with-secrets-filtered": every flagged target removed.
    pub fn without_flagged(request: &ApprovalRequest) -> Self {
        Decision::ApproveFiltered(
            request
                .target_files
                .iter()
                .filter(|f| !request.flagged_files.contains(f))
                .cloned()
                .collect(),
        )
    }

    /// Parse a CLI decision name for a run parked with `request`.
    pub fn from_name(name: &str, request: &ApprovalRequest) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "approve" | "approve-all" | "yes" | "y" => Ok(Decision::ApproveAll),
            "filter-secrets" | "filter" | "approve-filtered" => Ok(Self::without_flagged(request)),
            "cancel" | "no" | "n" => Ok(Decision::Cancel),
            other => Err(RepoGuardError::Config(format!(
                "unknown decision '{other}' (expected approve, filter-secrets, or cancel)"
            ))),
        }
    }
}

/// What the operator is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub run_id: String,
    pub target_files: Vec<String>,
    pub flagged_files: Vec<String>,
    pub risk_level: Option<RiskLevel>,
    pub risk_reason: Option<String>,
    pub warnings: Vec<String>,
}

impl ApprovalRequest {
    pub fn from_state(state: &PipelineState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            target_files: state.target_files.clone(),
            flagged_files: state.flagged_files.clone(),
            risk_level: state.risk_level,
            risk_reason: state.risk_reason.clone(),
            warnings: state.warnings.clone(),
        }
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk_level == Some(RiskLevel::High)
    }
}

/// Answers the approval pause. `Ok(None)` defers: the run stays parked at
/// the checkpoint until resumed with an explicit decision.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn decide(&self, request: &ApprovalRequest) -> Result<Option<Decision>>;
}

// ---------------------------------------------------------------------------
// AutoApprove
// ---------------------------------------------------------------------------

pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn decide(&self, _request: &ApprovalRequest) -> Result<Option<Decision>> {
        Ok(Some(Decision::ApproveAll))
    }
}

// ---------------------------------------------------------------------------
// Deferred
// ---------------------------------------------------------------------------

/// Never decides; the run detaches at the pause.
pub struct Deferred;

#[async_trait]
impl ApprovalGate for Deferred {
    async fn decide(&self, _request: &ApprovalRequest) -> Result<Option<Decision>> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// FilterSensitive
// ---------------------------------------------------------------------------

pub struct FilterSensitive;

#[async_trait]
impl ApprovalGate for FilterSensitive {
    async fn decide(&self, request: &ApprovalRequest) -> Result<Option<Decision>> {
        Ok(Some(Decision::without_flagged(request)))
    }
}

// ---------------------------------------------------------------------------
// ConsoleApproval
// ---------------------------------------------------------------------------

pub struct ConsoleApproval;

#[async_trait]
impl ApprovalGate for ConsoleApproval {
    async fn decide(&self, request: &ApprovalRequest) -> Result<Option<Decision>> {
        println!("\nApproval required for run {}", request.run_id);
        println!("  {} target file(s)", request.target_files.len());
        if let Some(reason) = &request.risk_reason {
            let marker = if request.is_high_risk() { "HIGH RISK" } else { "risk" };
            println!("  {marker}: {reason}");
        }
        for warning in &request.warnings {
            println!("  warning: {warning}");
        }
        println!("  [1] Approve all");
        println!(
            "  [2] Approve with sensitive files removed ({} flagged)",
            request.flagged_files.len()
        );
        println!("  [3] Cancel");

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let decision = match input.trim() {
            "1" => Decision::ApproveAll,
            "2" => Decision::without_flagged(request),
            "3" | "" => Decision::Cancel,
            other => Decision::from_name(other, request)?,
        };
        Ok(Some(decision))
    }
}

// ---------------------------------------------------------------------------
// ScriptedApproval
// ---------------------------------------------------------------------------

/// Plays back preset answers and records every request it sees.
pub struct ScriptedApproval {
    answers: Mutex<Vec<Option<Decision>>>,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedApproval {
    pub fn new(answers: Vec<Option<Decision>>) -> Self {
        let mut reversed = answers;
        reversed.reverse();
        Self {
            answers: Mutex::new(reversed),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ApprovalGate for ScriptedApproval {
    async fn decide(&self, request: &ApprovalRequest) -> Result<Option<Decision>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let answer = self
            .answers
            .lock()
            .map_err(|_| RepoGuardError::Other("approval script poisoned".into()))?
            .pop()
            .unwrap_or(None);
        Ok(answer)
    }
}
