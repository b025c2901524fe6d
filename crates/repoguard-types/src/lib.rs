//! Shared types, errors, and pipeline state for the RepoGuard scan pipeline.
//!
//! This crate provides the foundational types used across all other RepoGuard crates:
//! - `RepoGuardError`: unified error taxonomy
//! - `PipelineState`: the single state object threaded through every stage
//! - `StateUpdate`: partial update returned by a stage and merged by the engine
//! - `ResultRecord` / `ToolReport` / `Issue`: analyzer output, success or failure

pub mod record;
pub mod state;

pub use record::{
    AnalyzerKind, FailurePayload, Issue, ReportMeta, ResultPayload, ResultRecord, Severity, Task,
    TaskType, ToolReport,
};
pub use state::{GuardrailStatus, Phase, PipelineState, RiskLevel, StateUpdate};

/// Unified error type for all RepoGuard subsystems.
#[derive(Debug, thiserror::Error)]
pub enum RepoGuardError {
    // === Workflow Errors ===
    #[error("Invalid transition from phase '{from}' on event '{event}'")]
    InvalidTransition { from: String, event: String },

    #[error("Run '{run_id}' not found")]
    RunNotFound { run_id: String },

    #[error("Run '{run_id}' is in phase '{phase}', expected '{expected}'")]
    WrongPhase {
        run_id: String,
        phase: String,
        expected: String,
    },

    // === Analyzer Errors ===
    #[error("Analyzer '{tool}' failed: {message}")]
    AnalyzerError { tool: String, message: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    #[error("Tool '{tool}' is not installed or not on PATH")]
    ToolNotInstalled { tool: String },

    #[error("Sidecar protocol error: {0}")]
    Protocol(String),

    // === Setup Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RepoGuardError {
    /// Returns `true` if the error belongs to a single analyzer invocation and
    /// must be folded into an error-shaped record rather than abort the run.
    pub fn is_tool_level(&self) -> bool {
        matches!(
            self,
            RepoGuardError::AnalyzerError { .. }
                | RepoGuardError::CommandTimeout { .. }
                | RepoGuardError::ToolNotInstalled { .. }
                | RepoGuardError::Protocol(_)
        )
    }

    /// Short machine-readable code used when the error is rendered as an issue.
    pub fn code(&self) -> &'static str {
        match self {
            RepoGuardError::InvalidTransition { .. } => "INVALID_TRANSITION",
            RepoGuardError::RunNotFound { .. } => "RUN_NOT_FOUND",
            RepoGuardError::WrongPhase { .. } => "WRONG_PHASE",
            RepoGuardError::AnalyzerError { .. } => "ANALYZER_ERROR",
            RepoGuardError::CommandTimeout { .. } => "TIMEOUT",
            RepoGuardError::ToolNotInstalled { .. } => "NOT_INSTALLED",
            RepoGuardError::Protocol(_) => "PROTOCOL_ERROR",
            RepoGuardError::Config(_) => "CONFIG_ERROR",
            RepoGuardError::Io(_) => "IO_ERROR",
            RepoGuardError::Json(_) => "JSON_ERROR",
            RepoGuardError::Other(_) => "ERROR",
        }
    }
}

/// A convenience alias for `Result<T, RepoGuardError>`.
pub type Result<T> = std::result::Result<T, RepoGuardError>;
