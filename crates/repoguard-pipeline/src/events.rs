//! Run progress events.
//!
//! The engine emits [`PipelineEvent`]s on a [`tokio::sync::broadcast`] channel
//! so the CLI (or any other observer) can follow a run without reaching into
//! engine internals.

use serde::{Deserialize, Serialize};

use repoguard_types::{GuardrailStatus, Phase, RiskLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    RunStarted {
        run_id: String,
        input: String,
    },
    RunResumed {
        run_id: String,
        phase: Phase,
    },
    PhaseEntered {
        run_id: String,
        phase: Phase,
    },
    TargetsResolved {
        run_id: String,
        count: usize,
        truncated_from: Option<usize>,
    },
    RiskAssessed {
        run_id: String,
        status: GuardrailStatus,
        level: Option<RiskLevel>,
        flagged: usize,
    },
    ApprovalRequested {
        run_id: String,
        targets: usize,
    },
    AnalyzerCompleted {
        run_id: String,
        file: String,
        tool: String,
        ok: bool,
        issues: usize,
    },
    AnalyzerFailed {
        run_id: String,
        file: String,
        tool: String,
        error: String,
    },
    CheckpointSaved {
        run_id: String,
        phase: Phase,
    },
    RunHalted {
        run_id: String,
        reason: String,
    },
    RunCancelled {
        run_id: String,
    },
    RunCompleted {
        run_id: String,
        total_issues: usize,
        duration_ms: u64,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Events sent with no subscriber are dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
