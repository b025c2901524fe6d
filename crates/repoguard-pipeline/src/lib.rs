//! Scan workflow engine, stages, and persistence.
//!
//! This crate implements the RepoGuard pipeline: target resolution, the risk
//! gate, the durable approval pause, parallel analyzer dispatch with failure
//! isolation, result aggregation, checkpoint/resume, and report output.

pub mod aggregator;
pub mod approval;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod phase;
pub mod report;
pub mod resolver;
pub mod risk;

pub use aggregator::{aggregate, FinalReport, ScanSummary};
pub use approval::{
    ApprovalGate, ApprovalRequest, AutoApprove, ConsoleApproval, Decision, Deferred,
    FilterSensitive, ScriptedApproval,
};
pub use checkpoint::CheckpointStore;
pub use classifier::{classify_by_extension, ground_kinds, Classifier, ExtensionClassifier};
pub use config::{ScanConfig, SecretsBackend};
pub use dispatcher::{DispatchRun, DispatchUnit, Dispatcher};
pub use engine::{Engine, RunOutcome, RunStatus};
pub use events::{EventEmitter, PipelineEvent};
pub use phase::{transition, PhaseEvent};
pub use report::write_report;
pub use resolver::{
    plan_tasks, HeuristicInterpreter, PathInterpreter, Resolution, TargetResolver, TaskPlan,
};
pub use risk::{evaluate, route, RiskVerdict};
