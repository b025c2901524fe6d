//! The workflow engine.
//!
//! Owns the [`PipelineState`] for a run and drives it through the phase table:
//! each stage computes a [`StateUpdate`], the engine merges it, moves to the
//! next phase and checkpoints before doing anything else. The single external
//! decision edge is the approval pause; a run can detach there and be resumed
//! by id from its checkpoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use repoguard_tools::AnalyzerRegistry;
use repoguard_types::{
    Phase, PipelineState, RepoGuardError, ResultPayload, Result, StateUpdate,
};

use crate::aggregator::{aggregate, ScanSummary};
use crate::approval::{ApprovalGate, ApprovalRequest, Decision, Deferred};
use crate::checkpoint::CheckpointStore;
use crate::classifier::{Classifier, ExtensionClassifier};
use crate::config::ScanConfig;
use crate::dispatcher::Dispatcher;
use crate::events::{EventEmitter, PipelineEvent};
use crate::phase::{transition, PhaseEvent};
use crate::report::write_report;
use crate::resolver::{plan_tasks, PathInterpreter, TargetResolver};
use crate::risk;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How a call to [`Engine::start`] or [`Engine::resume`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// The risk gate failed the run; nothing was dispatched.
    Halted { reason: String },
    /// Parked at the approval pause with no decision. Resume by run id.
    AwaitingApproval(ApprovalRequest),
    /// The operator cancelled at the approval pause.
    Cancelled,
    Completed {
        report_path: PathBuf,
        summary: ScanSummary,
    },
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: PipelineState,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        &self.state.run_id
    }
}

/// Drives scan runs from input to report.
pub struct Engine {
    config: ScanConfig,
    resolver: TargetResolver,
    registry: AnalyzerRegistry,
    classifier: Arc<dyn Classifier>,
    store: CheckpointStore,
    gate: Arc<dyn ApprovalGate>,
    events: EventEmitter,
    report_path: PathBuf,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl Engine {
    /// Build an engine with the production analyzers. Relative `state_dir`
    /// and `report_path` are taken relative to `cwd`.
    ///
    /// The default gate defers, so a run started without
    /// [`Engine::with_gate`] parks at the approval pause.
    pub fn new(config: ScanConfig, cwd: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let cwd = cwd.into();
        let resolver = TargetResolver::new(&config, &cwd)?;
        let registry = config.analyzer_registry(&cwd)?;
        tracing::debug!(analyzers = ?registry.kinds(), "Analyzer registry built");
        Ok(Self {
            store: CheckpointStore::new(cwd.join(&config.state_dir)),
            report_path: cwd.join(&config.report_path),
            resolver,
            registry,
            classifier: Arc::new(ExtensionClassifier),
            gate: Arc::new(Deferred),
            events: EventEmitter::default(),
            config,
        })
    }

    pub fn with_registry(mut self, registry: AnalyzerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Arc<dyn PathInterpreter>) -> Self {
        self.resolver = self.resolver.with_interpreter(interpreter);
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl Engine {
    /// Start a new run for `input` (a path or free text naming paths).
    pub async fn start(&self, input: &str) -> Result<RunOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let state = PipelineState::new(&run_id, input);
        tracing::info!(run_id = %run_id, input = %input, "Run started");
        self.events.emit(PipelineEvent::RunStarted {
            run_id,
            input: input.to_string(),
        });
        self.store.save(&state).await?;
        self.drive(state, None).await
    }

    /// Continue a checkpointed run.
    ///
    /// `decision` answers the approval pause and is only accepted while the
    /// run is parked there. Without one, a parked run consults the gate again
    /// and a run interrupted later picks up where its checkpoint left off.
    pub async fn resume(&self, run_id: &str, decision: Option<Decision>) -> Result<RunOutcome> {
        let state = self.store.load_required(run_id).await?;
        if state.phase.is_terminal() {
            return Err(RepoGuardError::WrongPhase {
                run_id: run_id.to_string(),
                phase: state.phase.to_string(),
                expected: "a non-terminal phase".into(),
            });
        }
        if decision.is_some() && state.phase != Phase::AwaitingApproval {
            return Err(RepoGuardError::WrongPhase {
                run_id: run_id.to_string(),
                phase: state.phase.to_string(),
                expected: Phase::AwaitingApproval.to_string(),
            });
        }
        tracing::info!(run_id = %run_id, phase = %state.phase, "Run resumed");
        self.events.emit(PipelineEvent::RunResumed {
            run_id: run_id.to_string(),
            phase: state.phase,
        });
        self.drive(state, decision).await
    }

    /// The last checkpoint of a run.
    pub async fn inspect(&self, run_id: &str) -> Result<PipelineState> {
        self.store.load_required(run_id).await
    }

    /// Every checkpointed run, oldest first.
    pub async fn runs(&self) -> Result<Vec<PipelineState>> {
        self.store.list().await
    }
}

// ---------------------------------------------------------------------------
// Drive loop
// ---------------------------------------------------------------------------

impl Engine {
    async fn drive(
        &self,
        mut state: PipelineState,
        mut decision: Option<Decision>,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        loop {
            match state.phase {
                Phase::Resolving => {
                    let resolution = self.resolver.resolve(&state.user_input).await?;
                    let plan = plan_tasks(&resolution.files, &self.config.ignored_dirs);
                    tracing::info!(
                        run_id = %state.run_id,
                        files = resolution.files.len(),
                        tasks = plan.tasks.len(),
                        "Targets resolved"
                    );
                    self.events.emit(PipelineEvent::TargetsResolved {
                        run_id: state.run_id.clone(),
                        count: resolution.files.len(),
                        truncated_from: resolution.truncated_from,
                    });
                    let mut planning_errors: Vec<String> = resolution
                        .rejected
                        .iter()
                        .map(|c| format!("Path not found: {c}"))
                        .collect();
                    planning_errors.extend(plan.errors);
                    state.apply(StateUpdate {
                        target_files: Some(resolution.files),
                        warnings: resolution.warnings,
                        planning_errors,
                        tasks: Some(plan.tasks),
                        ..StateUpdate::default()
                    });
                    self.advance(&mut state, PhaseEvent::Resolved).await?;
                }

                Phase::RiskChecking => {
                    let verdict =
                        risk::evaluate(&state.target_files, self.config.sensitive_signals.as_slice());
                    let event = risk::route(verdict.status);
                    tracing::info!(
                        run_id = %state.run_id,
                        status = ?verdict.status,
                        level = ?verdict.level,
                        flagged = verdict.flagged.len(),
                        "Risk assessed"
                    );
                    self.events.emit(PipelineEvent::RiskAssessed {
                        run_id: state.run_id.clone(),
                        status: verdict.status,
                        level: verdict.level,
                        flagged: verdict.flagged.len(),
                    });
                    state.apply(verdict.into_update());
                    self.advance(&mut state, event).await?;
                }

                Phase::Halted => {
                    let reason = state
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "Run halted by the risk gate.".into());
                    tracing::warn!(run_id = %state.run_id, reason = %reason, "Run halted");
                    self.events.emit(PipelineEvent::RunHalted {
                        run_id: state.run_id.clone(),
                        reason: reason.clone(),
                    });
                    return Ok(RunOutcome {
                        state,
                        status: RunStatus::Halted { reason },
                    });
                }

                Phase::AwaitingApproval => {
                    let request = ApprovalRequest::from_state(&state);
                    self.events.emit(PipelineEvent::ApprovalRequested {
                        run_id: state.run_id.clone(),
                        targets: request.target_files.len(),
                    });
                    let answer = match decision.take() {
                        Some(d) => Some(d),
                        None => self.gate.decide(&request).await?,
                    };
                    match answer {
                        None => {
                            tracing::info!(run_id = %state.run_id, "Parked at approval");
                            return Ok(RunOutcome {
                                state,
                                status: RunStatus::AwaitingApproval(request),
                            });
                        }
                        Some(Decision::Cancel) => {
                            // The checkpoint keeps the parked state for reinspection.
                            state.phase = transition(state.phase, PhaseEvent::Cancelled)?;
                            tracing::info!(run_id = %state.run_id, "Run cancelled");
                            self.events.emit(PipelineEvent::RunCancelled {
                                run_id: state.run_id.clone(),
                            });
                            return Ok(RunOutcome {
                                state,
                                status: RunStatus::Cancelled,
                            });
                        }
                        Some(Decision::ApproveFiltered(files)) => {
                            tracing::info!(
                                run_id = %state.run_id,
                                before = state.target_files.len(),
                                after = files.len(),
                                "Targets filtered at approval"
                            );
                            state.apply(StateUpdate {
                                target_files: Some(files),
                                ..StateUpdate::default()
                            });
                            state.filter_applied = true;
                            self.advance(&mut state, PhaseEvent::Approved).await?;
                        }
                        Some(Decision::ApproveAll) => {
                            self.advance(&mut state, PhaseEvent::Approved).await?;
                        }
                    }
                }

                Phase::Dispatching => {
                    self.dispatch(&mut state).await?;
                    self.advance(&mut state, PhaseEvent::Dispatched).await?;
                }

                Phase::Aggregating => {
                    let report = aggregate(
                        &state.scan_results,
                        &state.user_input,
                        self.config.message_cap,
                    );
                    let markdown = report.render()?;
                    // A failed write leaves the run resumable in Aggregating.
                    write_report(&self.report_path, &markdown).await?;
                    state.apply(StateUpdate {
                        final_report: Some(markdown.clone()),
                        ..StateUpdate::default()
                    });
                    self.advance(&mut state, PhaseEvent::Aggregated).await?;

                    let duration_ms = started.elapsed().as_millis() as u64;
                    tracing::info!(
                        run_id = %state.run_id,
                        issues = report.summary.total_issues_found,
                        failures = report.summary.tool_failures,
                        duration_ms,
                        "Run completed"
                    );
                    self.events.emit(PipelineEvent::RunCompleted {
                        run_id: state.run_id.clone(),
                        total_issues: report.summary.total_issues_found,
                        duration_ms,
                    });
                    return Ok(RunOutcome {
                        state,
                        status: RunStatus::Completed {
                            report_path: self.report_path.clone(),
                            summary: report.summary,
                        },
                    });
                }

                Phase::Done | Phase::Cancelled => {
                    return Err(RepoGuardError::WrongPhase {
                        run_id: state.run_id.clone(),
                        phase: state.phase.to_string(),
                        expected: "a non-terminal phase".into(),
                    });
                }
            }
        }
    }

    /// Run every outstanding (file, analyzer) pair, merging and checkpointing
    /// each record as it arrives.
    async fn dispatch(&self, state: &mut PipelineState) -> Result<()> {
        let dispatcher = Dispatcher::new(self.registry.clone(), self.config.max_concurrency)
            .with_classifier(self.classifier.clone());
        let units = dispatcher.plan_units(state).await;
        tracing::info!(
            run_id = %state.run_id,
            units = units.len(),
            already_recorded = state.scan_results.len(),
            "Dispatching"
        );

        let mut run = dispatcher.start(units);
        while let Some(record) = run.next().await {
            let event = match &record.details {
                ResultPayload::Report(report) => PipelineEvent::AnalyzerCompleted {
                    run_id: state.run_id.clone(),
                    file: record.file.clone(),
                    tool: record.tool_used.clone(),
                    ok: report.ok,
                    issues: report.total_issues(),
                },
                ResultPayload::Failure(failure) => PipelineEvent::AnalyzerFailed {
                    run_id: state.run_id.clone(),
                    file: record.file.clone(),
                    tool: record.tool_used.clone(),
                    error: failure.error.clone(),
                },
            };
            state.apply(StateUpdate::results(vec![record]));
            self.store.save(state).await?;
            self.events.emit(event);
        }
        Ok(())
    }

    /// Apply `event`, checkpoint, announce.
    async fn advance(&self, state: &mut PipelineState, event: PhaseEvent) -> Result<()> {
        let from = state.phase;
        state.phase = transition(from, event)?;
        tracing::debug!(run_id = %state.run_id, from = %from, to = %state.phase, %event, "Phase transition");
        self.store.save(state).await?;
        self.events.emit(PipelineEvent::PhaseEntered {
            run_id: state.run_id.clone(),
            phase: state.phase,
        });
        self.events.emit(PipelineEvent::CheckpointSaved {
            run_id: state.run_id.clone(),
            phase: state.phase,
        });
        Ok(())
    }
}
