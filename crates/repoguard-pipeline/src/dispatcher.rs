//! Tool dispatch.
//!
//! Each (file, analyzer) pair is an independent unit. Units run on a
//! [`JoinSet`] bounded by a semaphore; every analyzer call runs in its own
//! task under the analyzer's timeout, so a hang, an error or a panic becomes
//! an error-shaped [`ResultRecord`] for that pair and nothing else.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use repoguard_tools::{Analyzer, AnalyzerRegistry};
use repoguard_types::{AnalyzerKind, PipelineState, RepoGuardError, ResultRecord};

use crate::classifier::{ground_kinds, Classifier, ExtensionClassifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchUnit {
    pub file: String,
    pub kind: AnalyzerKind,
}

pub struct Dispatcher {
    registry: AnalyzerRegistry,
    classifier: Arc<dyn Classifier>,
    max_concurrency: usize,
}

impl Dispatcher {
    pub fn new(registry: AnalyzerRegistry, max_concurrency: usize) -> Self {
        Self {
            registry,
            classifier: Arc::new(ExtensionClassifier),
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    /// Units still owed for `state.target_files`, skipping pairs that already
    /// have a record so a resumed dispatch never runs a pair twice.
    pub async fn plan_units(&self, state: &PipelineState) -> Vec<DispatchUnit> {
        let mut units = Vec::new();
        for file in &state.target_files {
            let tokens = match self.classifier.classify(file).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "Classifier failed; file skipped");
                    continue;
                }
            };
            for kind in ground_kinds(&tokens, &self.registry) {
                if state.has_result(file, kind.id()) {
                    tracing::debug!(file = %file, tool = %kind, "Already recorded; skipping");
                    continue;
                }
                units.push(DispatchUnit {
                    file: file.clone(),
                    kind,
                });
            }
        }
        units
    }

    /// Spawn every unit. Records come back from [`DispatchRun::next`] in
    /// completion order.
    pub fn start(&self, units: Vec<DispatchUnit>) -> DispatchRun {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();

        for unit in units {
            let Some(analyzer) = self.registry.get(unit.kind) else {
                continue;
            };
            let sem = semaphore.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await;
                invoke(analyzer, unit.file).await
            });
        }

        DispatchRun { join_set }
    }
}

/// In-flight dispatch.
pub struct DispatchRun {
    join_set: JoinSet<ResultRecord>,
}

impl DispatchRun {
    pub fn remaining(&self) -> usize {
        self.join_set.len()
    }

    /// Next finished record, or `None` once every unit has reported.
    ///
    /// Unit tasks cannot fail on their own: [`invoke`] turns analyzer errors,
    /// panics and timeouts into records. A join error here means the runtime
    /// is shutting down.
    pub async fn next(&mut self) -> Option<ResultRecord> {
        loop {
            match self.join_set.join_next().await? {
                Ok(record) => return Some(record),
                Err(e) => tracing::error!(error = %e, "Dispatch task lost"),
            }
        }
    }
}

/// Run one analyzer on one file, converting every failure mode into data.
pub async fn invoke(analyzer: Arc<dyn Analyzer>, file: String) -> ResultRecord {
    let kind = analyzer.kind();
    let timeout = analyzer.timeout();
    let path = PathBuf::from(&file);

    let handle = tokio::spawn(async move { analyzer.analyze(&path).await });
    let abort = handle.abort_handle();

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(report))) => ResultRecord::report(file, kind, report),
        Ok(Ok(Err(e))) => {
            tracing::warn!(file = %file, tool = %kind, error = %e, "Analyzer failed");
            ResultRecord::failure(file, kind, e.to_string())
        }
        Ok(Err(join_err)) => {
            tracing::warn!(file = %file, tool = %kind, error = %join_err, "Analyzer task crashed");
            ResultRecord::failure(file, kind, format!("analyzer crashed: {join_err}"))
        }
        Err(_) => {
            abort.abort();
            let err = RepoGuardError::CommandTimeout {
                timeout_ms: timeout.as_millis() as u64,
            };
            tracing::warn!(file = %file, tool = %kind, "Analyzer timed out");
            ResultRecord::failure(file, kind, err.to_string())
        }
    }
}
