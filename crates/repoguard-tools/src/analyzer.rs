use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use repoguard_types::{AnalyzerKind, ToolReport};

/// An external analyzer the dispatcher can invoke on one target path.
///
/// Returning `Err` signals a tool-level failure (not installed, crashed,
/// unparseable output); the dispatcher turns it into an error-shaped record.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    /// Wall-clock bound the dispatcher applies to one `analyze` call.
    fn timeout(&self) -> Duration;

    async fn analyze(&self, target: &Path) -> repoguard_types::Result<ToolReport>;
}

/// Registry of analyzers keyed by kind.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<AnalyzerKind, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analyzer, replacing any previous one of the same kind.
    pub fn register(&mut self, analyzer: impl Analyzer + 'static) {
        self.register_arc(Arc::new(analyzer));
    }

    pub fn register_arc(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(analyzer.kind(), analyzer);
    }

    pub fn get(&self, kind: AnalyzerKind) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(&kind).cloned()
    }

    pub fn has(&self, kind: AnalyzerKind) -> bool {
        self.analyzers.contains_key(&kind)
    }

    /// Registered kinds in stable order.
    pub fn kinds(&self) -> Vec<AnalyzerKind> {
        let mut kinds: Vec<_> = self.analyzers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(AnalyzerKind);

    #[async_trait]
    impl Analyzer for Fixed {
        fn kind(&self) -> AnalyzerKind {
            self.0
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn analyze(&self, target: &Path) -> repoguard_types::Result<ToolReport> {
            Ok(ToolReport {
                tool: self.0.tool_name().into(),
                target: target.display().to_string(),
                ok: true,
                summary: "clean".into(),
                issues: vec![],
                meta: Default::default(),
            })
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = AnalyzerRegistry::new();
        assert!(registry.is_empty());
        registry.register(Fixed(AnalyzerKind::Secrets));
        registry.register(Fixed(AnalyzerKind::Markdown));
        assert_eq!(registry.len(), 2);
        assert!(registry.has(AnalyzerKind::Secrets));
        assert!(!registry.has(AnalyzerKind::Python));
        assert_eq!(
            registry.kinds(),
            vec![AnalyzerKind::Markdown, AnalyzerKind::Secrets]
        );
    }

    #[test]
    fn same_kind_replaces() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(Fixed(AnalyzerKind::Python));
        registry.register(Fixed(AnalyzerKind::Python));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn registered_analyzer_runs() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(Fixed(AnalyzerKind::Python));
        let analyzer = registry.get(AnalyzerKind::Python).unwrap();
        let report = analyzer.analyze(Path::new("a.py")).await.unwrap();
        assert_eq!(report.tool, "PythonCodeValidator");
        assert_eq!(report.target, "a.py");
    }
}
