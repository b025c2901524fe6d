use std::path::Path;

use async_trait::async_trait;

use repoguard_tools::AnalyzerRegistry;
use repoguard_types::{AnalyzerKind, Result};

/// Decides which analyzers apply to a file.
///
/// Returns raw analyzer tokens; callers pass them through [`ground_kinds`]
/// before acting on them.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, file: &str) -> Result<Vec<String>>;
}

/// Extension-based classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionClassifier;

const SECRETS_ONLY: &[&str] = &[
    "txt", "json", "yaml", "yml", "toml", "ini", "cfg", "js", "ts", "sh",
];

#[async_trait]
impl Classifier for ExtensionClassifier {
    async fn classify(&self, file: &str) -> Result<Vec<String>> {
        Ok(classify_by_extension(file)
            .into_iter()
            .map(|k| k.id().to_string())
            .collect())
    }
}

pub fn classify_by_extension(file: &str) -> Vec<AnalyzerKind> {
    let path = Path::new(file);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if ext == "py" {
        vec![AnalyzerKind::Python, AnalyzerKind::Secrets]
    } else if ext == "md" || ext == "mdx" {
        vec![AnalyzerKind::Markdown]
    } else if name.starts_with(".env") || ext == "env" || SECRETS_ONLY.contains(&ext.as_str()) {
        vec![AnalyzerKind::Secrets]
    } else {
        Vec::new()
    }
}

/// Validate classifier output: unknown tokens, analyzers that are not
/// registered, and duplicates are dropped. Order of first appearance is kept.
pub fn ground_kinds(tokens: &[String], registry: &AnalyzerRegistry) -> Vec<AnalyzerKind> {
    let mut kinds = Vec::new();
    for token in tokens {
        match AnalyzerKind::from_token(token) {
            Some(kind) if registry.has(kind) && !kinds.contains(&kind) => kinds.push(kind),
            Some(_) => {}
            None => tracing::debug!(token = %token, "Ignoring unknown analyzer token"),
        }
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use repoguard_tools::PatternSecretsAnalyzer;

    #[test]
    fn extension_rules() {
        use AnalyzerKind::*;
        assert_eq!(classify_by_extension("src/app.py"), vec![Python, Secrets]);
        assert_eq!(classify_by_extension("README.md"), vec![Markdown]);
        assert_eq!(classify_by_extension("docs/page.MDX"), vec![Markdown]);
        assert_eq!(classify_by_extension("/repo/.env"), vec![Secrets]);
        assert_eq!(classify_by_extension(".env.local"), vec![Secrets]);
        assert_eq!(classify_by_extension("prod.env"), vec![Secrets]);
        assert_eq!(classify_by_extension("package.json"), vec![Secrets]);
        assert_eq!(classify_by_extension("notes.txt"), vec![Secrets]);
        assert!(classify_by_extension("logo.png").is_empty());
        assert!(classify_by_extension("Makefile").is_empty());
    }

    #[test]
    fn grounding_drops_unknown_unregistered_and_duplicates() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(PatternSecretsAnalyzer::new(Duration::from_secs(1)).unwrap());
        let tokens: Vec<String> = ["secrets", "python", "rust", " Secrets ", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(ground_kinds(&tokens, &registry), vec![AnalyzerKind::Secrets]);
    }

    #[tokio::test]
    async fn extension_classifier_emits_ids() {
        let tokens = ExtensionClassifier.classify("a.py").await.unwrap();
        assert_eq!(tokens, vec!["python", "secrets"]);
    }
}
