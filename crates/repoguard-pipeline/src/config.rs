//! Scan configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working configuration. The CLI overrides individual fields after
//! loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use repoguard_tools::{
    AnalyzerRegistry, CommandRunner, DetectSecretsAnalyzer, MarkdownAnalyzer, McpServerCommand,
    PatternSecretsAnalyzer, PythonAnalyzer,
};
use repoguard_types::{RepoGuardError, Result};

/// Which secrets scanner backs the `secrets` analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretsBackend {
    /// `detect-secrets` when it is on `PATH`, the built-in scanner otherwise.
    #[default]
    Auto,
    DetectSecrets,
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_files: usize,
    pub ignored_dirs: Vec<String>,
    pub extensions: Vec<String>,
    /// Extra glob patterns excluded during directory enumeration.
    pub ignore_globs: Vec<String>,
    pub sensitive_signals: Vec<String>,
    pub max_concurrency: usize,
    pub secrets_timeout_secs: u64,
    pub markdown_timeout_secs: u64,
    pub python_timeout_secs: u64,
    pub secrets_backend: SecretsBackend,
    pub python_sidecar: McpServerCommand,
    pub state_dir: PathBuf,
    pub report_path: PathBuf,
    /// Length cap for critical-finding messages in the report.
    pub message_cap: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_files: 30,
            // The run state directory is never a scan target.
            ignored_dirs: repoguard_tools::DEFAULT_EXCLUDED_DIRS
                .iter()
                .chain(&[".repoguard"])
                .map(|s| s.to_string())
                .collect(),
            extensions: ["py", "md", "env", "json", "txt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignore_globs: Vec::new(),
            sensitive_signals: [".env", "secrets", "credentials", "key.pem", "id_rsa"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_concurrency: 4,
            secrets_timeout_secs: 45,
            markdown_timeout_secs: 30,
            python_timeout_secs: 60,
            secrets_backend: SecretsBackend::Auto,
            python_sidecar: McpServerCommand::default(),
            state_dir: PathBuf::from(".repoguard/runs"),
            report_path: PathBuf::from("scan_report.md"),
            message_cap: 300,
        }
    }
}

impl ScanConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RepoGuardError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: ScanConfig = serde_json::from_str(&text).map_err(|e| {
            RepoGuardError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_files == 0 {
            return Err(RepoGuardError::Config("max_files must be at least 1".into()));
        }
        if self.max_concurrency == 0 {
            return Err(RepoGuardError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Build the production analyzer set rooted at `working_dir`.
    pub fn analyzer_registry(&self, working_dir: &Path) -> Result<AnalyzerRegistry> {
        let runner = CommandRunner::new(working_dir);
        let mut registry = AnalyzerRegistry::new();

        registry.register(MarkdownAnalyzer::new(
            runner.clone(),
            Duration::from_secs(self.markdown_timeout_secs),
        ));
        registry.register(PythonAnalyzer::new(
            self.python_sidecar.clone(),
            Duration::from_secs(self.python_timeout_secs),
        ));

        let secrets_timeout = Duration::from_secs(self.secrets_timeout_secs);
        let detect = DetectSecretsAnalyzer::new(runner, secrets_timeout);
        match self.secrets_backend {
            SecretsBackend::DetectSecrets => registry.register(detect),
            SecretsBackend::Auto if detect.is_available() => registry.register(detect),
            SecretsBackend::Auto | SecretsBackend::Builtin => {
                if self.secrets_backend == SecretsBackend::Auto {
                    tracing::info!("detect-secrets not found; using built-in secrets scanner");
                }
                registry.register(PatternSecretsAnalyzer::new(secrets_timeout)?);
            }
        }
        Ok(registry)
    }
}
