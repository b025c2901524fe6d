use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use repoguard_types::{AnalyzerKind, Issue, RepoGuardError, ReportMeta, Result, Severity, ToolReport};

use super::elapsed_ms;
use crate::analyzer::Analyzer;
use crate::process::{find_executable, CommandRunner};
use crate::truncation::cap_issues;

/// Paths detect-secrets must never descend into.
pub const EXCLUDE_FILES_REGEX: &str =
    r"(\.git/|\.venv/|venv/|node_modules/|dist/|build/|__pycache__/)";

pub const MAX_SHOWN: usize = 5;

/// Runs `detect-secrets scan` on a file or directory.
#[derive(Debug, Clone)]
pub struct DetectSecretsAnalyzer {
    runner: CommandRunner,
    program: Option<PathBuf>,
    timeout: Duration,
}

impl DetectSecretsAnalyzer {
    /// Locate `detect-secrets` on `PATH`; a missing binary is reported per call.
    pub fn new(runner: CommandRunner, timeout: Duration) -> Self {
        Self {
            runner,
            program: find_executable("detect-secrets"),
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }
}

#[async_trait]
impl Analyzer for DetectSecretsAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Secrets
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn analyze(&self, target: &Path) -> Result<ToolReport> {
        let start = Instant::now();
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| RepoGuardError::ToolNotInstalled {
                tool: "detect-secrets".into(),
            })?;

        let abs = self.runner.working_directory().join(target);
        let abs = abs.to_string_lossy().to_string();
        let args = ["scan", "--all-files", "--exclude-files", EXCLUDE_FILES_REGEX, &abs];

        let result = self.runner.run(program, &args, self.timeout).await?;
        if result.timed_out {
            return Err(RepoGuardError::CommandTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            });
        }
        if result.exit_code != 0 && result.stdout.trim().is_empty() {
            let stderr = result.stderr.trim();
            return Err(RepoGuardError::AnalyzerError {
                tool: AnalyzerKind::Secrets.tool_name().into(),
                message: if stderr.is_empty() {
                    "Unknown error".into()
                } else {
                    stderr.to_string()
                },
            });
        }

        let issues = parse_baseline(&result.stdout)?;
        let (shown, total) = cap_issues(issues, MAX_SHOWN);
        let mut summary = format!("Found {total} potential secrets.");
        if total > MAX_SHOWN {
            summary.push_str(&format!(" (Displaying first {MAX_SHOWN} samples)"));
        }
        tracing::debug!(target = %target.display(), total, "detect-secrets finished");

        Ok(ToolReport {
            tool: AnalyzerKind::Secrets.tool_name().into(),
            target: target.display().to_string(),
            ok: total == 0,
            summary,
            issues: shown,
            meta: ReportMeta {
                duration_ms: elapsed_ms(start),
                files_checked: 1,
                total_issues: Some(total),
            },
        })
    }
}

/// Turn a detect-secrets JSON baseline into critical issues.
///
/// Empty output means no findings. Anything that is not a JSON object is an
/// analyzer error.
pub fn parse_baseline(stdout: &str) -> Result<Vec<Issue>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let baseline: Value =
        serde_json::from_str(stdout).map_err(|e| RepoGuardError::AnalyzerError {
            tool: AnalyzerKind::Secrets.tool_name().into(),
            message: format!("unparseable detect-secrets output: {e}"),
        })?;

    let mut issues = Vec::new();
    let Some(results) = baseline.get("results").and_then(|r| r.as_object()) else {
        return Ok(issues);
    };
    for (file, findings) in results {
        for finding in findings.as_array().into_iter().flatten() {
            let code = finding
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("SECRET");
            let line = finding.get("line_number").and_then(|l| l.as_u64());
            issues.push(
                Issue::new(Severity::Critical, code, "Potential secret detected").at(file, line),
            );
        }
    }
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_baseline_results() {
        let stdout = r#"{
            "version": "1.5.0",
            "results": {
                "config/.env": [
                    {"type": "AWS Access Key", "filename": "config/.env", "line_number": 2},
                    {"type": "Secret Keyword", "filename": "config/.env", "line_number": 3}
                ],
                "app.py": [{"type": "Base64 High Entropy String"}]
            }
        }"#;
        let issues = parse_baseline(stdout).unwrap();
        assert_eq!(issues.len(), 3);
        let aws = issues.iter().find(|i| i.code == "AWS Access Key").unwrap();
        assert_eq!(aws.severity, Severity::Critical);
        assert_eq!(aws.file.as_deref(), Some("config/.env"));
        assert_eq!(aws.line, Some(2));
        let b64 = issues.iter().find(|i| i.file.as_deref() == Some("app.py")).unwrap();
        assert_eq!(b64.line, None);
    }

    #[test]
    fn empty_output_is_clean() {
        assert!(parse_baseline("").unwrap().is_empty());
        assert!(parse_baseline(r#"{"results": {}}"#).unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_an_error() {
        let err = parse_baseline("Traceback (most recent call last)").unwrap_err();
        assert!(err.is_tool_level());
    }

    #[tokio::test]
    async fn missing_binary_is_not_installed() {
        let analyzer = DetectSecretsAnalyzer {
            runner: CommandRunner::new(std::env::temp_dir()),
            program: None,
            timeout: Duration::from_secs(1),
        };
        let err = analyzer.analyze(Path::new("x.env")).await.unwrap_err();
        assert!(matches!(err, RepoGuardError::ToolNotInstalled { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_without_stdout_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake-detect-secrets");
        std::fs::write(&fake, "#!/bin/sh\necho 'boom' >&2\nexit 2\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let analyzer = DetectSecretsAnalyzer::new(
            CommandRunner::new(dir.path()),
            Duration::from_secs(5),
        )
        .with_program(&fake);
        let err = analyzer.analyze(dir.path()).await.unwrap_err();
        match err {
            RepoGuardError::AnalyzerError { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn findings_are_capped_for_display() {
        let dir = tempfile::tempdir().unwrap();
        let findings: Vec<String> = (1..=7)
            .map(|n| format!(r#"{{"type": "Secret Keyword", "line_number": {n}}}"#))
            .collect();
        let baseline = format!(r#"{{"results": {{"a.env": [{}]}}}}"#, findings.join(","));
        let fake = dir.path().join("fake-detect-secrets");
        std::fs::write(&fake, format!("#!/bin/sh\ncat <<'JSON'\n{baseline}\nJSON\n")).unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let analyzer = DetectSecretsAnalyzer::new(
            CommandRunner::new(dir.path()),
            Duration::from_secs(5),
        )
        .with_program(&fake);
        let report = analyzer.analyze(Path::new("a.env")).await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.issues.len(), 5);
        assert_eq!(report.total_issues(), 7);
        assert_eq!(report.summary, "Found 7 potential secrets. (Displaying first 5 samples)");
    }
}
