use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use repoguard_types::{AnalyzerKind, Issue, RepoGuardError, ReportMeta, Result, Severity, ToolReport};

use super::elapsed_ms;
use crate::analyzer::Analyzer;
use crate::mcp::{McpServerCommand, McpSession};
use crate::truncation::{cap_issues, truncate_chars};
use crate::walk::{walk_files, DEFAULT_EXCLUDED_DIRS};

pub const MAX_SHOWN: usize = 10;
pub const MESSAGE_CAP: usize = 1000;
pub const RUFF_TOOL: &str = "ruff-check";

/// Python linting through the `ruff-check` tool of an MCP sidecar.
///
/// File content, not the path, is sent to the sidecar. A fresh sidecar is
/// started per file.
#[derive(Debug, Clone)]
pub struct PythonAnalyzer {
    server: McpServerCommand,
    timeout: Duration,
}

impl PythonAnalyzer {
    pub fn new(server: McpServerCommand, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    async fn check_file(&self, file: &Path) -> Result<Option<String>> {
        let code = tokio::fs::read_to_string(file).await?;
        let mut session = McpSession::connect(&self.server).await?;
        let outcome = session
            .call_tool(RUFF_TOOL, serde_json::json!({ "code": code }))
            .await;
        session.shutdown().await;

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.display().to_string());
        Ok(interpret_ruff_output(&name, &outcome?))
    }
}

/// Decide whether a sidecar response is a finding.
///
/// Returns the report text for the file, or `None` when the response
/// explicitly signals zero issues. JSON with a positive `total_issues` is a
/// finding; any other JSON, non-JSON text, or an empty response is reported
/// as an advisory finding so nothing is silently dropped.
pub fn interpret_ruff_output(file_name: &str, text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(format!("File: {file_name}\nEmpty response from analyzer"));
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) if map.get("total_issues").is_some_and(Value::is_u64) => {
            let total = map.get("total_issues").and_then(Value::as_u64).unwrap_or(0);
            if total == 0 {
                return None;
            }
            let details = map
                .get("issues")
                .map(|i| serde_json::to_string_pretty(i).unwrap_or_else(|_| i.to_string()))
                .unwrap_or_else(|| "[]".to_string());
            Some(format!("File: {file_name} | Issues: {total}\n{details}"))
        }
        Ok(_) => Some(format!("File: {file_name}\n{trimmed}")),
        Err(_) if trimmed.contains("No issues found") => None,
        Err(_) => Some(format!("File: {file_name}\n{trimmed}")),
    }
}

#[async_trait]
impl Analyzer for PythonAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Python
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn analyze(&self, target: &Path) -> Result<ToolReport> {
        let start = Instant::now();
        let tool = AnalyzerKind::Python.tool_name();
        let target_str = target.display().to_string();

        if !target.exists() {
            return Ok(ToolReport::error(
                tool,
                &target_str,
                "NOT_FOUND",
                "Path not found",
                elapsed_ms(start),
            ));
        }

        let single = target.is_file();
        let files: Vec<PathBuf> = if single {
            vec![target.to_path_buf()]
        } else {
            walk_files(target, DEFAULT_EXCLUDED_DIRS, &["py"])
        };

        if files.is_empty() {
            return Ok(ToolReport {
                tool: tool.into(),
                target: target_str,
                ok: true,
                summary: "No Python files found.".into(),
                issues: Vec::new(),
                meta: ReportMeta {
                    duration_ms: elapsed_ms(start),
                    files_checked: 0,
                    total_issues: None,
                },
            });
        }

        let mut issues = Vec::new();
        for file in &files {
            let file_str = file.display().to_string();
            match self.check_file(file).await {
                Ok(None) => {}
                Ok(Some(report)) => issues.push(advisory(&file_str, &report)),
                // A lone file's failure belongs to the dispatcher; in a batch
                // it is recorded and the rest of the batch continues.
                Err(e) if single || matches!(e, RepoGuardError::ToolNotInstalled { .. }) => {
                    return Err(e)
                }
                Err(e) => {
                    tracing::warn!(file = %file_str, error = %e, "Python check failed");
                    let name = file
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| file_str.clone());
                    issues.push(advisory(
                        &file_str,
                        &format!("File: {name} - Error scanning: {e}"),
                    ));
                }
            }
        }

        let flagged = issues.len();
        let (shown, total) = cap_issues(issues, MAX_SHOWN);
        let summary = if flagged == 0 {
            format!("Scanned {} Python files. No issues found.", files.len())
        } else {
            format!(
                "Scanned {} Python files. Found issues in {} files.",
                files.len(),
                flagged
            )
        };

        Ok(ToolReport {
            tool: tool.into(),
            target: target_str,
            ok: flagged == 0,
            summary,
            issues: shown,
            meta: ReportMeta {
                duration_ms: elapsed_ms(start),
                files_checked: files.len(),
                total_issues: Some(total),
            },
        })
    }
}

fn advisory(file: &str, report: &str) -> Issue {
    Issue::new(
        Severity::Warning,
        "MCP_REPORT",
        truncate_chars(report, MESSAGE_CAP),
    )
    .at(file, None)
}
