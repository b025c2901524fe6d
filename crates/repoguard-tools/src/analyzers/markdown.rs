use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;

use repoguard_types::{AnalyzerKind, Issue, RepoGuardError, ReportMeta, Result, Severity, ToolReport};

use super::elapsed_ms;
use crate::analyzer::Analyzer;
use crate::process::{find_executable, CommandRunner};
use crate::truncation::cap_issues;
use crate::walk::{has_extension, walk_files, DEFAULT_EXCLUDED_DIRS};

pub const MAX_SHOWN: usize = 10;
const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx"];

/// Lints Markdown with `pymarkdown scan`, one invocation per file so that a
/// single unreadable document cannot sink a directory scan.
#[derive(Debug, Clone)]
pub struct MarkdownAnalyzer {
    runner: CommandRunner,
    program: Option<PathBuf>,
    timeout: Duration,
}

impl MarkdownAnalyzer {
    pub fn new(runner: CommandRunner, timeout: Duration) -> Self {
        Self {
            runner,
            program: find_executable("pymarkdown"),
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    async fn lint_file(&self, program: &Path, file: &Path) -> Result<Vec<Issue>> {
        let file_str = file.to_string_lossy().to_string();
        let result = self
            .runner
            .run(program, &["scan", file_str.as_str()], self.timeout)
            .await?;
        if result.timed_out {
            return Ok(vec![file_error(
                &file_str,
                format!("pymarkdown timed out after {}ms", self.timeout.as_millis()),
            )]);
        }
        match result.exit_code {
            0 | 1 => {
                let mut issues = parse_pymarkdown_output(&result.stdout);
                for issue in &mut issues {
                    if issue.file.is_none() {
                        issue.file = Some(file_str.clone());
                    }
                }
                Ok(issues)
            }
            code => {
                let stderr = result.stderr.trim();
                let message = if stderr.is_empty() {
                    format!("pymarkdown exited with status {code}")
                } else {
                    stderr.to_string()
                };
                Ok(vec![file_error(&file_str, message)])
            }
        }
    }
}

fn file_error(file: &str, message: String) -> Issue {
    Issue::new(Severity::Error, "MARKDOWN_FILE_ERROR", message).at(file, None)
}

fn line_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?):(\d+):(\d+): ([A-Za-z0-9]+): (.*)$").ok())
        .as_ref()
}

/// Parse `pymarkdown scan` text output (`path:line:col: MDxxx: description`).
/// Lines in any other shape are ignored.
pub fn parse_pymarkdown_output(stdout: &str) -> Vec<Issue> {
    let Some(re) = line_regex() else {
        return Vec::new();
    };
    stdout
        .lines()
        .filter_map(|line| re.captures(line.trim_end()))
        .map(|caps| {
            Issue::new(Severity::Warning, &caps[4], caps[5].trim())
                .at(&caps[1], caps[2].parse().ok())
        })
        .collect()
}

#[async_trait]
impl Analyzer for MarkdownAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Markdown
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn analyze(&self, target: &Path) -> Result<ToolReport> {
        let start = Instant::now();
        let tool = AnalyzerKind::Markdown.tool_name();
        let target_str = target.display().to_string();

        if !target.exists() {
            return Ok(ToolReport::error(
                tool,
                &target_str,
                "TARGET_NOT_FOUND",
                format!("Target not found: {target_str}"),
                elapsed_ms(start),
            ));
        }

        let files = if target.is_file() {
            if !has_extension(target, MARKDOWN_EXTENSIONS) {
                let name = target
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| target_str.clone());
                return Ok(ToolReport::error(
                    tool,
                    &target_str,
                    "NOT_MARKDOWN",
                    format!("File is not .md/.mdx: {name}"),
                    elapsed_ms(start),
                ));
            }
            vec![target.to_path_buf()]
        } else {
            walk_files(target, DEFAULT_EXCLUDED_DIRS, MARKDOWN_EXTENSIONS)
        };

        let program = self
            .program
            .as_ref()
            .ok_or_else(|| RepoGuardError::ToolNotInstalled {
                tool: "pymarkdown".into(),
            })?;

        let mut issues = Vec::new();
        for file in &files {
            match self.lint_file(program, file).await {
                Ok(found) => issues.extend(found),
                Err(e) => issues.push(file_error(&file.display().to_string(), e.to_string())),
            }
        }

        let (shown, total) = cap_issues(issues, MAX_SHOWN);
        let mut summary = format!("Scanned {} files. Found {} issues.", files.len(), total);
        if total > MAX_SHOWN {
            summary.push_str(&format!(" (Showing first {MAX_SHOWN} only)"));
        }
        tracing::debug!(target = %target_str, files = files.len(), total, "pymarkdown finished");

        Ok(ToolReport {
            tool: tool.into(),
            target: target_str,
            ok: total == 0,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scan_lines() {
        let out = "docs/README.md:1:1: MD041: First line in file should be a top level heading (first-line-heading,first-line-h1)\n\
                   docs/README.md:3:10: MD047: Each file should end with a single newline character. (single-trailing-newline)\n\
                   some unrelated noise\n";
        let issues = parse_pymarkdown_output(out);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].code, "MD041");
        assert_eq!(issues[0].line, Some(1));
        assert_eq!(issues[0].file.as_deref(), Some("docs/README.md"));
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(issues[1].message.starts_with("Each file should end"));
    }

    #[test]
    fn windows_paths_keep_drive_letter() {
        let issues = parse_pymarkdown_output(r"C:\repo\a.md:4:1: MD022: Headings should be surrounded by blank lines.");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file.as_deref(), Some(r"C:\repo\a.md"));
        assert_eq!(issues[0].line, Some(4));
    }

    #[tokio::test]
    async fn non_markdown_file_is_an_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.py");
        std::fs::write(&path, "x = 1\n").unwrap();
        let analyzer = MarkdownAnalyzer::new(CommandRunner::new(dir.path()), Duration::from_secs(5));
        let report = analyzer.analyze(&path).await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.issues[0].code, "NOT_MARKDOWN");
        assert_eq!(report.summary, "Error: File is not .md/.mdx: app.py");
    }

    #[tokio::test]
    async fn missing_target_is_an_error_report() {
        let analyzer =
            MarkdownAnalyzer::new(CommandRunner::new(std::env::temp_dir()), Duration::from_secs(5));
        let report = analyzer
            .analyze(Path::new("/definitely/not/here.md"))
            .await
            .unwrap();
        assert_eq!(report.issues[0].code, "TARGET_NOT_FOUND");
    }

    #[cfg(unix)]
    fn fake_pymarkdown(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        // Flags files containing "bad", crashes on files containing "crash".
        let script = r#"#!/bin/sh
f="$2"
if grep -q crash "$f"; then echo "parser exploded" >&2; exit 3; fi
if grep -q bad "$f"; then echo "$f:2:1: MD009: Trailing spaces [Expected: 0 or 2; Actual: 1]"; exit 1; fi
exit 0
"#;
        let path = dir.join("fake-pymarkdown");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn directory_scan_isolates_per_file_errors() {
        let bin = tempfile::tempdir().unwrap();
        let fake = fake_pymarkdown(bin.path());
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.md"), "# Title\n").unwrap();
        std::fs::write(dir.path().join("bad.md"), "# Title\nbad \n").unwrap();
        std::fs::write(dir.path().join("crash.md"), "crash\n").unwrap();

        let analyzer = MarkdownAnalyzer::new(CommandRunner::new(dir.path()), Duration::from_secs(5))
            .with_program(&fake);
        let report = analyzer.analyze(dir.path()).await.unwrap();
        assert_eq!(report.meta.files_checked, 3);
        assert_eq!(report.total_issues(), 2);
        let codes: Vec<_> = report.issues.iter().map(|i| i.code.as_str()).collect();
        assert!(codes.contains(&"MD009"));
        assert!(codes.contains(&"MARKDOWN_FILE_ERROR"));
        assert!(!report.ok);
        assert_eq!(report.summary, "Scanned 3 files. Found 2 issues.");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn clean_file_is_ok() {
        let bin = tempfile::tempdir().unwrap();
        let fake = fake_pymarkdown(bin.path());
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("good.md");
        std::fs::write(&file, "# Title\n").unwrap();
        let analyzer = MarkdownAnalyzer::new(CommandRunner::new(dir.path()), Duration::from_secs(5))
            .with_program(&fake);
        let report = analyzer.analyze(&file).await.unwrap();
        assert!(report.ok);
        assert_eq!(report.meta.files_checked, 1);
        assert_eq!(report.summary, "Scanned 1 files. Found 0 issues.");
    }
}
