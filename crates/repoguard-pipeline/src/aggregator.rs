//! Result aggregation and report rendering.
//!
//! Aggregation is order-insensitive for every count; record order only
//! affects the order findings are listed in.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use repoguard_tools::truncate_chars;
use repoguard_types::{AnalyzerKind, ResultPayload, ResultRecord, Result};

pub const NEXT_REVIEW: &str = "Review the critical findings listed above.";
pub const NEXT_ROTATE: &str = "URGENT: Rotate exposed secrets and add them to `.gitignore`.";
pub const NEXT_RUFF: &str = "Run `ruff check .` locally to fix any linting errors.";
pub const NEXT_SAFE: &str = "No critical issues found. Code is safe to merge.";

/// Machine-readable summary embedded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub scan_target: String,
    pub total_files_scanned: usize,
    pub total_issues_found: usize,
    pub tools_executed: usize,
    pub tool_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalReport {
    pub summary: ScanSummary,
    /// One `[tool] file: summary` line per report.
    #[serde(skip)]
    pub key_findings: Vec<String>,
    pub critical_findings: Vec<String>,
    pub scan_failures: Vec<String>,
    pub next_steps: Vec<String>,
}

/// Fold every record into a [`FinalReport`].
///
/// `message_cap` bounds each critical finding's message length.
pub fn aggregate(results: &[ResultRecord], scan_target: &str, message_cap: usize) -> FinalReport {
    let mut total_files = 0;
    let mut total_issues = 0;
    let mut key_findings = Vec::new();
    let mut critical = Vec::new();
    let mut failures = Vec::new();
    let mut secrets_critical = false;
    let mut python_ran = false;

    for record in results {
        let kind = AnalyzerKind::from_token(&record.tool_used);
        if kind == Some(AnalyzerKind::Python) {
            python_ran = true;
        }
        match &record.details {
            ResultPayload::Failure(failure) => {
                let tool = kind.map(|k| k.tool_name()).unwrap_or(record.tool_used.as_str());
                failures.push(format!("[{tool}] {}: {}", record.file, failure.error));
            }
            ResultPayload::Report(report) => {
                total_files += report.meta.files_checked;
                total_issues += report.total_issues();
                key_findings.push(format!("[{}] {}: {}", report.tool, record.file, report.summary));
                if report.ok {
                    continue;
                }
                if AnalyzerKind::from_tool_name(&report.tool) == Some(AnalyzerKind::Python) {
                    python_ran = true;
                }
                for issue in &report.issues {
                    let line = issue
                        .line
                        .map(|l| format!(" at Line {l}"))
                        .unwrap_or_default();
                    critical.push(format!(
                        "[{}] {}{}",
                        report.tool,
                        truncate_chars(&issue.message, message_cap),
                        line
                    ));
                    if report.tool == AnalyzerKind::Secrets.tool_name() {
                        secrets_critical = true;
                    }
                }
            }
        }
    }

    let mut next_steps = Vec::new();
    if !critical.is_empty() {
        next_steps.push(NEXT_REVIEW.to_string());
        if secrets_critical {
            next_steps.push(NEXT_ROTATE.to_string());
        }
        if python_ran {
            next_steps.push(NEXT_RUFF.to_string());
        }
    }
    if !failures.is_empty() {
        next_steps.push(format!(
            "{} analyzer run(s) failed; fix the tool setup and re-run the scan before merging.",
            failures.len()
        ));
    }
    if next_steps.is_empty() {
        next_steps.push(NEXT_SAFE.to_string());
    }

    FinalReport {
        summary: ScanSummary {
            scan_target: scan_target.to_string(),
            total_files_scanned: total_files,
            total_issues_found: total_issues,
            tools_executed: results.len(),
            tool_failures: failures.len(),
        },
        key_findings,
        critical_findings: critical,
        scan_failures: failures,
        next_steps,
    }
}

impl FinalReport {
    /// Render the Markdown report with its trailing JSON block.
    pub fn render(&self) -> Result<String> {
        let s = &self.summary;
        let mut out = String::new();
        let _ = writeln!(out, "### Key Findings:");
        let _ = writeln!(out, "- **Scan Target:** {}", s.scan_target);
        let _ = writeln!(out, "- **Total Files Scanned:** {}", s.total_files_scanned);
        let _ = writeln!(out, "- **Total Issues Found:** {}", s.total_issues_found);
        let _ = writeln!(out, "- **Tools Executed:** {}", s.tools_executed);
        if s.tool_failures > 0 {
            let _ = writeln!(out, "- **Tool Failures:** {}", s.tool_failures);
        }
        for finding in &self.key_findings {
            let _ = writeln!(out, "- {finding}");
        }

        let _ = writeln!(out, "\n### Critical Findings:");
        if self.critical_findings.is_empty() {
            let _ = writeln!(out, "- None. Great job!");
        }
        for finding in &self.critical_findings {
            let _ = writeln!(out, "- {finding}");
        }

        if !self.scan_failures.is_empty() {
            let _ = writeln!(out, "\n### Scan Failures:");
            for failure in &self.scan_failures {
                let _ = writeln!(out, "- {failure}");
            }
        }

        let _ = writeln!(out, "\n### Recommended Next Steps:");
        for (idx, step) in self.next_steps.iter().enumerate() {
            let _ = writeln!(out, "{}. {step}", idx + 1);
        }

        let json = serde_json::to_string_pretty(self)?;
        let _ = write!(out, "\n```json\n{json}\n```\n");
        Ok(out)
    }
}
