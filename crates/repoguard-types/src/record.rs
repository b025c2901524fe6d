//! Analyzer output records and planning tasks.
//!
//! Records originate from independently evolving analyzers, so every field of
//! [`ToolReport`] and [`Issue`] has a serde default: a malformed payload
//! deserializes into something the aggregator can still count.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AnalyzerKind
// ---------------------------------------------------------------------------

/// The three analyzers the dispatcher knows how to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Markdown,
    Python,
    Secrets,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 3] = [
        AnalyzerKind::Markdown,
        AnalyzerKind::Python,
        AnalyzerKind::Secrets,
    ];

    /// Short identifier used in `ResultRecord::tool_used` and classifier output.
    pub fn id(self) -> &'static str {
        match self {
            AnalyzerKind::Markdown => "markdown",
            AnalyzerKind::Python => "python",
            AnalyzerKind::Secrets => "secrets",
        }
    }

    /// Display name carried in `ToolReport::tool`.
    pub fn tool_name(self) -> &'static str {
        match self {
            AnalyzerKind::Markdown => "MarkdownValidator",
            AnalyzerKind::Python => "PythonCodeValidator",
            AnalyzerKind::Secrets => "SecretsValidator",
        }
    }

    /// Lenient parse of a classifier token ("python", " Secrets ", "MarkdownValidator").
    pub fn from_token(token: &str) -> Option<Self> {
        let t = token.trim().to_ascii_lowercase();
        if t.is_empty() {
            return None;
        }
        AnalyzerKind::ALL
            .into_iter()
            .find(|k| t.contains(k.id()) || t == k.tool_name().to_ascii_lowercase())
    }

    /// Map a display tool name back to its kind.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        AnalyzerKind::ALL.into_iter().find(|k| k.tool_name() == name)
    }

    pub fn task_type(self) -> TaskType {
        match self {
            AnalyzerKind::Markdown => TaskType::MarkdownValidate,
            AnalyzerKind::Python => TaskType::PythonValidate,
            AnalyzerKind::Secrets => TaskType::SecretsScan,
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// ---------------------------------------------------------------------------
// Task: planning output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    MarkdownValidate,
    PythonValidate,
    SecretsScan,
}

impl TaskType {
    pub fn analyzer(self) -> AnalyzerKind {
        match self {
            TaskType::MarkdownValidate => AnalyzerKind::Markdown,
            TaskType::PythonValidate => AnalyzerKind::Python,
            TaskType::SecretsScan => AnalyzerKind::Secrets,
        }
    }
}

/// A (file-or-directory, analyzer) pairing produced during planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub target: String,
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_issue_code")]
    pub code: String,
    #[serde(default = "default_issue_message")]
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u64>,
}

fn default_issue_code() -> String {
    "UNKNOWN".to_string()
}

fn default_issue_message() -> String {
    "Unknown Error".to_string()
}

impl Issue {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: Option<u64>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }
}

// ---------------------------------------------------------------------------
// ToolReport: structured analyzer finding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMeta {
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub files_checked: usize,
    /// Issue count before display truncation. Absent on reports that were
    /// never truncated, in which case `issues.len()` is the total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_issues: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReport {
    #[serde(default = "default_tool")]
    pub tool: String,
    #[serde(default)]
    pub target: String,
    #[serde(default = "default_ok")]
    pub ok: bool,
    #[serde(default = "default_summary")]
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub meta: ReportMeta,
}

fn default_tool() -> String {
    "Unknown Tool".to_string()
}

fn default_ok() -> bool {
    true
}

fn default_summary() -> String {
    "No summary.".to_string()
}

impl ToolReport {
    /// Error-shaped report for a tool that could not produce findings.
    pub fn error(
        tool: impl Into<String>,
        target: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        let message = message.into();
        Self {
            tool: tool.into(),
            target: target.into(),
            ok: false,
            summary: format!("Error: {}", message),
            issues: vec![Issue::new(Severity::Error, code, message)],
            meta: ReportMeta {
                duration_ms,
                files_checked: 0,
                total_issues: None,
            },
        }
    }

    /// Number of issues found before display truncation.
    pub fn total_issues(&self) -> usize {
        self.meta.total_issues.unwrap_or(self.issues.len())
    }
}

// ---------------------------------------------------------------------------
// ResultRecord: one analyzer's output for one file
// ---------------------------------------------------------------------------

/// Either a structured report or an error payload.
///
/// `Failure` is tried first and rejects unknown fields, so any object that is
/// not exactly `{"error": ...}` falls through to the defaulted `Report`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Failure(FailurePayload),
    Report(ToolReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailurePayload {
    pub error: String,
}

impl ResultPayload {
    pub fn failure(error: impl Into<String>) -> Self {
        ResultPayload::Failure(FailurePayload {
            error: error.into(),
        })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResultPayload::Failure(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub file: String,
    pub tool_used: String,
    pub details: ResultPayload,
}

impl ResultRecord {
    pub fn report(file: impl Into<String>, kind: AnalyzerKind, report: ToolReport) -> Self {
        Self {
            file: file.into(),
            tool_used: kind.id().to_string(),
            details: ResultPayload::Report(report),
        }
    }

    pub fn failure(file: impl Into<String>, kind: AnalyzerKind, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            tool_used: kind.id().to_string(),
            details: ResultPayload::failure(error),
        }
    }

    /// Dedup key: at most one record per (file, tool) pair survives a merge.
    pub fn key(&self) -> (&str, &str) {
        (&self.file, &self.tool_used)
    }
}
