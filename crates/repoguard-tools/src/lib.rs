//! Analyzer trait, subprocess runner, and built-in analyzers for RepoGuard.
//!
//! Provides the `Analyzer` trait and `AnalyzerRegistry`, a timeout-bounded
//! `CommandRunner`, a minimal MCP stdio client for sidecar analyzers, and the
//! analyzers themselves: detect-secrets, a built-in pattern secrets scanner,
//! pymarkdown, and a ruff check reached through `mcp-server-analyzer`.

pub mod analyzer;
pub mod analyzers;
pub mod mcp;
pub mod process;
pub mod truncation;
pub mod walk;

pub use analyzer::{Analyzer, AnalyzerRegistry};
pub use analyzers::{
    DetectSecretsAnalyzer, MarkdownAnalyzer, PatternSecretsAnalyzer, PythonAnalyzer,
};
pub use mcp::{McpServerCommand, McpSession};
pub use process::{find_executable, CommandRunner, ExecResult};
pub use truncation::{cap_issues, truncate_chars};
pub use walk::{has_extension, walk_files, DEFAULT_EXCLUDED_DIRS};
