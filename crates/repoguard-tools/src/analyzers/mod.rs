//! Analyzer adapters.

pub mod markdown;
pub mod pattern_secrets;
pub mod python;
pub mod secrets;

pub use markdown::MarkdownAnalyzer;
pub use pattern_secrets::PatternSecretsAnalyzer;
pub use python::PythonAnalyzer;
pub use secrets::DetectSecretsAnalyzer;

/// Milliseconds elapsed since `start`.
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
