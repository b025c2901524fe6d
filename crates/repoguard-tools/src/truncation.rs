/// Display truncation for analyzer output.
///
/// Reports keep their true issue count in `meta.total_issues`; only the
/// rendered list and message text are shortened here.
use repoguard_types::Issue;

/// Shorten `text` to at most `max_chars` characters, appending `...` when cut.
///
/// Counts characters rather than bytes so multi-byte text never splits.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
    }
}

/// Keep the first `max` issues for display and return the untruncated total.
pub fn cap_issues(mut issues: Vec<Issue>, max: usize) -> (Vec<Issue>, usize) {
    let total = issues.len();
    issues.truncate(max);
    (issues, total)
}
