//! Report persistence.

use std::path::Path;

use repoguard_types::Result;

/// Write the rendered report, creating parent directories as needed.
pub async fn write_report(path: &Path, markdown: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, markdown).await?;
    tracing::info!(path = %path.display(), bytes = markdown.len(), "Report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/scan_report.md");
        write_report(&path, "### Key Findings:\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "### Key Findings:\n");
    }

    #[tokio::test]
    async fn overwrites_previous_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_report.md");
        write_report(&path, "old").await.unwrap();
        write_report(&path, "new").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }
}
