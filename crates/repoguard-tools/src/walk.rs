use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Directory names pruned from every recursive enumeration.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".venv",
    "venv",
    "env",
    "node_modules",
    "__pycache__",
    "dist",
    "build",
    ".idea",
    ".vscode",
];

/// True when the file name ends with `.<ext>` for one of `extensions`.
///
/// Suffix matching on the whole name keeps dotfiles such as `.env` eligible,
/// which `Path::extension` would not.
pub fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    extensions.iter().any(|ext| {
        let ext = ext.as_ref().trim_start_matches('.');
        !ext.is_empty() && name.ends_with(&format!(".{ext}"))
    })
}

/// Recursively list files under `root`, pruning `excluded_dirs` by name and
/// keeping only files matching `extensions`. An empty extension list keeps
/// every file. Unreadable entries are skipped. The result is sorted.
pub fn walk_files<S: AsRef<str>, E: AsRef<str>>(
    root: &Path,
    excluded_dirs: &[S],
    extensions: &[E],
) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !excluded_dirs.iter().any(|d| d.as_ref() == name)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| extensions.is_empty() || has_extension(p, extensions))
        .collect();
    files.sort();
    files
}
