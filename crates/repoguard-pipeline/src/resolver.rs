//! Target resolution: raw operator input to a capped, deduplicated file list,
//! plus per-target task planning.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};

use repoguard_tools::{has_extension, walk_files};
use repoguard_types::{RepoGuardError, Result, Task, TaskType};

use crate::config::ScanConfig;

/// Turns free-form input into candidate path strings.
///
/// Output is untrusted: the resolver re-grounds every candidate against the
/// filesystem before accepting it.
#[async_trait]
pub trait PathInterpreter: Send + Sync {
    async fn candidates(&self, input: &str) -> Result<Vec<String>>;
}

/// Picks path-looking tokens out of free text.
///
/// A token is kept when it contains a path separator, has an extension, or
/// starts with a dot. Surrounding quotes, backticks and trailing punctuation
/// are stripped.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicInterpreter;

#[async_trait]
impl PathInterpreter for HeuristicInterpreter {
    async fn candidates(&self, input: &str) -> Result<Vec<String>> {
        Ok(input
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .map(|t| {
                t.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '(' | ')' | '[' | ']'))
                    .trim_end_matches(['.', ':', '!', '?'])
            })
            .filter(|t| !t.is_empty())
            .filter(|t| t.contains('/') || t.contains('\\') || t.contains('.'))
            .map(str::to_string)
            .collect())
    }
}

/// Outcome of resolving one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub files: Vec<String>,
    /// Pre-cap count when the cap truncated the list.
    pub truncated_from: Option<usize>,
    pub warnings: Vec<String>,
    /// Interpreter candidates that did not exist on disk.
    pub rejected: Vec<String>,
}

pub struct TargetResolver {
    max_files: usize,
    ignored_dirs: Vec<String>,
    extensions: Vec<String>,
    ignore_globs: Option<GlobSet>,
    cwd: PathBuf,
    interpreter: Arc<dyn PathInterpreter>,
}

impl TargetResolver {
    pub fn new(config: &ScanConfig, cwd: impl Into<PathBuf>) -> Result<Self> {
        let ignore_globs = if config.ignore_globs.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &config.ignore_globs {
                let glob = Glob::new(pattern).map_err(|e| {
                    RepoGuardError::Config(format!("invalid ignore glob '{pattern}': {e}"))
                })?;
                builder.add(glob);
            }
            Some(
                builder
                    .build()
                    .map_err(|e| RepoGuardError::Config(e.to_string()))?,
            )
        };
        Ok(Self {
            max_files: config.max_files,
            ignored_dirs: config.ignored_dirs.clone(),
            extensions: config.extensions.clone(),
            ignore_globs,
            cwd: cwd.into(),
            interpreter: Arc::new(HeuristicInterpreter),
        })
    }

    pub fn with_interpreter(mut self, interpreter: Arc<dyn PathInterpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Resolve `input` to target files.
    ///
    /// A path that exists, as-is or under the working directory, is used
    /// directly; otherwise the interpreter supplies candidates, grounded the
    /// same way. Input that yields no candidate at all is rejected whole. The result is sorted and deduplicated, then capped.
    pub async fn resolve(&self, input: &str) -> Result<Resolution> {
        let input = input.trim();
        let mut resolution = Resolution::default();
        let mut found: BTreeSet<String> = BTreeSet::new();

        // An empty input would ground to the working dir itself.
        let direct = if input.is_empty() { None } else { self.ground(input) };
        if let Some(direct) = direct {
            self.collect(&direct, &mut found);
        } else if !input.is_empty() {
            let candidates = self.interpreter.candidates(input).await?;
            tracing::debug!(count = candidates.len(), "Interpreter proposed candidates");
            if candidates.is_empty() {
                resolution.rejected.push(input.to_string());
            }
            for candidate in candidates {
                match self.ground(&candidate) {
                    Some(path) => self.collect(&path, &mut found),
                    None => resolution.rejected.push(candidate),
                }
            }
        }

        let mut files: Vec<String> = found.into_iter().collect();
        if files.len() > self.max_files {
            let total = files.len();
            files.truncate(self.max_files);
            tracing::warn!(total, cap = self.max_files, "Target list truncated");
            resolution.truncated_from = Some(total);
            resolution.warnings.push(format!(
                "Found {total} files; scanning only the first {} (file cap).",
                self.max_files
            ));
        }
        resolution.files = files;
        Ok(resolution)
    }

    /// Accept a candidate only if it exists, as-is or under the working dir.
    fn ground(&self, candidate: &str) -> Option<PathBuf> {
        let as_is = PathBuf::from(candidate);
        if as_is.exists() {
            return Some(as_is);
        }
        let relative = self.cwd.join(candidate);
        relative.exists().then_some(relative)
    }

    fn collect(&self, path: &Path, found: &mut BTreeSet<String>) {
        if path.is_dir() {
            for file in walk_files(path, &self.ignored_dirs, &self.extensions) {
                if !self.glob_ignored(path, &file) {
                    found.insert(file.to_string_lossy().to_string());
                }
            }
        } else if path.is_file() {
            found.insert(path.to_string_lossy().to_string());
        }
    }

    fn glob_ignored(&self, root: &Path, file: &Path) -> bool {
        let Some(globs) = &self.ignore_globs else {
            return false;
        };
        let rel = file.strip_prefix(root).unwrap_or(file);
        globs.is_match(rel) || file.file_name().is_some_and(|n| globs.is_match(n))
    }
}

/// Planned tasks plus the targets that could not be planned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPlan {
    pub tasks: Vec<Task>,
    pub errors: Vec<String>,
}

/// Derive tasks per target: every target gets a secrets scan, `.py` targets
/// (or directories containing one) get python validation, `.md`/`.mdx` get
/// markdown validation. Missing targets become planning errors.
pub fn plan_tasks(targets: &[String], ignored_dirs: &[String]) -> TaskPlan {
    let mut plan = TaskPlan::default();
    for target in targets {
        let path = Path::new(target);
        if !path.exists() {
            plan.errors.push(format!("Path not found: {target}"));
            continue;
        }
        let (has_py, has_md) = if path.is_dir() {
            (
                !walk_files(path, ignored_dirs, &["py"]).is_empty(),
                !walk_files(path, ignored_dirs, &["md", "mdx"]).is_empty(),
            )
        } else {
            (
                has_extension(path, &["py"]),
                has_extension(path, &["md", "mdx"]),
            )
        };
        let task = |task_type| Task {
            task_type,
            target: target.clone(),
        };
        plan.tasks.push(task(TaskType::SecretsScan));
        if has_py {
            plan.tasks.push(task(TaskType::PythonValidate));
        }
        if has_md {
            plan.tasks.push(task(TaskType::MarkdownValidate));
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(max_files: usize, cwd: &Path) -> TargetResolver {
        let config = ScanConfig {
            max_files,
            ..ScanConfig::default()
        };
        TargetResolver::new(&config, cwd).unwrap()
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, "x").unwrap();
    }

    #[tokio::test]
    async fn directory_input_is_walked() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.py"));
        touch(&dir.path().join("docs/readme.md"));
        touch(&dir.path().join(".venv/lib/site.py"));
        touch(&dir.path().join("logo.png"));

        let r = resolver(30, dir.path())
            .resolve(dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(r.files.len(), 2);
        assert!(r.truncated_from.is_none());
        assert!(r.warnings.is_empty());
    }

    #[tokio::test]
    async fn explicit_file_is_accepted_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Makefile");
        touch(&file);
        let r = resolver(30, dir.path())
            .resolve(file.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(r.files, vec![file.to_string_lossy().to_string()]);
    }

    #[tokio::test]
    async fn cap_truncates_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..50 {
            touch(&dir.path().join(format!("f{i:02}.py")));
        }
        let r = resolver(30, dir.path())
            .resolve(dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(r.files.len(), 30);
        assert_eq!(r.truncated_from, Some(50));
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].contains("50"));
    }

    #[tokio::test]
    async fn resolving_twice_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.md", "a.py", "c.json"] {
            touch(&dir.path().join(name));
        }
        let res = resolver(30, dir.path());
        let input = dir.path().to_str().unwrap();
        let first = res.resolve(input).await.unwrap();
        let second = res.resolve(input).await.unwrap();
        assert_eq!(first, second);
        let mut sorted = first.files.clone();
        sorted.sort();
        assert_eq!(first.files, sorted);
    }

    #[tokio::test]
    async fn free_text_candidates_are_grounded_relative_to_cwd() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("src/app.py"));
        let r = resolver(30, dir.path())
            .resolve("please scan `src/app.py` and ghost/missing.py, thanks")
            .await
            .unwrap();
        assert_eq!(r.files.len(), 1);
        assert!(r.files[0].ends_with("app.py"));
        assert_eq!(r.rejected, vec!["ghost/missing.py"]);
    }

    #[tokio::test]
    async fn bare_directory_name_is_found_under_cwd() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("repo/app.py"));
        let r = resolver(30, dir.path()).resolve("repo").await.unwrap();
        assert_eq!(r.files.len(), 1);
        assert!(r.files[0].ends_with("app.py"));
        assert!(r.rejected.is_empty());
    }

    #[tokio::test]
    async fn unknown_bare_word_is_rejected_not_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(30, dir.path()).resolve("nothing").await.unwrap();
        assert!(r.files.is_empty());
        assert_eq!(r.rejected, vec!["nothing"]);
    }

    #[tokio::test]
    async fn duplicate_candidates_collapse() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.py"));
        let r = resolver(30, dir.path())
            .resolve("a.py, a.py; a.py")
            .await
            .unwrap();
        assert_eq!(r.files.len(), 1);
    }

    #[tokio::test]
    async fn empty_directory_resolves_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolver(30, dir.path())
            .resolve(dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(r.files.is_empty());
    }

    #[tokio::test]
    async fn ignore_globs_exclude_matches() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("keep.py"));
        touch(&dir.path().join("fixtures/data.json"));
        touch(&dir.path().join("notes.txt"));
        let config = ScanConfig {
            ignore_globs: vec!["fixtures/**".into(), "*.txt".into()],
            ..ScanConfig::default()
        };
        let r = TargetResolver::new(&config, dir.path())
            .unwrap()
            .resolve(dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(r.files.len(), 1);
        assert!(r.files[0].ends_with("keep.py"));
    }

    #[test]
    fn bad_glob_is_a_config_error() {
        let config = ScanConfig {
            ignore_globs: vec!["a[".into()],
            ..ScanConfig::default()
        };
        let err = TargetResolver::new(&config, ".").err().unwrap();
        assert!(matches!(err, RepoGuardError::Config(_)));
    }

    #[tokio::test]
    async fn heuristic_interpreter_extracts_paths() {
        let got = HeuristicInterpreter
            .candidates("check './repo/main.py' and docs/README.md.")
            .await
            .unwrap();
        assert_eq!(got, vec!["./repo/main.py", "docs/README.md"]);
    }

    #[test]
    fn plan_tasks_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let py = dir.path().join("a.py");
        let md = dir.path().join("b.md");
        let sub = dir.path().join("pkg");
        touch(&py);
        touch(&md);
        touch(&sub.join("mod.py"));
        let targets: Vec<String> = [&py, &md, &sub]
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .chain(std::iter::once("/nope/missing.py".to_string()))
            .collect();
        let ignored: Vec<String> = vec![".git".into()];

        let plan = plan_tasks(&targets, &ignored);
        let types_for = |t: &str| -> Vec<TaskType> {
            plan.tasks
                .iter()
                .filter(|task| task.target == t)
                .map(|task| task.task_type)
                .collect()
        };
        assert_eq!(
            types_for(&targets[0]),
            vec![TaskType::SecretsScan, TaskType::PythonValidate]
        );
        assert_eq!(
            types_for(&targets[1]),
            vec![TaskType::SecretsScan, TaskType::MarkdownValidate]
        );
        assert_eq!(
            types_for(&targets[2]),
            vec![TaskType::SecretsScan, TaskType::PythonValidate]
        );
        assert_eq!(plan.errors, vec!["Path not found: /nope/missing.py"]);
    }
}
