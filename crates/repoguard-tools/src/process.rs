//! Timeout-bounded subprocess execution for external analyzers.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;

use repoguard_types::Result;

/// Result of running an external command.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Runs analyzer binaries directly (no shell) from a fixed working directory.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    working_dir: PathBuf,
}

impl CommandRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    /// Environment handed to analyzers: credentials-looking variables are
    /// stripped, the basics are always kept.
    pub(crate) fn filtered_env() -> HashMap<String, String> {
        let exclude_suffixes: &[&str] = &[
            "_api_key",
            "_secret",
            "_token",
            "_password",
            "_credential",
        ];
        let always_include: &[&str] = &[
            "PATH", "HOME", "USER", "SHELL", "LANG", "TERM", "TMPDIR",
        ];

        let mut result = HashMap::new();
        for (key, value) in std::env::vars() {
            let lower = key.to_lowercase();
            if always_include.contains(&key.as_str())
                || !exclude_suffixes.iter().any(|s| lower.ends_with(s))
            {
                result.insert(key, value);
            }
        }
        result
    }

    /// Run `program` with `args`, killing it (and its process group) once
    /// `timeout` elapses. A timeout is reported through `ExecResult::timed_out`
    /// rather than as an error so callers can shape it into a tool failure.
    pub async fn run<S: AsRef<OsStr>>(
        &self,
        program: impl AsRef<OsStr>,
        args: &[S],
        timeout: Duration,
    ) -> Result<ExecResult> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .current_dir(&self.working_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .env_clear()
            .envs(Self::filtered_env())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let start = tokio::time::Instant::now();
        let mut child = cmd.spawn()?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        // Drain both pipes concurrently with the wait so a chatty analyzer
        // cannot block on a full pipe buffer.
        let drain = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            if let Some(ref mut s) = stdout {
                let _ = s.read_to_end(&mut out).await;
            }
            if let Some(ref mut s) = stderr {
                let _ = s.read_to_end(&mut err).await;
            }
            (out, err)
        };

        let waited = tokio::time::timeout(timeout, async {
            let (status, (out, err)) = tokio::join!(child.wait(), drain);
            (status, out, err)
        })
        .await;

        match waited {
            Ok((status, out, err)) => {
                let status = status?;
                Ok(ExecResult {
                    stdout: String::from_utf8_lossy(&out).to_string(),
                    stderr: String::from_utf8_lossy(&err).to_string(),
                    exit_code: status.code().unwrap_or(-1),
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            Err(_) => {
                #[cfg(unix)]
                {
                    if let Some(pid) = child.id() {
                        // SAFETY: signalling our own child's process group.
                        unsafe {
                            libc::kill(-(pid as i32), libc::SIGTERM);
                        }
                    }
                    tokio::select! {
                        _ = child.wait() => {}
                        _ = tokio::time::sleep(Duration::from_secs(2)) => {
                            let _ = child.kill().await;
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = child.kill().await;
                }

                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Analyzer command timed out");
                Ok(ExecResult {
                    stdout: String::new(),
                    stderr: format!("Command timed out after {}ms", timeout.as_millis()),
                    exit_code: -1,
                    timed_out: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}

/// Locate an executable on `PATH`, falling back to the active virtualenv's
/// `bin`/`Scripts` directory.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();
    if let Some(venv) = std::env::var_os("VIRTUAL_ENV") {
        let venv = PathBuf::from(venv);
        dirs.push(venv.join("bin"));
        dirs.push(venv.join("Scripts"));
    }

    let candidates: Vec<String> = if cfg!(windows) {
        vec![format!("{name}.exe"), format!("{name}.cmd"), name.to_string()]
    } else {
        vec![name.to_string()]
    };

    dirs.iter()
        .flat_map(|dir| candidates.iter().map(move |c| dir.join(c)))
        .find(|p| p.is_file())
}
