//! Durable per-run checkpoints.
//!
//! The engine saves the full [`PipelineState`] after every transition to
//! `<state_dir>/<run_id>.json`. Writes go to a temp file first and are renamed
//! into place, so a crash mid-write leaves the previous checkpoint intact.

use std::path::{Path, PathBuf};

use repoguard_types::{PipelineState, RepoGuardError, Result};

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: &str) -> Result<PathBuf> {
        if run_id.is_empty()
            || run_id.contains(['/', '\\'])
            || run_id.starts_with('.')
        {
            return Err(RepoGuardError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        Ok(self.dir.join(format!("{run_id}.json")))
    }

    /// Persist `state`, replacing any earlier checkpoint for the run.
    pub async fn save(&self, state: &PipelineState) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&state.run_id)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", state.run_id));
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(run_id = %state.run_id, phase = %state.phase, path = %path.display(), "Checkpoint saved");
        Ok(path)
    }

    /// Returns `Ok(None)` when the run has no checkpoint.
    pub async fn load(&self, run_id: &str) -> Result<Option<PipelineState>> {
        let path = self.path_for(run_id)?;
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub async fn load_required(&self, run_id: &str) -> Result<PipelineState> {
        self.load(run_id)
            .await?
            .ok_or_else(|| RepoGuardError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// All readable checkpoints, oldest first. Unparseable files are skipped.
    pub async fn list(&self) -> Result<Vec<PipelineState>> {
        let mut states = Vec::new();
        if !tokio::fs::try_exists(&self.dir).await? {
            return Ok(states);
        }
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_checkpoint = path.extension().is_some_and(|e| e == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_checkpoint {
                continue;
            }
            let json = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<PipelineState>(&json) {
                Ok(state) => states.push(state),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint")
                }
            }
        }
        states.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(states)
    }

    pub async fn clear(&self, run_id: &str) -> Result<()> {
        let path = self.path_for(run_id)?;
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repoguard_types::Phase;

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("runs"));
        let mut state = PipelineState::new("run-1", "./repo");
        state.phase = Phase::AwaitingApproval;
        state.target_files = vec!["a.py".into()];

        let path = store.save(&state).await.unwrap();
        assert!(path.ends_with("run-1.json"));

        let loaded = store.load("run-1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn missing_run_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load("nope").await.unwrap().is_none());
        assert!(matches!(
            store.load_required("nope").await.unwrap_err(),
            RepoGuardError::RunNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn save_overwrites_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut state = PipelineState::new("r", "x");
        store.save(&state).await.unwrap();
        state.phase = Phase::Done;
        store.save(&state).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["r.json"]);
        assert_eq!(store.load("r").await.unwrap().unwrap().phase, Phase::Done);
    }

    #[tokio::test]
    async fn list_returns_runs_oldest_first_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let first = PipelineState::new("first", "x");
        let mut second = PipelineState::new("second", "y");
        second.created_at = first.created_at + chrono::Duration::seconds(5);
        store.save(&second).await.unwrap();
        store.save(&first).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let runs = store.list().await.unwrap();
        let ids: Vec<_> = runs.iter().map(|s| s.run_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn path_like_run_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load("../etc/passwd").await.is_err());
        assert!(store.load("").await.is_err());
    }

    #[tokio::test]
    async fn clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(&PipelineState::new("r", "x")).await.unwrap();
        store.clear("r").await.unwrap();
        assert!(store.load("r").await.unwrap().is_none());
    }
}
