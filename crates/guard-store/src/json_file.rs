//! JSON file state store.

use async_trait::async_trait;
use guard_core::error::StoreError;
use guard_core::traits::StateStore;
use guard_core::types::{RecapSummary, UserId, UserRiskState};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Directory-backed store.
///
/// Layout under the root directory:
/// - `users/<id>.json`: current state, replaced atomically on every save
/// - `recaps/<id>.jsonl`: one archived recap per line
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `root`, creating the directories if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("users"))?;
        fs::create_dir_all(root.join("recaps"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self, user: UserId) -> PathBuf {
        self.root.join("users").join(format!("{}.json", user))
    }

    fn recap_path(&self, user: UserId) -> PathBuf {
        self.root.join("recaps").join(format!("{}.jsonl", user))
    }

    /// Read back every archived recap for a user, oldest first.
    pub async fn load_recaps(&self, user: UserId) -> Result<Vec<RecapSummary>, StoreError> {
        let contents = match tokio::fs::read_to_string(self.recap_path(user)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

/// Write `bytes` to a temp file next to `path`, sync it, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "state path has no parent"))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn append_line(path: &Path, line: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line)?;
    file.write_all(b"\n")?;
    file.sync_all()
}

async fn blocking<F>(f: F) -> Result<(), StoreError>
where
    F: FnOnce() -> io::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
        .map_err(StoreError::from)
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_state(&self, user: UserId) -> Result<Option<UserRiskState>, StoreError> {
        let bytes = match tokio::fs::read(self.state_path(user)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save_state(&self, user: UserId, state: &UserRiskState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let path = self.state_path(user);
        debug!(user = %user, path = %path.display(), "Saving state");
        blocking(move || write_atomic(&path, &bytes)).await
    }

    async fn archive_recap(&self, user: UserId, summary: &RecapSummary) -> Result<(), StoreError> {
        let line = serde_json::to_vec(summary)?;
        let path = self.recap_path(user);
        blocking(move || append_line(&path, &line)).await
    }

    fn name(&self) -> &str {
        "json-file"
    }
}
