//! Per-instance progress state.
//!
//! Lives as `state.json` inside the instance's state directory. Holds the
//! date chunks a list instance has fully finished and the reason the last
//! run stopped, which the orchestrator reads after the child exits.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{DateRange, ExitStatus};

pub const STATE_FILE_NAME: &str = "state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressState {
    /// Chunks whose pages and pending trend lookups have all drained.
    pub completed_chunks: BTreeSet<DateRange>,
    /// Why the last run stopped. Absent while a run is in flight.
    pub finish_reason: Option<ExitStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Handle to an instance's state directory.
#[derive(Debug)]
pub struct ProgressStore {
    dir: PathBuf,
    state: ProgressState,
}

impl ProgressStore {
    /// Load existing state, or start empty.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let state = read_state(&dir).await?.unwrap_or_default();
        Ok(Self { dir, state })
    }

    pub fn is_complete(&self, chunk: &DateRange) -> bool {
        self.state.completed_chunks.contains(chunk)
    }

    /// Clear any stale finish reason before doing work.
    pub async fn begin(&mut self) -> Result<()> {
        self.state.finish_reason = None;
        self.save().await
    }

    pub async fn mark_complete(&mut self, chunk: DateRange) -> Result<()> {
        if self.state.completed_chunks.insert(chunk) {
            self.save().await?;
        }
        Ok(())
    }

    pub async fn finish(&mut self, status: ExitStatus) -> Result<()> {
        self.state.finish_reason = Some(status);
        self.save().await
    }

    /// Write state atomically (temp file, then rename).
    async fn save(&mut self) -> Result<()> {
        self.state.updated_at = Some(Utc::now());
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(STATE_FILE_NAME);
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(&self.state)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Drop a finish reason left by an earlier run, so a child that dies before
/// writing its own cannot be mistaken for having stopped that way again.
pub async fn reset_finish_reason(dir: &Path) -> Result<()> {
    match read_state(dir).await? {
        Some(state) if state.finish_reason.is_some() => {
            let mut store = ProgressStore {
                dir: dir.to_path_buf(),
                state,
            };
            store.begin().await
        }
        _ => Ok(()),
    }
}

/// Finish reason recorded in a state directory, if any.
pub async fn read_finish_reason(dir: &Path) -> Result<Option<ExitStatus>> {
    Ok(read_state(dir).await?.and_then(|s| s.finish_reason))
}

async fn read_state(dir: &Path) -> Result<Option<ProgressState>> {
    match tokio::fs::read(dir.join(STATE_FILE_NAME)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}
