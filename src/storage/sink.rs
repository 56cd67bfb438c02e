//! JSON Lines output.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;
use crate::storage::ensure_parent;

/// Append-safe writer emitting one JSON object per line.
///
/// Opened in append mode unless told to overwrite, so output from earlier
/// runs and interrupted instances is preserved.
pub struct RecordSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl RecordSink {
    pub async fn open(path: impl Into<PathBuf>, overwrite: bool) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path).await?;
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(!overwrite)
            .truncate(overwrite)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written by this sink so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub async fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.written += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}
