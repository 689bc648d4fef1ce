//! Append-only JSON Lines sink
//!
//! One [`OutputWriter`] owns one sink file. Each [`OutputWriter::append`] serializes
//! a record, writes it followed by `\n`, flushes, and syncs to disk while holding
//! the sink lock, so concurrent workers can never interleave partial lines.

use crate::listing::Record;
use serde::Deserialize;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

/// Record separator of the sink format
const SEPARATOR: u8 = b'\n';

/// Chunk size used when scanning backwards for the last separator
const REPAIR_CHUNK: u64 = 4096;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Sink {} is unusable after an earlier write failure", .path.display())]
    Poisoned { path: PathBuf },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// What to do with an existing sink when opening it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Keep existing records and add new ones after them
    #[default]
    Append,
    /// Discard existing records
    Truncate,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Truncate => write!(f, "truncate"),
        }
    }
}

struct SinkState {
    file: File,
    /// Length of the file up to and including the last fully written record
    committed_len: u64,
    records: u64,
    failed: bool,
}

/// Thread-safe, append-only record sink
pub struct OutputWriter {
    path: PathBuf,
    state: Mutex<SinkState>,
}

impl OutputWriter {
    /// Opens `<directory>/<stem>.jsonl`, creating the directory if needed
    pub async fn open_in(directory: &Path, stem: &str, mode: WriteMode) -> OutputResult<Self> {
        Self::open(directory.join(format!("{}.jsonl", stem)), mode).await
    }

    /// Opens the sink at `path`
    ///
    /// In [`WriteMode::Append`] a trailing partial line left by an aborted process
    /// is cut back to the last complete record before anything new is written.
    pub async fn open(path: impl Into<PathBuf>, mode: WriteMode) -> OutputResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        if mode == WriteMode::Truncate {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .await?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        let committed_len = repair_tail(&mut file, &path).await?;

        match mode {
            WriteMode::Append if committed_len > 0 => tracing::warn!(
                path = %path.display(),
                bytes = committed_len,
                "appending to a non-empty sink; records from earlier runs are kept"
            ),
            WriteMode::Truncate => {
                tracing::info!(path = %path.display(), "sink truncated")
            }
            _ => {}
        }

        Ok(Self {
            path,
            state: Mutex::new(SinkState {
                file,
                committed_len,
                records: 0,
                failed: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records appended through this writer
    pub async fn records_written(&self) -> u64 {
        self.state.lock().await.records
    }

    /// Durably appends one record
    ///
    /// Returns only after the record and its separator are flushed and synced.
    /// On failure the file is cut back to the last committed record and the
    /// writer refuses all further appends.
    pub async fn append(&self, record: &Record) -> OutputResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(SEPARATOR);

        let mut sink = self.state.lock().await;

        if sink.failed {
            return Err(OutputError::Poisoned {
                path: self.path.clone(),
            });
        }

        if let Err(source) = write_line(&mut sink.file, &line).await {
            sink.failed = true;
            let committed = sink.committed_len;
            if let Err(e) = sink.file.set_len(committed).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "could not roll back partial record"
                );
            }
            return Err(OutputError::Write {
                path: self.path.clone(),
                source,
            });
        }

        sink.committed_len += line.len() as u64;
        sink.records += 1;
        Ok(())
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Truncates the file after its last separator and returns the resulting length
async fn repair_tail(file: &mut File, path: &Path) -> OutputResult<u64> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut end = len;
    let mut buf = vec![0u8; REPAIR_CHUNK as usize];

    while end > 0 {
        let start = end.saturating_sub(REPAIR_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(chunk).await?;

        if let Some(pos) = chunk.iter().rposition(|b| *b == SEPARATOR) {
            let keep = start + pos as u64 + 1;
            if keep < len {
                truncate_to(file, path, len, keep).await?;
            }
            return Ok(keep);
        }
        end = start;
    }

    truncate_to(file, path, len, 0).await?;
    Ok(0)
}

async fn truncate_to(file: &mut File, path: &Path, len: u64, keep: u64) -> OutputResult<()> {
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = len - keep,
        "removing partial record left by an interrupted run"
    );
    file.set_len(keep).await?;
    file.sync_data().await?;
    Ok(())
}
