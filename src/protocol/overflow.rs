//! # Overflow log for unhandled messages.
//!
//! Append-only text sink shared by every session. Each unhandled frame is written
//! as received, one per line, and flushed. Line breaks inside a frame can only be
//! JSON whitespace and are written as spaces. The file is opened lazily in append
//! mode and reopened after a write error.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Shared append-only sink.
#[derive(Debug)]
pub struct OverflowLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl OverflowLog {
    /// Creates a sink writing to `path`; nothing is opened until the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the frame text `raw` as one line and flushes.
    pub async fn append(&self, raw: &str) -> std::io::Result<()> {
        let mut line = raw.trim_end_matches(['\r', '\n']).replace(['\r', '\n'], " ");
        line.push('\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(file);
        }
        let Some(file) = guard.as_mut() else {
            return Ok(());
        };

        let res = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if res.is_err() {
            *guard = None;
        }
        res
    }
}
