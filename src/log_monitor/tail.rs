// Incremental reader over an append-only log file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::info;

use super::parse::parse_line;
use crate::error::LogMonitorError;
use crate::models::LogLine;

/// Most bytes consumed per poll; a larger backlog drains over several polls.
const MAX_READ_PER_POLL: u64 = 4 * 1024 * 1024;

/// Read position in one log file. The offset only moves forward, except when the
/// file shrinks (rotation/truncation), where it restarts at 0.
pub struct LogTail {
    path: PathBuf,
    file: File,
    offset: u64,
    carry: Vec<u8>,
}

impl LogTail {
    /// Opens `path` positioned at its current end: history is never replayed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LogMonitorError> {
        let path = path.as_ref().to_path_buf();
        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogMonitorError::FileNotFound(path));
            }
            Err(e) => return Err(e.into()),
        };
        let offset = file.metadata().await?.len();
        Ok(Self {
            path,
            file,
            offset,
            carry: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads whatever was appended since the last poll and returns the complete,
    /// well-formed lines in file order. A trailing partial line is kept for later.
    pub async fn poll(&mut self) -> std::io::Result<Vec<LogLine>> {
        let len = tokio::fs::metadata(&self.path).await?.len();
        if len < self.offset {
            info!(
                path = %self.path.display(),
                previous_offset = self.offset,
                len,
                "log file shrank; reading from start"
            );
            self.rewind().await?;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let delta = (len - self.offset).min(MAX_READ_PER_POLL);
        self.file.seek(SeekFrom::Start(self.offset)).await?;
        let mut chunk = vec![0u8; delta as usize];
        match self.file.read_exact(&mut chunk).await {
            Ok(_) => {}
            // Our handle points at a rotated-away file; the new one is read next poll.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                info!(path = %self.path.display(), "log file replaced; reopening");
                self.rewind().await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }
        self.offset += delta;
        self.carry.extend_from_slice(&chunk);

        Ok(self.drain_lines())
    }

    async fn rewind(&mut self) -> std::io::Result<()> {
        self.file = File::open(&self.path).await?;
        self.offset = 0;
        self.carry.clear();
        Ok(())
    }

    fn drain_lines(&mut self) -> Vec<LogLine> {
        let mut lines = Vec::new();
        while let Some(pos) = self.carry.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.carry.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let text = text.trim_end_matches(['\n', '\r']);
            if let Some(line) = parse_line(text) {
                lines.push(line);
            }
        }
        lines
    }
}
