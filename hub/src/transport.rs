//! # Upstream transport contract
//!
//! The upstream message transport itself is treated as an external collaborator whose contract
//! we specify but whose wire format we don't fully own: only its offset-tracking and
//! message-delivery shape matters to the router. [`UpstreamEvent`] is that shape; [`Transport`]
//! is the minimal interface the intake loop drives it through. [`FileTailTransport`] is the
//! concrete implementation for a tailed directory of newline-delimited JSON log files;
//! [`VecTransport`] is an in-memory double used by tests and by a canned-replay binary.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

/// One delivered upstream message: a wire kind string (one of the `UpstreamKind` strings
/// `hub_data::kind` parses), the opaque payload bytes, and the offset this message was read at so
/// it can be persisted alongside the events it produces — a commit flush advances both the
/// consumer offset and the data atomically.
#[derive(Debug, Clone)]
pub struct UpstreamEvent {
    pub kind: String,
    pub payload: Vec<u8>,
    pub offset: i64,
}

/// The minimal contract the intake loop needs from whatever upstream transport is configured:
/// deliver messages in commit order starting from a supplied offset, and signal "nothing new
/// right now" by returning `Ok(None)` — the intake loop treats that as a reason to wait briefly
/// and poll again, not as a permanent end of stream, since a tailed source can always receive
/// more data later.
#[async_trait]
pub trait Transport: Send {
    /// Resumes delivery from `offset` (the last persisted offset, or the configured start
    /// offset if the store has none yet).
    async fn seek(&mut self, offset: i64) -> std::io::Result<()>;

    /// Returns the next message, or `Ok(None)` if none is currently available.
    async fn next(&mut self) -> std::io::Result<Option<UpstreamEvent>>;
}

/// One line of a tailed log file: `{"kind": "...", "payload": <anything>}`. `payload` is
/// re-serialised to bytes as-is and handed to the router, which is the only thing that knows how
/// to interpret each kind's shape.
#[derive(Debug, Clone, serde::Deserialize)]
struct LogLine {
    kind: String,
    payload: serde_json::Value,
}

/// Tails a directory of numbered, append-only newline-delimited JSON log files
/// (`00000000.log`, `00000001.log`, ...), the file-tail upstream source `HubConfig` describes.
///
/// The offset this transport hands back is `(file_number << 32) | byte_offset_within_file`,
/// matching the resume-offset layout the file-tail source uses (as opposed to a per-partition
/// offset, which is what the log-topic source would use instead).
pub struct FileTailTransport {
    directory: PathBuf,
    file_number: u32,
    reader: Option<BufReader<tokio::fs::File>>,
    byte_offset: u64,
}

impl FileTailTransport {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            file_number: 0,
            reader: None,
            byte_offset: 0,
        }
    }

    fn file_path(&self, file_number: u32) -> PathBuf {
        self.directory.join(format!("{file_number:08}.log"))
    }

    async fn open_current(&mut self) -> std::io::Result<()> {
        let path = self.file_path(self.file_number);
        let mut file = tokio::fs::File::open(&path).await?;
        file.seek(std::io::SeekFrom::Start(self.byte_offset)).await?;
        self.reader = Some(BufReader::new(file));
        Ok(())
    }
}

#[async_trait]
impl Transport for FileTailTransport {
    async fn seek(&mut self, offset: i64) -> std::io::Result<()> {
        let offset = offset.max(0) as u64;
        self.file_number = (offset >> 32) as u32;
        self.byte_offset = offset & 0xffff_ffff;
        self.reader = None;
        Ok(())
    }

    async fn next(&mut self) -> std::io::Result<Option<UpstreamEvent>> {
        if self.reader.is_none() {
            match self.open_current().await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err),
            }
        }

        let mut line = String::new();
        let read = self.reader.as_mut().expect("opened above").read_line(&mut line).await?;
        if read == 0 {
            // Caught up with this file. Roll to the next one if it already exists; otherwise
            // there's simply nothing new to tail yet.
            let next_path = self.file_path(self.file_number + 1);
            if tokio::fs::try_exists(&next_path).await.unwrap_or(false) {
                self.file_number += 1;
                self.byte_offset = 0;
                self.reader = None;
                return self.next().await;
            }
            return Ok(None);
        }

        let offset = ((self.file_number as i64) << 32) | (self.byte_offset as i64);
        self.byte_offset += read as u64;

        let parsed: LogLine = match serde_json::from_str(line.trim_end()) {
            Ok(parsed) => parsed,
            Err(_) => return self.next().await,
        };
        let payload = serde_json::to_vec(&parsed.payload).unwrap_or_default();
        Ok(Some(UpstreamEvent { kind: parsed.kind, payload, offset: offset + 1 }))
    }
}

/// An in-memory transport backed by a fixed `Vec`, used by tests and by examples that replay a
/// canned event sequence instead of tailing a real upstream.
#[derive(Debug, Default)]
pub struct VecTransport {
    events: std::collections::VecDeque<UpstreamEvent>,
}

impl VecTransport {
    pub fn new(events: Vec<UpstreamEvent>) -> Self {
        Self { events: events.into() }
    }
}

#[async_trait]
impl Transport for VecTransport {
    async fn seek(&mut self, offset: i64) -> std::io::Result<()> {
        while let Some(front) = self.events.front() {
            if front.offset < offset {
                self.events.pop_front();
            } else {
                break;
            }
        }
        Ok(())
    }

    async fn next(&mut self) -> std::io::Result<Option<UpstreamEvent>> {
        Ok(self.events.pop_front())
    }
}
