//! Line sources feeding the ingestion service
//!
//! A [`LineSource`] yields raw lines one at a time and suspends while none
//! is available. `next_line` is safe to drop mid-await: the ingestion loop
//! races it against the shutdown signal and simply stops polling it.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;

/// Producer of raw log lines
#[async_trait]
pub trait LineSource: Send + 'static {
    /// Wait for the next line, without its terminator
    ///
    /// `Ok(None)` means the source is exhausted and will never yield again.
    async fn next_line(&mut self) -> io::Result<Option<String>>;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

// =============================================================================
// File Tailer
// =============================================================================

/// Configuration for [`FileTailer`]
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// How long to sleep at end of file (or while the file is missing)
    pub poll_interval: Duration,

    /// Skip the content present when the file is first opened
    pub start_at_end: bool,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            start_at_end: false,
        }
    }
}

/// Follows a growing file, yielding each line once a newline terminates it
///
/// Waits for the file to exist, keeps partial trailing lines until they are
/// completed, and starts over from the beginning when the file shrinks
/// (truncation or copy-truncate rotation).
pub struct FileTailer {
    path: PathBuf,
    config: TailerConfig,
    reader: Option<BufReader<File>>,
    /// Bytes of the file consumed by completed lines
    offset: u64,
    /// Bytes read past `offset` that are not yet a full line
    pending: Vec<u8>,
    opened_once: bool,
}

impl FileTailer {
    /// Create a tailer for `path` with default configuration
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_config(path, TailerConfig::default())
    }

    /// Create a tailer with custom configuration
    pub fn with_config(path: impl AsRef<Path>, config: TailerConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            reader: None,
            offset: 0,
            pending: Vec::new(),
            opened_once: false,
        }
    }

    /// Path being followed
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&mut self) -> io::Result<()> {
        let mut waiting_logged = false;

        let mut file = loop {
            match File::open(&self.path).await {
                Ok(file) => break file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if !waiting_logged {
                        tracing::debug!(path = %self.path.display(), "Waiting for log file to appear");
                        waiting_logged = true;
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                },
                Err(e) => return Err(e),
            }
        };

        self.offset = if self.config.start_at_end && !self.opened_once {
            file.seek(SeekFrom::End(0)).await?
        } else {
            0
        };
        self.pending.clear();
        self.opened_once = true;
        self.reader = Some(BufReader::new(file));

        tracing::debug!(path = %self.path.display(), offset = self.offset, "Opened log file");
        Ok(())
    }

    /// True when the file on disk is shorter than what was already read
    async fn truncated(&self) -> io::Result<bool> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len() < self.offset + self.pending.len() as u64),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl LineSource for FileTailer {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                self.open().await?;
                continue;
            };

            let read = reader.read_until(b'\n', &mut self.pending).await?;

            if read > 0 && self.pending.last() == Some(&b'\n') {
                let raw = std::mem::take(&mut self.pending);
                self.offset += raw.len() as u64;

                let mut line = String::from_utf8_lossy(&raw).into_owned();
                line.truncate(line.trim_end_matches(['\n', '\r']).len());
                return Ok(Some(line));
            }

            // End of file, possibly with a partial line buffered
            if self.truncated().await? {
                tracing::info!(path = %self.path.display(), "Log file truncated, reading from start");
                self.reader = None;
                self.opened_once = true;
                continue;
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

// =============================================================================
// Channel Source
// =============================================================================

/// Line source fed through a tokio channel
///
/// Exhausted once every sender is dropped and the buffer is drained.
pub struct ChannelLineSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelLineSource {
    /// Create a source and the sender that feeds it
    pub fn new(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }

    /// Wrap an existing receiver
    pub fn from_receiver(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl LineSource for ChannelLineSource {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.rx.recv().await)
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}
