//! Follow — poll an append-only file and yield complete lines.
//!
//! The follower keeps a read offset into the open handle. Each poll reads
//! everything appended since the last one, splits it on `\n` and holds a
//! trailing partial line back until its terminator arrives. Once the
//! handle is at EOF the path is re-examined:
//!
//! - a different file now lives at the path (rename-and-recreate
//!   rotation): the old handle is finished and the new file is read from
//!   the beginning
//! - the file is shorter than the offset (copytruncate): reading restarts
//!   at the beginning
//! - the path is missing: keep polling until it reappears

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use super::{LineSource, LineStream, SourceError};

const READ_CHUNK_BYTES: usize = 64 * 1024;
// Upper bound on lines returned by one poll so a large backlog is handed
// over incrementally.
const MAX_LINES_PER_POLL: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Beginning,
    End,
}

impl StartPosition {
    pub fn from_seek_from_end(seek_from_end: bool) -> Self {
        if seek_from_end {
            StartPosition::End
        } else {
            StartPosition::Beginning
        }
    }
}

#[derive(Debug, Clone)]
pub struct FollowConfig {
    pub poll_interval: Duration,
    /// Switch to the new file when the path is rotated.
    pub reopen: bool,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            reopen: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(meta: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_meta: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

pub struct FileFollower {
    path: PathBuf,
    file: File,
    offset: u64,
    identity: Option<FileIdentity>,
    pending: BytesMut,
    config: FollowConfig,
}

impl FileFollower {
    /// Open `path` and position the read offset. Failing to open is fatal
    /// for the caller; everything after this point is retried.
    pub async fn open(
        path: impl Into<PathBuf>,
        start: StartPosition,
        config: FollowConfig,
    ) -> Result<Self, SourceError> {
        let path = path.into();
        let open_err = |source| SourceError::Open {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).await.map_err(open_err)?;
        let meta = file.metadata().await.map_err(open_err)?;
        let offset = match start {
            StartPosition::Beginning => 0,
            StartPosition::End => file.seek(SeekFrom::End(0)).await.map_err(open_err)?,
        };

        info!(path = %path.display(), offset, "Following log file");

        Ok(Self {
            identity: FileIdentity::of(&meta),
            path,
            file,
            offset,
            pending: BytesMut::with_capacity(READ_CHUNK_BYTES),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next read in the current file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read everything appended since the last call and return the
    /// complete lines, in file order.
    pub async fn read_lines(&mut self) -> Result<Vec<String>, SourceError> {
        let mut lines = Vec::new();
        let at_eof = self.read_available(&mut lines).await?;
        if at_eof {
            self.check_rotation(&mut lines).await?;
        }
        Ok(lines)
    }

    async fn read_available(&mut self, lines: &mut Vec<String>) -> Result<bool, SourceError> {
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        loop {
            let n = self.file.read(&mut chunk).await.map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;
            if n == 0 {
                return Ok(true);
            }
            self.offset += n as u64;
            self.pending.extend_from_slice(&chunk[..n]);
            self.split_lines(lines);
            if lines.len() >= MAX_LINES_PER_POLL {
                return Ok(false);
            }
        }
    }

    fn split_lines(&mut self, lines: &mut Vec<String>) {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line = self.pending.split_to(pos + 1);
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
    }

    async fn check_rotation(&mut self, lines: &mut Vec<String>) -> Result<(), SourceError> {
        let meta = match fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Log file missing; waiting for it to reappear");
                return Ok(());
            }
            Err(source) => {
                return Err(SourceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let identity = FileIdentity::of(&meta);
        if self.config.reopen && identity.is_some() && identity != self.identity {
            // The old file will not grow any more; whatever is left is a line.
            if !self.pending.is_empty() {
                let rest = self.pending.split();
                lines.push(String::from_utf8_lossy(&rest).into_owned());
            }
            let file = File::open(&self.path).await.map_err(|source| SourceError::Reopen {
                path: self.path.clone(),
                source,
            })?;
            info!(path = %self.path.display(), "Log file rotated; reopened from the beginning");
            self.file = file;
            self.offset = 0;
            self.identity = identity;
            return Ok(());
        }

        if meta.len() < self.offset {
            warn!(
                path = %self.path.display(),
                previous_offset = self.offset,
                current_size = meta.len(),
                "Log file truncated; reading from the beginning"
            );
            self.file.seek(SeekFrom::Start(0)).await.map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;
            self.offset = 0;
            self.pending.clear();
        }

        Ok(())
    }
}

impl LineSource for FileFollower {
    /// Endless stream of lines; sleeps for the poll interval whenever the
    /// file has nothing new.
    fn into_lines(mut self) -> LineStream {
        let poll_interval = self.config.poll_interval;
        Box::pin(async_stream::stream! {
            loop {
                match self.read_lines().await {
                    Ok(lines) => {
                        let idle = lines.is_empty();
                        for line in lines {
                            yield Ok(line);
                        }
                        if idle {
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }
        })
    }
}
