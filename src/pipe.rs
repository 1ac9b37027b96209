//! Named pipe used by continuous mode.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tracing::{debug, warn};

use crate::error::{PrintError, PrintResult};

/// Sleep between reads once the writer side has gone away.
pub const IDLE_POLL: Duration = Duration::from_millis(100);

/// A FIFO created on construction and removed on drop.
#[derive(Debug)]
pub struct Fifo {
    path: PathBuf,
}

impl Fifo {
    /// Creates the FIFO. Fails if anything already exists at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> PrintResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(PrintError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("pipe file {} already exists", path.display()),
            )));
        }
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| PrintError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) };
        if rc != 0 {
            return Err(PrintError::Io(io::Error::last_os_error()));
        }
        debug!(path = %path.display(), "fifo created");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the read side without waiting for a writer.
    pub fn open(&self) -> PrintResult<BufReader<pipe::Receiver>> {
        let receiver = pipe::OpenOptions::new().open_receiver(&self.path)?;
        Ok(BufReader::new(receiver))
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("failed to remove {}: {}", self.path.display(), e);
        } else {
            debug!(path = %self.path.display(), "fifo removed");
        }
    }
}

/// Reads lines forever, like `tail -f`.
///
/// At end of input (all writers closed) it sleeps for `idle` and tries
/// again, so new writers are picked up.
pub struct LineFollower<R> {
    reader: R,
    idle: Duration,
}

impl<R: AsyncBufRead + Unpin> LineFollower<R> {
    pub fn new(reader: R, idle: Duration) -> Self {
        Self { reader, idle }
    }

    /// Next complete line, without its terminator. Bytes that are not valid
    /// UTF-8 come back as U+FFFD.
    pub async fn next_line(&mut self) -> PrintResult<String> {
        let mut buf = Vec::new();
        loop {
            let n = self.reader.read_until(b'\n', &mut buf).await?;
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                return Ok(match String::from_utf8(buf) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("line is not valid UTF-8, replacing bad bytes");
                        String::from_utf8_lossy(e.as_bytes()).into_owned()
                    }
                });
            }
            if n == 0 {
                tokio::time::sleep(self.idle).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_follower_splits_lines() {
        let data: &[u8] = b"first\r\nsecond\n";
        let mut follower = LineFollower::new(data, IDLE_POLL);
        assert_eq!(follower.next_line().await.unwrap(), "first");
        assert_eq!(follower.next_line().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_follower_survives_invalid_utf8() {
        let data: &[u8] = b"caf\xe9\nnext\n";
        let mut follower = LineFollower::new(data, IDLE_POLL);
        assert_eq!(follower.next_line().await.unwrap(), "caf\u{FFFD}");
        assert_eq!(follower.next_line().await.unwrap(), "next");
    }

    #[tokio::test(start_paused = true)]
    async fn test_follower_waits_for_terminator() {
        let data: &[u8] = b"partial";
        let mut follower = LineFollower::new(data, IDLE_POLL);
        let res = tokio::time::timeout(Duration::from_secs(1), follower.next_line()).await;
        assert!(res.is_err());
    }

    #[test]
    fn test_fifo_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printer.pipe");
        {
            let fifo = Fifo::create(&path).unwrap();
            assert!(fifo.path().exists());
            assert!(Fifo::create(&path).is_err());
        }
        assert!(!path.exists());
    }
}
