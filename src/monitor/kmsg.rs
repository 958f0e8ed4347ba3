//! Non-blocking reader for the kernel log device.
//!
//! [`LogSource`] tails `/dev/kmsg` from the moment it is opened: history
//! already in the ring buffer is skipped by seeking to the end. Reads never
//! block; an empty device reports [`LogRead::Exhausted`] and the caller goes
//! back to `poll`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::{AsFd, BorrowedFd, IntoRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::core::errors::{Result, WatchdogError};

/// Read buffer size. Each kmsg read returns at most one record, and records
/// are far smaller than this.
pub const KMSG_CHUNK_SIZE: usize = 8192;

/// Result of one non-blocking read.
#[derive(Debug, PartialEq, Eq)]
pub enum LogRead<'a> {
    /// Newly appended bytes.
    Chunk(&'a [u8]),
    /// Nothing more to read until the next wake-up.
    Exhausted,
}

/// Owner of the kernel log descriptor and its read buffer.
#[derive(Debug)]
pub struct LogSource {
    file: File,
    path: PathBuf,
    buf: Vec<u8>,
}

impl LogSource {
    /// Open `path` non-blocking (std always adds `O_CLOEXEC`) and move the
    /// cursor to the current end of the buffer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| WatchdogError::open_log(path, source))?;
        file.seek(SeekFrom::End(0))
            .map_err(|source| WatchdogError::SeekLog {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_file(file, path))
    }

    /// Wrap an already-open descriptor as-is. `label` names it in errors.
    #[must_use]
    pub fn from_file(file: File, label: impl Into<PathBuf>) -> Self {
        Self {
            file,
            path: label.into(),
            buf: vec![0; KMSG_CHUNK_SIZE],
        }
    }

    /// Use a read buffer of `capacity` bytes instead of [`KMSG_CHUNK_SIZE`].
    #[must_use]
    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.buf = vec![0; capacity.max(1)];
        self
    }

    /// Path (or label) of the device.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next chunk of newly appended bytes.
    ///
    /// `EINTR` is retried. `EAGAIN` means the buffer is drained; `EPIPE` means
    /// the kernel overwrote records we had not read yet and the cursor has
    /// moved on, so both end the current drain. End-of-file is fatal since the
    /// kernel log never closes.
    pub fn read_available(&mut self) -> Result<LogRead<'_>> {
        loop {
            match self.file.read(&mut self.buf) {
                Ok(0) => {
                    return Err(WatchdogError::LogEof {
                        path: self.path.clone(),
                    });
                }
                Ok(n) => return Ok(LogRead::Chunk(&self.buf[..n])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::BrokenPipe
                    ) =>
                {
                    return Ok(LogRead::Exhausted);
                }
                Err(source) => {
                    return Err(WatchdogError::ReadLog {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }
    }

    /// Close the descriptor, reporting (but not propagating) a close failure.
    pub fn close(self) {
        if let Err(err) = nix::unistd::close(self.file.into_raw_fd()) {
            log::warn!("Failed to close {}: {err}", self.path.display());
        }
    }
}

impl AsFd for LogSource {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use nix::fcntl::OFlag;

    fn pipe_source() -> (LogSource, File) {
        let (read_end, write_end) =
            nix::unistd::pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC).expect("pipe2");
        (
            LogSource::from_file(File::from(read_end), "test-pipe"),
            File::from(write_end),
        )
    }

    #[test]
    fn open_missing_device_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = LogSource::open(dir.path().join("no-such-kmsg")).unwrap_err();
        assert_eq!(err.code(), "KMW-2001");
        assert!(err.is_setup_failure());
    }

    #[test]
    fn open_skips_existing_history() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"6,1,1,-;old record\n").expect("write");
        let mut source = LogSource::open(file.path()).expect("open");
        // Positioned at the end: the next read on a regular file is EOF.
        let err = source.read_available().unwrap_err();
        assert_eq!(err.code(), "KMW-2004");
    }

    #[test]
    fn empty_pipe_is_exhausted() {
        let (mut source, _writer) = pipe_source();
        assert_eq!(source.read_available().unwrap(), LogRead::Exhausted);
    }

    #[test]
    fn chunk_then_exhausted() {
        let (mut source, mut writer) = pipe_source();
        writer.write_all(b";ath10k_pci: hello").expect("write");
        assert_eq!(
            source.read_available().unwrap(),
            LogRead::Chunk(b";ath10k_pci: hello")
        );
        assert_eq!(source.read_available().unwrap(), LogRead::Exhausted);
    }

    #[test]
    fn chunk_capacity_splits_reads() {
        let (source, mut writer) = pipe_source();
        let mut source = source.with_chunk_capacity(4);
        writer.write_all(b"abcdef").expect("write");
        assert_eq!(source.read_available().unwrap(), LogRead::Chunk(b"abcd"));
        assert_eq!(source.read_available().unwrap(), LogRead::Chunk(b"ef"));
        assert_eq!(source.read_available().unwrap(), LogRead::Exhausted);
    }

    #[test]
    fn closed_writer_reads_as_eof() {
        let (mut source, writer) = pipe_source();
        drop(writer);
        let err = source.read_available().unwrap_err();
        assert!(matches!(err, WatchdogError::LogEof { .. }));
        assert_eq!(source.path(), Path::new("test-pipe"));
    }

    #[test]
    fn close_releases_descriptor() {
        let (source, _writer) = pipe_source();
        source.close();
    }
}
