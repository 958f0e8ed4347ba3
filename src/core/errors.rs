//! KMW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::poll::PollFlags;
use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, WatchdogError>;

/// Top-level error type for the watchdog. Every variant is fatal: the daemon
/// logs it and exits with status 1.
#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("[KMW-1001] crash signature failed to compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error("[KMW-2001] failed to open {path}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[KMW-2002] failed to seek to end of {path}: {source}")]
    SeekLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[KMW-2003] failed to read from {path}: {source}")]
    ReadLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[KMW-2004] {path} unexpectedly reached EOF")]
    LogEof { path: PathBuf },

    #[error("[KMW-3001] failed to set signal mask: {0}")]
    SignalMask(#[source] Errno),

    #[error("[KMW-3002] failed to create signalfd: {0}")]
    SignalFd(#[source] std::io::Error),

    #[error("[KMW-3003] failed to read from signalfd: {0}")]
    SignalRead(#[source] std::io::Error),

    #[error(
        "[KMW-3004] caught signal but read unexpected number of bytes from signalfd ({got} != {expected})"
    )]
    SignalReadSize { got: usize, expected: usize },

    #[error("[KMW-3005] signalfd delivered unrecognized signal number {0}")]
    UnknownSignal(i32),

    #[error("[KMW-4001] poll failed: {0}")]
    Poll(#[source] Errno),

    #[error("[KMW-4002] poll error for {source_name}: {revents:?}")]
    PollError {
        source_name: &'static str,
        revents: PollFlags,
    },
}

impl WatchdogError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Pattern(_) => "KMW-1001",
            Self::OpenLog { .. } => "KMW-2001",
            Self::SeekLog { .. } => "KMW-2002",
            Self::ReadLog { .. } => "KMW-2003",
            Self::LogEof { .. } => "KMW-2004",
            Self::SignalMask(_) => "KMW-3001",
            Self::SignalFd(_) => "KMW-3002",
            Self::SignalRead(_) => "KMW-3003",
            Self::SignalReadSize { .. } => "KMW-3004",
            Self::UnknownSignal(_) => "KMW-3005",
            Self::Poll(_) => "KMW-4001",
            Self::PollError { .. } => "KMW-4002",
        }
    }

    /// Whether the failure happened before the event loop could start.
    #[must_use]
    pub const fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::Pattern(_)
                | Self::OpenLog { .. }
                | Self::SeekLog { .. }
                | Self::SignalMask(_)
                | Self::SignalFd(_)
        )
    }

    /// Convenience constructor for open failures with a known path.
    #[must_use]
    pub fn open_log(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::OpenLog {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
