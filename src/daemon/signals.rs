//! Termination signals as a pollable descriptor.
//!
//! SIGINT and SIGTERM are blocked for the daemon thread and routed to a
//! signalfd instead of a handler. The event loop polls it alongside the
//! kernel log and reads it only at the top of a wait cycle, so there is no
//! asynchronous handler and no race with the rest of the loop.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::os::fd::{AsFd, BorrowedFd, IntoRawFd};

use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};

use crate::core::errors::{Result, WatchdogError};

/// Size of one `struct signalfd_siginfo` record.
pub const SIGINFO_SIZE: usize = std::mem::size_of::<libc::signalfd_siginfo>();

/// Signals that shut the daemon down.
pub const TERMINATION_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

/// The signal that ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSignal(pub Signal);

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Blocked signal set plus the signalfd that receives it.
#[derive(Debug)]
pub struct SignalSource {
    file: File,
}

impl SignalSource {
    /// Replace the calling thread's signal mask with `signals` and bind them
    /// to a non-blocking, close-on-exec signalfd.
    pub fn new(signals: &[Signal]) -> Result<Self> {
        let mut mask = SigSet::empty();
        for &signal in signals {
            mask.add(signal);
        }
        mask.thread_set_mask().map_err(WatchdogError::SignalMask)?;

        let sfd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)
            .map_err(|errno| WatchdogError::SignalFd(errno.into()))?;
        // Reads go through `File` so the record size stays under our control;
        // the duplicate shares the signalfd's open file description.
        let owned = sfd
            .as_fd()
            .try_clone_to_owned()
            .map_err(WatchdogError::SignalFd)?;
        Ok(Self {
            file: File::from(owned),
        })
    }

    /// Block and bind SIGINT and SIGTERM.
    pub fn termination() -> Result<Self> {
        Self::new(&TERMINATION_SIGNALS)
    }

    /// Read exactly one pending notification.
    ///
    /// Any read failure or a record of the wrong size is fatal; a delivered
    /// signal is always terminal for the caller.
    pub fn consume(&mut self) -> Result<ShutdownSignal> {
        let mut record = [0u8; SIGINFO_SIZE];
        let got = self
            .file
            .read(&mut record)
            .map_err(WatchdogError::SignalRead)?;
        if got != SIGINFO_SIZE {
            return Err(WatchdogError::SignalReadSize {
                got,
                expected: SIGINFO_SIZE,
            });
        }
        // `ssi_signo` is the leading u32 of the record.
        let signo = u32::from_ne_bytes([record[0], record[1], record[2], record[3]]);
        let signo = i32::try_from(signo).unwrap_or(i32::MAX);
        Signal::try_from(signo)
            .map(ShutdownSignal)
            .map_err(|_| WatchdogError::UnknownSignal(signo))
    }

    /// Close the signalfd, reporting (but not propagating) a close failure.
    pub fn close(self) {
        if let Err(err) = nix::unistd::close(self.file.into_raw_fd()) {
            log::warn!("Failed to close signalfd: {err}");
        }
    }
}

impl AsFd for SignalSource {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
