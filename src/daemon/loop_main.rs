//! Main event loop: wait on the kernel log and the signalfd, drain the log
//! through the crash detector, stop on the first termination signal.
//!
//! ```text
//!   Running ──poll──► signal readable ──► Stopped(Ok(signal))      exit 0
//!      ▲        │
//!      │        ├───► POLLERR/POLLHUP ──► Stopped(Err(..))         exit 1
//!      │        │
//!      └─drain──┘     log readable: read until Exhausted,
//!                     reload once per matching chunk
//! ```

#![allow(missing_docs)]

use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use super::reload::{CommandRunner, DryRunRunner, ModuleReloader, SpawnRunner};
use super::signals::{ShutdownSignal, SignalSource};
use crate::core::config::{DaemonConfig, MODULE_NAME};
use crate::core::errors::{Result, WatchdogError};
use crate::monitor::kmsg::{LogRead, LogSource};
use crate::monitor::signature::CrashDetector;

const FAILURE_FLAGS: PollFlags = PollFlags::POLLERR
    .union(PollFlags::POLLHUP)
    .union(PollFlags::POLLNVAL);

/// Loop state. `Stopped` is terminal.
#[derive(Debug)]
pub enum LoopState {
    Running,
    Stopped(Result<ShutdownSignal>),
}

impl LoopState {
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Readiness of the two sources after one wake-up.
#[derive(Debug, Clone, Copy)]
struct Readiness {
    log: PollFlags,
    signal: PollFlags,
}

/// Counters kept for the shutdown summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub wakeups: u64,
    pub chunks: u64,
    pub matches: u64,
}

/// Owns both event sources, the detector and the reloader.
#[derive(Debug)]
pub struct EventLoop<R> {
    log: LogSource,
    signals: SignalSource,
    detector: CrashDetector,
    reloader: ModuleReloader<R>,
    stats: LoopStats,
}

impl<R: CommandRunner> EventLoop<R> {
    #[must_use]
    pub fn new(
        log: LogSource,
        signals: SignalSource,
        detector: CrashDetector,
        reloader: ModuleReloader<R>,
    ) -> Self {
        Self {
            log,
            signals,
            detector,
            reloader,
            stats: LoopStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    #[must_use]
    pub fn reloader(&self) -> &ModuleReloader<R> {
        &self.reloader
    }

    /// Step until the loop stops. `Ok` carries the signal that ended it.
    pub fn run(&mut self) -> Result<ShutdownSignal> {
        loop {
            if let LoopState::Stopped(outcome) = self.step() {
                return outcome;
            }
        }
    }

    /// One wait cycle: block until a source is ready, then handle it.
    pub fn step(&mut self) -> LoopState {
        let ready = match self.wait() {
            Ok(ready) => ready,
            Err(err) => return LoopState::Stopped(Err(err)),
        };
        self.stats.wakeups += 1;

        // Shutdown takes priority over log data that arrived in the same wake-up.
        if ready.signal.contains(PollFlags::POLLIN) {
            return LoopState::Stopped(self.signals.consume());
        }

        for (source_name, revents) in [("kernel log", ready.log), ("signalfd", ready.signal)] {
            if revents.intersects(FAILURE_FLAGS) {
                return LoopState::Stopped(Err(WatchdogError::PollError {
                    source_name,
                    revents,
                }));
            }
        }

        if ready.log.contains(PollFlags::POLLIN) {
            if let Err(err) = self.drain_log() {
                return LoopState::Stopped(Err(err));
            }
        }
        LoopState::Running
    }

    /// Release both descriptors. Close failures are reported, never fatal.
    pub fn shutdown(self) {
        log::debug!(
            "Loop stats: {} wake-ups, {} chunks, {} matches",
            self.stats.wakeups,
            self.stats.chunks,
            self.stats.matches
        );
        self.log.close();
        self.signals.close();
    }

    fn wait(&self) -> Result<Readiness> {
        let mut fds = [
            PollFd::new(self.log.as_fd(), PollFlags::POLLIN),
            PollFd::new(self.signals.as_fd(), PollFlags::POLLIN),
        ];
        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => {}
                Err(errno) => return Err(WatchdogError::Poll(errno)),
            }
        }
        Ok(Readiness {
            log: fds[0].revents().unwrap_or(PollFlags::empty()),
            signal: fds[1].revents().unwrap_or(PollFlags::empty()),
        })
    }

    /// Read until the device is exhausted, matching each chunk in arrival
    /// order. A match reloads before the next read.
    fn drain_log(&mut self) -> Result<()> {
        loop {
            let matched = match self.log.read_available()? {
                LogRead::Exhausted => return Ok(()),
                LogRead::Chunk(chunk) => {
                    log::trace!("kmsg chunk: {}", String::from_utf8_lossy(chunk).trim_end());
                    self.detector.matches(chunk)
                }
            };
            self.stats.chunks += 1;
            if matched {
                self.stats.matches += 1;
                self.reloader.reload();
            }
        }
    }
}

/// Set up both sources and run the loop until a termination signal or a
/// fatal error. Setup failures return before the loop is entered.
pub fn run_daemon(config: &DaemonConfig) -> Result<ShutdownSignal> {
    let detector = CrashDetector::new()?;
    let log = LogSource::open(&config.kmsg_path)?;
    log::info!("Monitoring kernel log for {MODULE_NAME} trouble...");
    let signals = SignalSource::termination()?;

    if config.dry_run {
        let reloader = ModuleReloader::new(DryRunRunner, config.modprobe.as_str());
        supervise(EventLoop::new(log, signals, detector, reloader))
    } else {
        let reloader = ModuleReloader::new(SpawnRunner, config.modprobe.as_str());
        supervise(EventLoop::new(log, signals, detector, reloader))
    }
}

fn supervise<R: CommandRunner>(mut event_loop: EventLoop<R>) -> Result<ShutdownSignal> {
    let outcome = event_loop.run();
    if let Ok(signal) = &outcome {
        log::info!("Caught {signal}; exiting");
    }
    event_loop.shutdown();
    outcome
}
