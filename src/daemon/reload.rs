//! Kernel module reload: `modprobe -r ath10k_pci`, then `modprobe ath10k_pci`.
//!
//! Every failure here is observational. Outcomes are logged and handed back
//! in a [`ReloadReport`], but nothing propagates to the event loop as an
//! error.

#![allow(missing_docs)]

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};

use nix::sys::signal::Signal;

use crate::core::config::MODULE_NAME;

/// Classified result of one reload step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exited with status 0.
    Success,
    /// Exited with a nonzero status.
    Failed { code: i32 },
    /// Killed by a signal.
    Signaled { signal: i32 },
    /// Wait status that is neither an exit nor a signal.
    Abnormal { raw: i32 },
    /// The child could not be started; the step was skipped.
    SpawnFailed { reason: String },
    /// The child started but waiting for it failed.
    WaitFailed { reason: String },
}

impl CommandOutcome {
    /// Classify a wait status.
    #[must_use]
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(signal) = status.signal() {
            Self::Signaled { signal }
        } else if let Some(code) = status.code() {
            if code == 0 {
                Self::Success
            } else {
                Self::Failed { code }
            }
        } else {
            Self::Abnormal {
                raw: status.into_raw(),
            }
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failed { code } => write!(f, "sub-process error: rc={code}"),
            Self::Signaled { signal } => match Signal::try_from(*signal) {
                Ok(sig) => write!(f, "sub-process died of {} ({signal})", sig.as_str()),
                Err(_) => write!(f, "sub-process died of signal {signal}"),
            },
            Self::Abnormal { raw } => write!(f, "sub-process died abnormally: {raw}"),
            Self::SpawnFailed { reason } => write!(f, "failed to spawn sub-process: {reason}"),
            Self::WaitFailed { reason } => write!(f, "failed to wait for sub-process: {reason}"),
        }
    }
}

/// Seam between the reloader and process creation.
pub trait CommandRunner {
    /// Run `argv` to completion and classify the result. Must not panic or
    /// return early on failure: every failure becomes a [`CommandOutcome`].
    fn run(&mut self, argv: &[&str]) -> CommandOutcome;
}

/// Spawns real child processes and waits for them.
///
/// std resets the child's signal mask to empty and SIGPIPE to its default
/// disposition before exec, so the child never inherits the daemon's blocked
/// SIGINT/SIGTERM.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpawnRunner;

impl CommandRunner for SpawnRunner {
    fn run(&mut self, argv: &[&str]) -> CommandOutcome {
        let Some((program, args)) = argv.split_first() else {
            return CommandOutcome::SpawnFailed {
                reason: "empty argument vector".to_string(),
            };
        };
        let mut child = match Command::new(program).args(args).spawn() {
            Ok(child) => child,
            Err(err) => {
                return CommandOutcome::SpawnFailed {
                    reason: err.to_string(),
                };
            }
        };
        match child.wait() {
            Ok(status) => CommandOutcome::from_status(status),
            Err(err) => CommandOutcome::WaitFailed {
                reason: err.to_string(),
            },
        }
    }
}

/// Logs what would run and reports success without spawning anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    fn run(&mut self, argv: &[&str]) -> CommandOutcome {
        log::info!("[dry-run] would run: {}", argv.join(" "));
        CommandOutcome::Success
    }
}

/// Outcomes of one unload/load pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    pub unload: CommandOutcome,
    pub load: CommandOutcome,
}

impl ReloadReport {
    /// Both steps exited with status 0.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.unload.is_success() && self.load.is_success()
    }
}

/// Runs the fixed reload pair for [`MODULE_NAME`].
#[derive(Debug)]
pub struct ModuleReloader<R> {
    runner: R,
    tool: String,
}

impl<R: CommandRunner> ModuleReloader<R> {
    #[must_use]
    pub fn new(runner: R, tool: impl Into<String>) -> Self {
        Self {
            runner,
            tool: tool.into(),
        }
    }

    /// Access the runner, mostly so tests can inspect what was recorded.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Unload then load the module, blocking until each child exits.
    ///
    /// A failed unload does not skip the load.
    pub fn reload(&mut self) -> ReloadReport {
        log::info!("Reloading {MODULE_NAME} kernel module");
        let tool = self.tool.clone();
        let unload = self.step(&[tool.as_str(), "-r", MODULE_NAME]);
        let load = self.step(&[tool.as_str(), MODULE_NAME]);
        let report = ReloadReport { unload, load };
        if report.succeeded() {
            log::info!("Reloaded {MODULE_NAME}");
        }
        report
    }

    fn step(&mut self, argv: &[&str]) -> CommandOutcome {
        let outcome = self.runner.run(argv);
        match &outcome {
            CommandOutcome::Success => {}
            CommandOutcome::Failed { .. } => {
                log::warn!("`{}`: {outcome}", argv.join(" "));
            }
            _ => log::error!("`{}`: {outcome}", argv.join(" ")),
        }
        outcome
    }
}
