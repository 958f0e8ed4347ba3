//! kmsg_watchdog: tails the kernel log and reloads the ath10k_pci module when
//! its firmware crash signature shows up.
//!
//! The crate is split the same way the daemon runs:
//! - [`monitor`] reads `/dev/kmsg` and recognizes the crash signature.
//! - [`daemon`] owns the signalfd, the reload commands and the event loop.
//! - [`core`] carries the error taxonomy and runtime configuration.

pub mod core;
pub mod daemon;
pub mod monitor;

#[cfg(feature = "cli")]
pub mod cli_app;
