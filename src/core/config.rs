//! Runtime configuration for the daemon.
//!
//! There is no configuration file: every knob comes from the command line and
//! falls back to the values the daemon was built around.

use std::path::PathBuf;

/// Kernel log device tailed by default.
pub const DEFAULT_KMSG_PATH: &str = "/dev/kmsg";

/// Tool used for both unloading (`-r`) and loading the module.
pub const DEFAULT_MODPROBE: &str = "modprobe";

/// The one kernel module this daemon knows how to recover.
pub const MODULE_NAME: &str = "ath10k_pci";

/// Settings for one daemon run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Kernel log device to tail.
    pub kmsg_path: PathBuf,
    /// Program invoked to unload and reload the module.
    pub modprobe: String,
    /// Log reload commands instead of running them.
    pub dry_run: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            kmsg_path: PathBuf::from(DEFAULT_KMSG_PATH),
            modprobe: DEFAULT_MODPROBE.to_string(),
            dry_run: false,
        }
    }
}
