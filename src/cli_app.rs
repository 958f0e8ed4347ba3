//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::core::config::{DEFAULT_KMSG_PATH, DEFAULT_MODPROBE, DaemonConfig};
use crate::daemon::loop_main::run_daemon;
use crate::monitor::signature::CrashDetector;

/// kmsgwd — reloads ath10k_pci when its firmware crashes.
#[derive(Parser)]
#[command(name = "kmsgwd", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands. Without one, `run` with default flags is used.
#[derive(Subcommand)]
pub enum Command {
    /// Run the watchdog in the foreground (used by systemd).
    Run(RunArgs),
    /// Report which lines of a log file match the crash signature.
    Check {
        /// File to scan; stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Print a shell completion script.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Flags for the daemon.
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Kernel log device to tail.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_KMSG_PATH)]
    pub kmsg: PathBuf,
    /// Program used to unload (`-r`) and load the module.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_MODPROBE)]
    pub modprobe: String,
    /// Log the reload commands instead of running them.
    #[arg(long)]
    pub dry_run: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        let config = DaemonConfig::default();
        Self {
            kmsg: config.kmsg_path,
            modprobe: config.modprobe,
            dry_run: config.dry_run,
        }
    }
}

impl From<RunArgs> for DaemonConfig {
    fn from(args: RunArgs) -> Self {
        Self {
            kmsg_path: args.kmsg,
            modprobe: args.modprobe,
            dry_run: args.dry_run,
        }
    }
}

/// Dispatch CLI commands and map the outcome to a process exit code.
pub fn run(cli: Cli) -> ExitCode {
    match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => match run_daemon(&args.into()) {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) if err.is_setup_failure() => {
                log::error!("Startup failed: {err}");
                ExitCode::FAILURE
            }
            Err(err) => {
                log::error!("{err}; exiting");
                ExitCode::FAILURE
            }
        },
        Command::Check { file } => match check(file) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(err) => {
                log::error!("{err}");
                ExitCode::FAILURE
            }
        },
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "kmsgwd", &mut io::stdout());
            ExitCode::SUCCESS
        }
    }
}

/// Print every line of `file` (or stdin) that matches the crash signature.
/// Returns whether anything matched.
fn check(file: Option<PathBuf>) -> Result<bool, Box<dyn std::error::Error>> {
    let detector = CrashDetector::new()?;
    let data = match file {
        Some(path) => fs::read(&path).map_err(|err| format!("{}: {err}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let mut stdout = io::stdout().lock();
    let mut matched = 0usize;
    for line in data.split(|&b| b == b'\n') {
        if detector.matches(line) {
            matched += 1;
            stdout.write_all(line)?;
            stdout.write_all(b"\n")?;
        }
    }
    log::info!("{matched} matching line(s)");
    Ok(matched > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["kmsgwd"]).unwrap();
        assert!(cli.command.is_none());
        let config: DaemonConfig = RunArgs::default().into();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn run_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "kmsgwd",
            "run",
            "--kmsg",
            "/tmp/kmsg",
            "--modprobe",
            "/sbin/modprobe",
            "--dry-run",
        ])
        .unwrap();
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };
        let config = DaemonConfig::from(args);
        assert_eq!(config.kmsg_path, PathBuf::from("/tmp/kmsg"));
        assert_eq!(config.modprobe, "/sbin/modprobe");
        assert!(config.dry_run);
    }

    #[test]
    fn check_reports_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dmesg.txt");
        fs::write(
            &path,
            "6,1,1,-;usb 1-1: new device\n3,2,2,-;ath10k_pci 0000:3a:00.0: could not init core (-110)\n",
        )
        .unwrap();
        assert!(check(Some(path)).unwrap());
    }

    #[test]
    fn check_reports_clean_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dmesg.txt");
        fs::write(&path, ";unrelated_driver: oops\n").unwrap();
        assert!(!check(Some(path)).unwrap());
    }

    #[test]
    fn check_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check(Some(dir.path().join("absent"))).is_err());
    }
}
