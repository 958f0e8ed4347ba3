//! kmsgwd binary entrypoint.

use std::process::ExitCode;

use clap::Parser;
use kmsg_watchdog::cli_app::{Cli, run};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    run(Cli::parse())
}
