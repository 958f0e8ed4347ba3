//! Shared harness: run the `kmsgwd` binary and keep a per-case log on disk.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

pub struct CliCaseResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// Run the binary with `args`, feeding `stdin` when given.
pub fn run_cli_case_with_stdin(case: &str, args: &[&str], stdin: Option<&[u8]>) -> CliCaseResult {
    let mut child = Command::new(env!("CARGO_BIN_EXE_kmsgwd"))
        .args(args)
        .env("RUST_LOG", "info")
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn kmsgwd");
    if let Some(input) = stdin {
        child
            .stdin
            .take()
            .expect("stdin piped")
            .write_all(input)
            .expect("write stdin");
    }
    let output = child.wait_with_output().expect("wait for kmsgwd");

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let log_dir = std::env::temp_dir().join("kmsgwd-cli-cases");
    fs::create_dir_all(&log_dir).expect("create log dir");
    let log_path = log_dir.join(format!("{case}.log"));
    fs::write(
        &log_path,
        format!(
            "args: {args:?}\nstatus: {:?}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n",
            output.status
        ),
    )
    .expect("write case log");

    CliCaseResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

pub fn run_cli_case(case: &str, args: &[&str]) -> CliCaseResult {
    run_cli_case_with_stdin(case, args, None)
}
