//! CLI entrypoint for Trellis.
//!
//! The binary delegates to [`trellis_cli::run`], which loads configuration,
//! installs telemetry and executes the requested module command.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    trellis_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
