//! CLI entrypoint for the assay analysis pipeline.
//!
//! The binary delegates to [`assay_cli::run`], which loads configuration,
//! initialises telemetry, runs the pipeline over the requested analysis
//! directory, and writes the result document to standard output.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    assay_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
