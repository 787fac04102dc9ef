//! Command-line runtime for the assay analysis pipeline.
//!
//! The runtime splits leading configuration flags from the remaining
//! arguments, loads [`assay_config::Config`] through `ortho_config`, installs
//! telemetry, and runs the built-in plugin modules over one analysis
//! directory. The result document is written to the supplied standard output
//! as a single JSON value; diagnostics go to standard error. Both streams are
//! injected so the runtime can be exercised in-process by tests.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use assay_plugins::{AnalysisTarget, Pipeline, ResultDocument};
use clap::Parser;
use clap::error::ErrorKind;
use tracing::debug;

mod cli;
mod config;
mod errors;
mod telemetry;

#[cfg(test)]
mod tests;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub(crate) use errors::AppError;

const CLI_TARGET: &str = "assay_cli";

/// Runs the CLI using the provided arguments and IO handles.
///
/// Returns [`ExitCode::SUCCESS`] once the result document has been written,
/// and [`ExitCode::FAILURE`] after reporting any usage, configuration, or
/// pipeline error on `stderr`.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    match execute(args, stdout, loader) {
        Ok(exit_code) => exit_code,
        Err(error) => {
            // A closed stderr leaves nowhere to report to.
            drop(writeln!(stderr, "{error}"));
            ExitCode::FAILURE
        }
    }
}

fn execute<I, W, L>(args: I, stdout: &mut W, loader: &L) -> Result<ExitCode, AppError>
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);

    let cli = match Cli::try_parse_from(&split.cli_arguments) {
        Ok(cli) => cli,
        Err(error) if is_informational(&error) => {
            write!(stdout, "{}", error.render()).map_err(AppError::WriteOutput)?;
            return Ok(ExitCode::SUCCESS);
        }
        Err(error) => return Err(AppError::CliUsage(error)),
    };

    let config = loader.load(&split.config_arguments)?;
    telemetry::initialise(&config)?;

    if !cli.analysis_path.is_dir() {
        return Err(AppError::MissingAnalysis {
            path: cli.analysis_path,
        });
    }

    let catalog = assay_modules::catalog().map_err(AppError::Catalog)?;
    debug!(
        target: CLI_TARGET,
        analysis = cli.analysis_path.as_str(),
        modules = catalog.len(),
        "starting analysis"
    );
    let target = AnalysisTarget::new(cli.analysis_path);
    let document = Pipeline::from_config(catalog, target, &config).run()?;

    write_document(stdout, &document, cli.pretty)?;
    Ok(ExitCode::SUCCESS)
}

fn is_informational(error: &clap::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    )
}

fn write_document<W: Write>(
    stdout: &mut W,
    document: &ResultDocument,
    pretty: bool,
) -> Result<(), AppError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *stdout, document)
    } else {
        serde_json::to_writer(&mut *stdout, document)
    }
    .map_err(AppError::SerialiseDocument)?;
    writeln!(stdout).map_err(AppError::WriteOutput)?;
    stdout.flush().map_err(AppError::WriteOutput)
}
