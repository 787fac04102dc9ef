//! Command-line argument definitions for `assay`.

use camino::Utf8PathBuf;
use clap::Parser;

/// Runs the processing and signature pipeline over a completed analysis.
///
/// Configuration flags (`--config-path`, `--log-filter`, `--conf-dir`, and
/// friends) must precede the analysis path.
#[derive(Parser, Debug)]
#[command(name = "assay", version)]
pub(crate) struct Cli {
    /// Root directory of the analysis to process.
    #[arg(value_name = "ANALYSIS_PATH")]
    pub(crate) analysis_path: Utf8PathBuf,
    /// Pretty-prints the result document.
    #[arg(long)]
    pub(crate) pretty: bool,
}
