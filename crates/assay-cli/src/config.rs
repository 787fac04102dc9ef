//! Configuration loading helpers for the CLI.
//!
//! Leading configuration flags are split off and handed to `ortho_config`;
//! everything from the first other token onwards is parsed by `clap`.

use std::ffi::{OsStr, OsString};

use assay_config::{Config, OrthoConfig};

use crate::AppError;

/// CLI flags recognised by the configuration loader.
///
/// Keep in sync with the fields of [`assay_config::Config`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--conf-dir",
    "--processing-namespace",
    "--signatures-namespace",
    "--unit-timeout-secs",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration for the CLI.
    ///
    /// # Flag Ordering
    ///
    /// Configuration flags must appear before the analysis path. Flags after
    /// it are treated as ordinary arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, inline_value) = text
        .split_once('=')
        .map_or((text.as_ref(), false), |(name, _)| (name, true));
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) cli_arguments: Vec<OsString>,
}

/// Splits `args` (including the program name) into the configuration prefix
/// and the remaining CLI arguments. Both halves keep the program name.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            cli_arguments: Vec::new(),
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut remaining = rest.iter().peekable();
    while let Some(argument) = remaining.peek() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push((*argument).clone());
                remaining.next();
                if needs_value {
                    if let Some(value) = remaining.next() {
                        config_arguments.push(value.clone());
                    }
                }
            }
            FlagAction::Stop => break,
        }
    }

    let mut cli_arguments = vec![program.clone()];
    cli_arguments.extend(remaining.cloned());
    ConfigArgumentSplit {
        config_arguments,
        cli_arguments,
    }
}
