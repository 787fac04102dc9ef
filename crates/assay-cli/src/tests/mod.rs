//! In-process tests for the CLI runtime.

use std::cell::RefCell;
use std::ffi::OsString;
use std::process::ExitCode;

use assay_config::Config;
use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use serde_json::Value;
use tempfile::TempDir;

use crate::config::ConfigLoader;
use crate::{AppError, run_with_loader};


/// Loader returning a fixed configuration and recording what it was given.
pub(super) struct FixedLoader {
    config: Config,
    seen: RefCell<Vec<Vec<OsString>>>,
}

impl FixedLoader {
    pub(super) fn new(config: Config) -> Self {
        Self {
            config,
            seen: RefCell::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<Vec<OsString>> {
        self.seen.borrow().clone()
    }
}

impl ConfigLoader for FixedLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        self.seen.borrow_mut().push(args.to_vec());
        Ok(self.config.clone())
    }
}

/// Captured result of one in-process invocation.
pub(super) struct Invocation {
    pub(super) exit: ExitCode,
    pub(super) stdout: String,
    pub(super) stderr: String,
}

pub(super) fn invoke(args: &[&str], loader: &FixedLoader) -> Invocation {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = run_with_loader(
        args.iter().map(OsString::from),
        &mut stdout,
        &mut stderr,
        loader,
    );
    Invocation {
        exit,
        stdout: String::from_utf8(stdout).expect("stdout utf8"),
        stderr: String::from_utf8(stderr).expect("stderr utf8"),
    }
}

pub(super) fn quiet_config() -> Config {
    Config {
        log_filter: String::from("off"),
        ..Config::default()
    }
}

#[fixture]
fn analysis() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    (dir, root)
}

fn drop_files(root: &Utf8Path, names: &[&str]) {
    let files = root.join("files");
    std::fs::create_dir_all(&files).expect("files dir");
    for name in names {
        std::fs::write(files.join(name), name.as_bytes()).expect("write dropped file");
    }
}

fn document(invocation: &Invocation) -> Value {
    serde_json::from_str(&invocation.stdout).expect("stdout holds one JSON document")
}

#[rstest]
fn writes_the_result_document_for_an_analysis(analysis: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = analysis;
    let loader = FixedLoader::new(quiet_config());

    let invocation = invoke(&["assay", root.as_str()], &loader);

    assert_eq!(invocation.exit, ExitCode::SUCCESS, "stderr: {}", invocation.stderr);
    assert!(invocation.stderr.is_empty());
    assert_eq!(invocation.stdout.lines().count(), 1);
    let value = document(&invocation);
    assert!(value.get("info").is_some());
    assert_eq!(value.get("dropped"), Some(&serde_json::json!([])));
    assert_eq!(value.get("signatures"), Some(&serde_json::json!([])));
}

#[rstest]
fn dropped_files_raise_a_match(analysis: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = analysis;
    drop_files(&root, &["payload.exe"]);
    let loader = FixedLoader::new(quiet_config());

    let invocation = invoke(&["assay", root.as_str()], &loader);

    assert_eq!(invocation.exit, ExitCode::SUCCESS);
    let value = document(&invocation);
    let names: Vec<&str> = value
        .get("signatures")
        .and_then(Value::as_array)
        .expect("match list")
        .iter()
        .filter_map(|record| record.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, ["dropped_files"]);
}

#[rstest]
fn pretty_output_spans_several_lines(analysis: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = analysis;
    let loader = FixedLoader::new(quiet_config());

    let invocation = invoke(&["assay", root.as_str(), "--pretty"], &loader);

    assert_eq!(invocation.exit, ExitCode::SUCCESS);
    assert!(invocation.stdout.lines().count() > 1);
    assert!(document(&invocation).get("signatures").is_some());
}

#[test]
fn missing_analysis_directory_fails() {
    let loader = FixedLoader::new(quiet_config());

    let invocation = invoke(&["assay", "/definitely/not/an/analysis"], &loader);

    assert_eq!(invocation.exit, ExitCode::FAILURE);
    assert!(invocation.stdout.is_empty());
    assert!(
        invocation.stderr.contains("does not exist"),
        "stderr: {}",
        invocation.stderr
    );
}

#[test]
fn missing_analysis_argument_is_a_usage_error() {
    let loader = FixedLoader::new(quiet_config());

    let invocation = invoke(&["assay"], &loader);

    assert_eq!(invocation.exit, ExitCode::FAILURE);
    assert!(invocation.stderr.contains("ANALYSIS_PATH"));
    assert!(loader.seen().is_empty(), "configuration loads after parsing");
}

#[rstest]
#[case::help("--help", "ANALYSIS_PATH")]
#[case::version("--version", env!("CARGO_PKG_VERSION"))]
fn informational_flags_succeed(#[case] flag: &str, #[case] expected: &str) {
    let loader = FixedLoader::new(quiet_config());

    let invocation = invoke(&["assay", flag], &loader);

    assert_eq!(invocation.exit, ExitCode::SUCCESS);
    assert!(invocation.stdout.contains(expected), "stdout: {}", invocation.stdout);
}

#[rstest]
fn leading_configuration_flags_reach_the_loader(analysis: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = analysis;
    let loader = FixedLoader::new(quiet_config());

    let invocation = invoke(
        &["assay", "--log-format", "compact", root.as_str(), "--pretty"],
        &loader,
    );

    assert_eq!(invocation.exit, ExitCode::SUCCESS);
    let expected: Vec<OsString> = ["assay", "--log-format", "compact"]
        .into_iter()
        .map(OsString::from)
        .collect();
    assert_eq!(loader.seen(), [expected]);
}

#[rstest]
fn module_configuration_is_read_from_the_conf_dir(analysis: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = analysis;
    drop_files(&root, &["a.bin", "b.bin", "c.bin"]);
    let conf = TempDir::new().expect("conf dir");
    std::fs::write(conf.path().join("dropped.toml"), "max_files = 2\n").expect("write config");
    let config = Config {
        conf_dir: Utf8PathBuf::from_path_buf(conf.path().to_path_buf()).expect("utf8 path"),
        ..quiet_config()
    };
    let loader = FixedLoader::new(config);

    let invocation = invoke(&["assay", root.as_str()], &loader);

    assert_eq!(invocation.exit, ExitCode::SUCCESS);
    let dropped = document(&invocation)
        .get("dropped")
        .and_then(Value::as_array)
        .map(Vec::len);
    assert_eq!(dropped, Some(2));
}

#[rstest]
fn undeclared_namespace_fails_the_run(analysis: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = analysis;
    let config = Config {
        signatures_namespace: String::from("plugins.unknown"),
        ..quiet_config()
    };
    let loader = FixedLoader::new(config);

    let invocation = invoke(&["assay", root.as_str()], &loader);

    assert_eq!(invocation.exit, ExitCode::FAILURE);
    assert!(invocation.stdout.is_empty());
    assert!(
        invocation.stderr.contains("plugins.unknown"),
        "stderr: {}",
        invocation.stderr
    );
}
