//! Unit tests for the failure-isolated unit runner.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assay_config::StaticConfigSource;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::contract::SignatureMetadata;
use crate::registry::ModuleCatalog;
use crate::tests::{
    PanickingSource, ProcessingBehaviour, SignatureBehaviour, processing_module, signature_module,
};

const ENGINE: &str = "1.0.0";

#[fixture]
fn target() -> AnalysisTarget {
    AnalysisTarget::new("/analyses/17")
}

fn processing_entry(key: &str, behaviour: ProcessingBehaviour) -> ProcessingEntry {
    let mut catalog = ModuleCatalog::new();
    catalog
        .add(processing_module(&format!("modules.processing.{key}"), key, behaviour))
        .expect("add module");
    let registry = catalog.discover(&["modules.processing"]).expect("discover");
    registry
        .processing()
        .first()
        .cloned()
        .expect("one processing entry")
}

fn signature_entry(metadata: SignatureMetadata, behaviour: SignatureBehaviour) -> SignatureEntry {
    let mut catalog = ModuleCatalog::new();
    let path = format!("modules.signatures.{}", metadata.name);
    catalog
        .add(signature_module(&path, metadata, behaviour))
        .expect("add module");
    let registry = catalog.discover(&["modules.signatures"]).expect("discover");
    registry
        .signatures()
        .first()
        .cloned()
        .expect("one signature entry")
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

#[rstest]
fn processing_unit_contributes_its_key_and_value(target: AnalysisTarget) {
    let entry = processing_entry("network", ProcessingBehaviour::Produce(json!({"hosts": 3})));
    let outcome = UnitRunner::new().run_processing(&entry, &target, &StaticConfigSource::new());
    assert_eq!(outcome, Some((String::from("network"), json!({"hosts": 3}))));
}

#[rstest]
fn processing_unit_is_bound_to_the_target(target: AnalysisTarget) {
    let entry = processing_entry("echo", ProcessingBehaviour::EchoTarget);
    let outcome = UnitRunner::new().run_processing(&entry, &target, &StaticConfigSource::new());
    assert_eq!(outcome, Some((String::from("echo"), json!("/analyses/17"))));
}

#[rstest]
fn processing_unit_receives_its_configuration(target: AnalysisTarget) {
    let mut table = toml::Table::new();
    table.insert(String::from("depth"), toml::Value::Integer(4));
    let configs = StaticConfigSource::new().with_module("tuned", table);

    let entry = processing_entry("tuned", ProcessingBehaviour::EchoConfig(String::from("depth")));
    let outcome = UnitRunner::new().run_processing(&entry, &target, &configs);
    assert_eq!(outcome, Some((String::from("tuned"), json!(4))));
}

#[rstest]
#[case::not_implemented(ProcessingBehaviour::NotImplemented)]
#[case::domain_error(ProcessingBehaviour::DomainError(String::from("pcap is truncated")))]
#[case::unexpected(ProcessingBehaviour::Unexpected(String::from("boom")))]
#[case::panic(ProcessingBehaviour::Panic(String::from("index out of range")))]
fn failing_processing_unit_contributes_nothing(
    target: AnalysisTarget,
    #[case] behaviour: ProcessingBehaviour,
) {
    let entry = processing_entry("fragile", behaviour);
    let outcome = UnitRunner::new().run_processing(&entry, &target, &StaticConfigSource::new());
    assert!(outcome.is_none());
}

#[rstest]
fn processing_unit_over_its_timeout_contributes_nothing(target: AnalysisTarget) {
    let entry = processing_entry("slow", ProcessingBehaviour::Sleep(Duration::from_secs(2)));
    let runner = UnitRunner::new().with_timeout(Some(Duration::from_millis(50)));
    let outcome = runner.run_processing(&entry, &target, &StaticConfigSource::new());
    assert!(outcome.is_none());
}

#[rstest]
fn timed_out_unit_does_not_hold_up_the_next_one(target: AnalysisTarget) {
    let runner = UnitRunner::new().with_timeout(Some(Duration::from_millis(50)));
    let slow = processing_entry("stalled", ProcessingBehaviour::Sleep(Duration::from_secs(3)));
    let next = processing_entry("next", ProcessingBehaviour::Produce(json!("ran")));
    let started = std::time::Instant::now();

    let stalled = runner.run_processing(&slow, &target, &StaticConfigSource::new());
    let following = runner.run_processing(&next, &target, &StaticConfigSource::new());

    assert!(stalled.is_none());
    assert_eq!(following, Some((String::from("next"), json!("ran"))));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[rstest]
fn processing_unit_within_its_timeout_still_contributes(target: AnalysisTarget) {
    let entry = processing_entry("quick", ProcessingBehaviour::Produce(json!(true)));
    let runner = UnitRunner::new().with_timeout(Some(Duration::from_secs(5)));
    let outcome = runner.run_processing(&entry, &target, &StaticConfigSource::new());
    assert_eq!(outcome, Some((String::from("quick"), json!(true))));
}

#[rstest]
fn processing_unit_with_unreadable_configuration_is_skipped(target: AnalysisTarget) {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    std::fs::write(root.join("broken.toml"), "depth = [").expect("write config");
    let configs = assay_config::TomlConfigSource::new(root);

    let entry = processing_entry("broken", ProcessingBehaviour::Produce(json!(1)));
    let outcome = UnitRunner::new().run_processing(&entry, &target, &configs);
    assert!(outcome.is_none());
}

#[rstest]
fn key_set_while_running_files_the_result(target: AnalysisTarget) {
    let entry = processing_entry(
        "initial",
        ProcessingBehaviour::RenameInRun(String::from("set_in_run")),
    );
    let outcome = UnitRunner::new().run_processing(&entry, &target, &StaticConfigSource::new());
    assert_eq!(outcome, Some((String::from("set_in_run"), json!(1))));
}

#[rstest]
fn key_chosen_by_configuration_files_the_result(target: AnalysisTarget) {
    let mut table = toml::Table::new();
    table.insert(String::from("slot"), toml::Value::String(String::from("network")));
    let configs = StaticConfigSource::new().with_module("slotted", table);

    let entry = processing_entry("slotted", ProcessingBehaviour::KeyFromConfig);
    let outcome = UnitRunner::new().run_processing(&entry, &target, &configs);
    assert_eq!(outcome, Some((String::from("network"), json!(1))));
}

#[rstest]
#[case::inline(None)]
#[case::worker(Some(Duration::from_secs(5)))]
fn panicking_configuration_source_fails_only_that_unit(
    target: AnalysisTarget,
    #[case] timeout: Option<Duration>,
) {
    let entry = processing_entry("configured", ProcessingBehaviour::Produce(json!(1)));
    let runner = UnitRunner::new().with_timeout(timeout);

    let outcome = runner.run_processing(&entry, &target, &PanickingSource);

    assert!(outcome.is_none());
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

#[test]
fn matching_signature_yields_a_record() {
    let metadata = SignatureMetadata::new("antivm")
        .with_description("Detects virtual machine probing")
        .with_severity(3)
        .with_reference("https://example.org/antivm");
    let entry = signature_entry(metadata, SignatureBehaviour::Match);

    let record = UnitRunner::new()
        .run_signature(&entry, &ResultDocument::new(), ENGINE)
        .expect("signature matches");
    assert_eq!(record.name, "antivm");
    assert_eq!(record.severity, 3);
    assert_eq!(record.references, ["https://example.org/antivm"]);
}

#[test]
fn evidence_gathered_during_run_is_captured() {
    let mut results = ResultDocument::new();
    results.insert("network", json!({}));
    results.insert("behavior", json!({}));
    let entry = signature_entry(SignatureMetadata::new("keys"), SignatureBehaviour::CollectKeys);

    let record = UnitRunner::new()
        .run_signature(&entry, &results, ENGINE)
        .expect("signature matches");
    assert_eq!(record.data, [json!("behavior"), json!("network")]);
}

#[rstest]
#[case::no_match(SignatureBehaviour::NoMatch)]
#[case::not_implemented(SignatureBehaviour::NotImplemented)]
#[case::failure(SignatureBehaviour::Fail(String::from("bad lookup")))]
#[case::panic(SignatureBehaviour::Panic(String::from("unwrap on None")))]
fn non_matching_signature_yields_nothing(#[case] behaviour: SignatureBehaviour) {
    let entry = signature_entry(SignatureMetadata::new("quiet"), behaviour);
    let outcome = UnitRunner::new().run_signature(&entry, &ResultDocument::new(), ENGINE);
    assert!(outcome.is_none());
}

#[test]
fn signature_over_its_timeout_yields_nothing() {
    let entry = signature_entry(
        SignatureMetadata::new("slow"),
        SignatureBehaviour::Sleep(Duration::from_secs(2)),
    );
    let runner = UnitRunner::new().with_timeout(Some(Duration::from_millis(50)));
    assert!(
        runner
            .run_signature(&entry, &ResultDocument::new(), ENGINE)
            .is_none()
    );
}

#[rstest]
#[case::too_old(SignatureMetadata::new("gated").with_minimum("2.0.0"))]
#[case::too_new(SignatureMetadata::new("gated").with_maximum("0.9"))]
#[case::malformed_minimum(SignatureMetadata::new("gated").with_minimum("abc"))]
#[case::malformed_maximum(SignatureMetadata::new("gated").with_maximum("1.x"))]
fn signature_outside_the_engine_range_is_not_run(#[case] metadata: SignatureMetadata) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let entry = signature_entry(
        metadata,
        SignatureBehaviour::Observe(String::from("any"), Arc::clone(&seen)),
    );

    let outcome = UnitRunner::new().run_signature(&entry, &ResultDocument::new(), ENGINE);

    assert!(outcome.is_none());
    assert!(seen.lock().expect("lock").is_empty(), "signature must not run");
}

#[rstest]
#[case::inside(SignatureMetadata::new("ranged").with_minimum("0.9").with_maximum("1.0.0"))]
#[case::empty_bounds(SignatureMetadata::new("ranged").with_minimum("").with_maximum(""))]
fn signature_inside_the_engine_range_runs(#[case] metadata: SignatureMetadata) {
    let entry = signature_entry(metadata, SignatureBehaviour::Match);
    let outcome = UnitRunner::new().run_signature(&entry, &ResultDocument::new(), ENGINE);
    assert!(outcome.is_some());
}

#[test]
fn disabled_signature_is_skipped_before_the_version_gate() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let metadata = SignatureMetadata::new("dormant")
        .with_enabled(false)
        .with_minimum("not-a-version");
    let entry = signature_entry(
        metadata,
        SignatureBehaviour::Observe(String::from("any"), Arc::clone(&seen)),
    );

    let outcome = UnitRunner::new().run_signature(&entry, &ResultDocument::new(), ENGINE);

    assert!(outcome.is_none());
    assert!(seen.lock().expect("lock").is_empty());
}

#[test]
fn signature_mutations_stay_in_its_snapshot() {
    let mut results = ResultDocument::new();
    results.insert("network", json!({"hosts": 1}));
    let entry = signature_entry(
        SignatureMetadata::new("vandal"),
        SignatureBehaviour::Mutate(String::from("network")),
    );

    let outcome = UnitRunner::new().run_signature(&entry, &results, ENGINE);

    assert!(outcome.is_some());
    assert_eq!(results.get("network"), Some(&json!({"hosts": 1})));
}

#[test]
fn unbounded_signature_ignores_a_malformed_engine_version() {
    let entry = signature_entry(SignatureMetadata::new("free"), SignatureBehaviour::Match);
    let outcome = UnitRunner::new().run_signature(&entry, &ResultDocument::new(), "dev");
    assert!(outcome.is_some());
}

#[test]
fn bounded_signature_is_skipped_when_the_engine_version_is_malformed() {
    let entry = signature_entry(
        SignatureMetadata::new("bounded").with_minimum("0.1"),
        SignatureBehaviour::Match,
    );
    let outcome = UnitRunner::new().run_signature(&entry, &ResultDocument::new(), "dev");
    assert!(outcome.is_none());
}

#[test]
fn observed_value_matches_the_input_document() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut results = ResultDocument::new();
    results.insert("static", json!("pe32"));
    let entry = signature_entry(
        SignatureMetadata::new("observer"),
        SignatureBehaviour::Observe(String::from("static"), Arc::clone(&seen)),
    );

    let outcome = UnitRunner::new().run_signature(&entry, &results, ENGINE);

    assert!(outcome.is_some());
    let observed: Vec<Option<Value>> = seen.lock().expect("lock").clone();
    assert_eq!(observed, [Some(json!("pe32"))]);
}
