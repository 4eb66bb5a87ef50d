mod common;

use common::{SuiteWorkspace, run_tj};
use serde_json::Value;

#[test]
fn e2e_analyze_writes_report() {
    let _log = common::test_log("e2e_analyze_writes_report");
    let workspace = SuiteWorkspace::mixed();

    let analyze = run_tj(&workspace, ["analyze", "--json"]);
    assert!(analyze.status.success(), "analyze failed: {}", analyze.stderr);

    let report = analyze.json();
    assert_eq!(report["total_tests"], 5);
    assert_eq!(report["obsolete_tests"][0], "tests/test_old.py::test_legacy_path");
    assert_eq!(report["duplicate_groups"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["files_by_ecosystem"]["python"], 3);
    assert_eq!(report["files_by_ecosystem"]["javascript"], 1);

    let persisted: Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.output("analysis_report.json")).expect("report"),
    )
    .expect("report is JSON");
    assert_eq!(persisted["total_tests"], report["total_tests"]);
    assert_eq!(persisted["valuable_tests"], report["valuable_tests"]);
}

#[test]
fn e2e_analyze_human_output() {
    let _log = common::test_log("e2e_analyze_human_output");
    let workspace = SuiteWorkspace::mixed();

    let analyze = run_tj(&workspace, ["analyze"]);
    assert!(analyze.status.success(), "analyze failed: {}", analyze.stderr);
    assert!(analyze.stdout.contains("Analysis report written to"));
    assert!(workspace.output("analysis_report.json").is_file());
}

#[test]
fn e2e_missing_target_is_structured_error() {
    let _log = common::test_log("e2e_missing_target_is_structured_error");
    let workspace = SuiteWorkspace::new();

    let analyze = run_tj(&workspace, ["analyze", "does-not-exist", "--json"]);
    assert_eq!(analyze.status.code(), Some(1));
    let error = analyze.error_json();
    assert_eq!(error["error"]["code"], "TARGET_NOT_FOUND");
}

#[test]
fn e2e_validate_requires_analysis() {
    let _log = common::test_log("e2e_validate_requires_analysis");
    let workspace = SuiteWorkspace::mixed();

    let validate = run_tj(&workspace, ["validate", "--json"]);
    assert_eq!(validate.status.code(), Some(1));
    let error = validate.error_json();
    assert_eq!(error["error"]["code"], "ARTIFACT_NOT_FOUND");
}

#[test]
fn e2e_document_after_analyze() {
    let _log = common::test_log("e2e_document_after_analyze");
    let workspace = SuiteWorkspace::mixed();

    let analyze = run_tj(&workspace, ["analyze"]);
    assert!(analyze.status.success(), "analyze failed: {}", analyze.stderr);
    let document = run_tj(&workspace, ["document"]);
    assert!(document.status.success(), "document failed: {}", document.stderr);

    let report = std::fs::read_to_string(workspace.output("docs/CLEANUP_REPORT.md"))
        .expect("cleanup report");
    assert!(report.starts_with("# Cleanup Report"));
    assert!(report.contains("_Cleanup did not run._"));
    assert!(workspace.output("docs/TESTING_STANDARDS.md").is_file());
    assert!(workspace.output("docs/TESTING_EXAMPLES.md").is_file());
}

#[test]
fn e2e_schema_lists_every_artifact() {
    let _log = common::test_log("e2e_schema_lists_every_artifact");
    let workspace = SuiteWorkspace::new();

    let schema = run_tj(&workspace, ["schema"]);
    assert!(schema.status.success(), "schema failed: {}", schema.stderr);
    let all = schema.json();
    for artifact in [
        "analysis_report.json",
        "cleanup_log.json",
        "validation_report.json",
        "pipeline_summary.json",
    ] {
        assert!(all[artifact].is_object(), "missing schema for {artifact}");
    }

    let single = run_tj(&workspace, ["schema", "validation"]);
    assert!(single.status.success(), "schema failed: {}", single.stderr);
    assert_eq!(single.json()["title"], "ValidationReport");
}

#[test]
fn e2e_config_layers() {
    let _log = common::test_log("e2e_config_layers");
    let workspace = SuiteWorkspace::new();
    workspace.write(".test-janitor.yaml", "analysis:\n  fragile-threshold: 0.25\n");

    let get = run_tj(&workspace, ["config", "--get", "analysis.fragile-threshold"]);
    assert!(get.status.success(), "config failed: {}", get.stderr);
    assert_eq!(get.stdout.trim(), "0.25");

    let all = run_tj(&workspace, ["--json", "config"]);
    assert!(all.status.success(), "config failed: {}", all.stderr);
    let values = all.json();
    assert_eq!(values["analysis.fragile-threshold"]["source"], ".test-janitor.yaml");
    assert_eq!(values["validation.iterations"]["source"], "default");

    let unknown = run_tj(&workspace, ["config", "--get", "no.such.key"]);
    assert_eq!(unknown.status.code(), Some(1));
}

#[test]
fn e2e_completions() {
    let _log = common::test_log("e2e_completions");
    let workspace = SuiteWorkspace::new();

    let bash = run_tj(&workspace, ["completions", "bash"]);
    assert!(bash.status.success(), "completions failed: {}", bash.stderr);
    assert!(bash.stdout.contains("_tj"));
}

#[test]
fn e2e_rollback_without_backups() {
    let _log = common::test_log("e2e_rollback_without_backups");
    let workspace = SuiteWorkspace::mixed();

    let list = run_tj(&workspace, ["--json", "rollback", "--list"]);
    assert!(list.status.success(), "list failed: {}", list.stderr);
    assert_eq!(list.json()["count"], 0);

    let restore = run_tj(&workspace, ["--json", "rollback", "--yes"]);
    assert_eq!(restore.status.code(), Some(1));
    assert_eq!(restore.error_json()["error"]["code"], "BACKUP_NOT_FOUND");
}
