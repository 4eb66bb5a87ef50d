mod common;

use common::{SuiteWorkspace, run_tj};
use serde_json::Value;
use std::fs;

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).expect("artifact exists"))
        .expect("artifact is JSON")
}

#[test]
fn e2e_dry_run_leaves_suite_untouched() {
    let _log = common::test_log("e2e_dry_run_leaves_suite_untouched");
    let workspace = SuiteWorkspace::mixed();
    let before = workspace.snapshot();

    let run = run_tj(&workspace, ["run", "--dry-run", "--skip-validation", "--json"]);
    assert!(run.status.success(), "run failed: {}", run.stderr);

    let outcome = run.json();
    assert_eq!(outcome["state"], "done");
    assert_eq!(outcome["dry_run"], true);
    assert_eq!(outcome["backup_created"], false);
    assert_eq!(outcome["cleanup_applied"], false);
    assert!(outcome["validation"].is_null());
    assert!(
        outcome["cleanup"]["actions"]
            .as_array()
            .is_some_and(|actions| !actions.is_empty()),
        "dry run should still plan actions"
    );

    assert_eq!(workspace.snapshot(), before, "dry run modified the suite");
    assert!(!workspace.root.join(".test-janitor-backups").exists());
    assert!(workspace.output("pipeline_summary.json").is_file());
    assert!(workspace.output("docs/CLEANUP_REPORT.md").is_file());
}

#[test]
fn e2e_cleanup_then_rollback_restores_bytes() {
    let _log = common::test_log("e2e_cleanup_then_rollback_restores_bytes");
    let workspace = SuiteWorkspace::mixed();
    let before = workspace.snapshot();

    let run = run_tj(&workspace, ["run", "--skip-validation", "--json"]);
    assert!(run.status.success(), "run failed: {}", run.stderr);
    let outcome = run.json();
    assert_eq!(outcome["state"], "done");
    assert_eq!(outcome["backup_created"], true);
    assert_ne!(workspace.snapshot(), before, "cleanup changed nothing");

    let log = read_json(&workspace.output("cleanup_log.json"));
    assert!(log["actions"].as_array().is_some_and(|a| !a.is_empty()));

    let list = run_tj(&workspace, ["--json", "rollback", "--list"]);
    assert!(list.status.success(), "list failed: {}", list.stderr);
    assert_eq!(list.json()["count"], 1);

    let refused = run_tj(&workspace, ["rollback"]);
    assert_eq!(refused.status.code(), Some(1), "rollback must require --yes without a TTY");

    let preview = run_tj(&workspace, ["--json", "rollback", "--dry-run"]);
    assert!(preview.status.success(), "preview failed: {}", preview.stderr);
    assert_eq!(preview.json()["dry_run"], true);

    let restore = run_tj(&workspace, ["--json", "rollback", "--yes"]);
    assert!(restore.status.success(), "restore failed: {}", restore.stderr);
    assert_eq!(workspace.snapshot(), before, "rollback did not restore every byte");
}

#[test]
fn e2e_cleanup_command_backs_up_first() {
    let _log = common::test_log("e2e_cleanup_command_backs_up_first");
    let workspace = SuiteWorkspace::mixed();

    let cleanup = run_tj(&workspace, ["cleanup", "--json"]);
    assert!(cleanup.status.success(), "cleanup failed: {}", cleanup.stderr);

    let summary = read_json(&workspace.output("pipeline_summary.json"));
    assert_eq!(summary["backup_created"], true);
    assert!(summary["docs"].as_array().is_some_and(Vec::is_empty));
    assert!(!workspace.read("tests/test_a.py").is_empty());
}

#[test]
fn e2e_skip_cleanup_only_analyzes_and_documents() {
    let _log = common::test_log("e2e_skip_cleanup_only_analyzes_and_documents");
    let workspace = SuiteWorkspace::mixed();
    let before = workspace.snapshot();

    let run = run_tj(&workspace, ["run", "--skip-cleanup", "--skip-validation", "--json"]);
    assert!(run.status.success(), "run failed: {}", run.stderr);
    let outcome = run.json();
    assert_eq!(outcome["state"], "done");
    assert!(outcome["cleanup"].is_null());
    assert_eq!(workspace.snapshot(), before);
}
