//! Integration tests for the gitstate binary.
//!
//! These tests exercise the compiled binary with assert_cmd against real
//! git repositories built by `GitFixture`.

use assert_cmd::Command;
use gitstate_test_utils::{GitFixture, write_config};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const CONFIG: &str = r#"
[workspace]
name = "acme"

[branch.feature]
pattern = "${workspace.namespace}/feature/*"
"#;

fn workspace() -> GitFixture {
    let fixture = GitFixture::with_commit(1_700_000_000);
    write_config(fixture.path(), CONFIG);
    fixture
}

/// Get a Command for the gitstate binary, rooted at `fixture`
fn gitstate(fixture: &GitFixture) -> Command {
    let mut cmd = Command::cargo_bin("gitstate").unwrap();
    cmd.arg("-C").arg(fixture.path()).env_remove("RUST_LOG");
    cmd
}

fn stdout_json(fixture: &GitFixture, args: &[&str]) -> Value {
    let output = gitstate(fixture).args(args).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

// ============================================================================
// Help
// ============================================================================

#[test]
fn help_lists_commands() {
    Command::cargo_bin("gitstate")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("refresh"))
        .stdout(predicate::str::contains("drift"));
}

#[test]
fn no_command_shows_help_hint() {
    Command::cargo_bin("gitstate")
        .unwrap()
        .assert()
        .success()
        .stdout(predicate::str::contains("gitstate --help"));
}

// ============================================================================
// Reads
// ============================================================================

#[test]
fn refresh_writes_state_file() {
    let fixture = workspace();
    gitstate(&fixture)
        .args(["refresh", "--full"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rebuilt state"));

    assert!(fixture.path().join(".gitstate/state.json").exists());
    assert!(fixture.path().join(".gitstate/state.json.sha256").exists());
}

#[test]
fn get_initializes_missing_state() {
    let fixture = workspace();
    gitstate(&fixture)
        .args(["get", "repositorySnapshot.currentBranch"])
        .assert()
        .success()
        .stdout("\"main\"\n");
}

#[test]
fn get_absent_path_fails_without_default() {
    let fixture = workspace();
    gitstate(&fixture)
        .args(["get", "metadata.custom.ticket"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no value at 'metadata.custom.ticket'"));

    gitstate(&fixture)
        .args(["get", "metadata.custom.ticket", "--default", "42"])
        .assert()
        .success()
        .stdout("42\n");
}

#[test]
fn dump_prints_whole_document() {
    let fixture = workspace();
    let doc = stdout_json(&fixture, &["dump"]);
    assert_eq!(doc["metadata"]["workspaceIdentity"], "acme");
    assert!(doc["decisionSet"]["canCreateBranch"]["allowed"].as_bool().unwrap());
}

#[test]
fn summary_describes_workspace() {
    let fixture = workspace();
    gitstate(&fixture)
        .arg("summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("namespace acme"))
        .stdout(predicate::str::contains("Working tree: clean"));
}

// ============================================================================
// Writes
// ============================================================================

#[test]
fn set_then_get_round_trips() {
    let fixture = workspace();
    gitstate(&fixture)
        .args(["set", "metadata.custom.ticket", "{\"id\": 7}"])
        .assert()
        .success();

    let value = stdout_json(&fixture, &["get", "metadata.custom.ticket.id"]);
    assert_eq!(value, 7);
}

#[test]
fn set_unknown_field_is_rejected() {
    let fixture = workspace();
    gitstate(&fixture).arg("refresh").assert().success();
    let before = std::fs::read(fixture.path().join(".gitstate/state.json")).unwrap();

    gitstate(&fixture)
        .args(["set", "metadata.nonsense", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));

    let after = std::fs::read(fixture.path().join(".gitstate/state.json")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn set_many_requires_key_value_pairs() {
    let fixture = workspace();
    gitstate(&fixture)
        .args(["set-many", "metadata.custom.a=1", "missing-separator"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected path=value"));

    gitstate(&fixture)
        .args(["set-many", "metadata.custom.a=1", "metadata.custom.b=two"])
        .assert()
        .success();
    let custom = stdout_json(&fixture, &["get", "metadata.custom"]);
    assert_eq!(custom, serde_json::json!({"a": 1, "b": "two"}));
}

#[test]
fn incr_and_append_print_results() {
    let fixture = workspace();
    gitstate(&fixture)
        .args(["incr", "metadata.counters.builds", "--by", "3"])
        .assert()
        .success()
        .stdout("3\n");

    for n in 1..=3 {
        gitstate(&fixture)
            .args(["append", "metadata.custom.recent", &n.to_string(), "--max", "2"])
            .assert()
            .success();
    }
    let recent = stdout_json(&fixture, &["get", "metadata.custom.recent"]);
    assert_eq!(recent, serde_json::json!([2, 3]));

    gitstate(&fixture)
        .args(["remove", "metadata.custom.recent"])
        .assert()
        .success();
    gitstate(&fixture)
        .args(["get", "metadata.custom.recent"])
        .assert()
        .failure();
}

// ============================================================================
// Events and drift
// ============================================================================

#[test]
fn branch_created_event_adds_record() {
    let fixture = workspace();
    fixture.create_branch("acme/feature/login");
    gitstate(&fixture)
        .args(["event", "branch-created", "acme/feature/login", "--parent", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("branch-created"));

    let record = stdout_json(
        &fixture,
        &["get", "repositorySnapshot.branches[acme/feature/login]"],
    );
    assert_eq!(record["classification"], "feature");
    let count = stdout_json(&fixture, &["get", "metadata.counters.branchesCreated"]);
    assert_eq!(count, 1);
}

#[test]
fn drift_is_reported_then_repaired() {
    let fixture = workspace();
    gitstate(&fixture).arg("refresh").assert().success();
    gitstate(&fixture)
        .arg("drift")
        .assert()
        .success()
        .stdout(predicate::str::contains("No drift"));

    fixture.write_file("notes.txt", "draft\n");
    gitstate(&fixture)
        .args(["drift", "--repair", "report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("workingTree.clean"))
        .stdout(predicate::str::contains("Not repaired"));
    gitstate(&fixture)
        .arg("verify")
        .assert()
        .failure()
        .stderr(predicate::str::contains("workingTree.clean"));

    gitstate(&fixture)
        .args(["drift", "--repair", "auto"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Repaired"));
    gitstate(&fixture)
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("State matches repository"));
}

#[test]
fn verify_passes_but_lists_non_gating_drift() {
    let fixture = workspace();
    gitstate(&fixture).arg("refresh").assert().success();
    for name in ["acme/feature/a", "acme/feature/b", "acme/feature/c"] {
        fixture.create_branch(name);
    }

    gitstate(&fixture)
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("State usable, but cached fields differ"))
        .stdout(predicate::str::contains("branchCount"));
}

#[test]
fn drift_json_reports_outcome() {
    let fixture = workspace();
    gitstate(&fixture).arg("refresh").assert().success();
    fixture.write_file("notes.txt", "draft\n");

    let outcome = stdout_json(&fixture, &["drift", "--json"]);
    assert_eq!(outcome["applied"], false);
    assert_eq!(outcome["mode"], "report-only");
    assert_eq!(outcome["report"]["items"][0]["field"], "workingTree.clean");
}

#[test]
fn outside_a_repository_fails() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("gitstate")
        .unwrap()
        .arg("-C")
        .arg(dir.path())
        .arg("summary")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
