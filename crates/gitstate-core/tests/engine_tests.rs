//! State engine: cache triggers, read/write API, events and drift

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use gitstate_config::{RepairMode, WorkspaceConfiguration};
use gitstate_core::{
    Error, FixedAnswer, ProjectedTiming, RefreshTrigger, StateEngine, StateEvent, StateStore,
};
use gitstate_git::{ChangeKind, FileChange};
use gitstate_test_utils::{FakeBranch, FakeRepository};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

const CONFIG: &str = r#"
[workspace]
name = "acme"

[branch.feature]
pattern = "${workspace.namespace}/feature/*"

[branch.session]
pattern = "${workspace.namespace}/session/"

[lifecycle.feature]
delete_after_merge = true
retention_days = 0

[lifecycle.session]
retention_days = "never"

[limits]
cache_max_age = "5m"
history_size = 3
"#;

#[derive(Clone)]
struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(
            Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap(),
        )))
    }

    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }

    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

struct Harness {
    dir: TempDir,
    repo: FakeRepository,
    clock: TestClock,
}

impl Harness {
    fn new() -> Self {
        let clock = TestClock::new();
        let repo = FakeRepository::with_main(clock.now() - Duration::days(60));
        Self {
            dir: TempDir::new().unwrap(),
            repo,
            clock,
        }
    }

    fn engine_with(&self, toml: &str) -> StateEngine<FakeRepository> {
        let raw = WorkspaceConfiguration::from_toml_str(toml).unwrap();
        let clock = self.clock.clone();
        StateEngine::with_reader(self.dir.path(), raw, self.repo.clone())
            .unwrap()
            .with_clock(move || clock.now())
    }

    fn engine(&self) -> StateEngine<FakeRepository> {
        self.engine_with(CONFIG)
    }

    /// Engine with a freshly built document.
    fn fresh(&self) -> StateEngine<FakeRepository> {
        let mut engine = self.engine();
        engine.ensure_fresh().unwrap();
        engine
    }

    fn state_bytes(&self) -> Vec<u8> {
        std::fs::read(self.dir.path().join(".gitstate/state.json")).unwrap()
    }
}

// ---- cache triggers -----------------------------------------------------

#[test]
fn missing_document_is_built_on_first_use() {
    let h = Harness::new();
    let mut engine = h.engine();

    assert_eq!(engine.staleness().unwrap(), Some(RefreshTrigger::Missing));
    assert_eq!(engine.ensure_fresh().unwrap(), Some(RefreshTrigger::Missing));
    assert_eq!(engine.ensure_fresh().unwrap(), None);

    let doc = engine.document().unwrap();
    assert_eq!(doc.metadata.workspace_identity, "acme");
    assert_eq!(doc.metadata.last_operation.unwrap().name, "refresh-full");
    assert!(engine.store().digest_path().exists());
}

#[test]
fn configuration_change_forces_rebuild_before_age_threshold() {
    let h = Harness::new();
    let mut engine = h.fresh();
    engine.increment("metadata.counters.runs", 1).unwrap();
    let old = engine.document().unwrap();

    let changed = format!("{CONFIG}\n[workflow.merge]\nfeature_strategy = \"rebase\"\n");
    let mut engine = h.engine_with(&changed);
    let trigger = engine.staleness().unwrap();
    assert!(
        matches!(trigger, Some(RefreshTrigger::FingerprintChanged { .. })),
        "{trigger:?}"
    );

    engine.ensure_fresh().unwrap();
    let doc = engine.document().unwrap();
    assert_ne!(doc.metadata.config_fingerprint, old.metadata.config_fingerprint);
    assert_eq!(doc.metadata.config_fingerprint, engine.raw_configuration().fingerprint());
    assert_eq!(doc.compiled_configuration.workflow.merge.feature_strategy, "rebase");
    // Tooling-owned data survives the rebuild
    assert_eq!(doc.metadata.counters["runs"], 1);
    assert_eq!(doc.metadata.generated_at, old.metadata.generated_at);
}

#[test]
fn shrinking_history_size_trims_inherited_history() {
    let h = Harness::new();
    let mut engine = h.fresh();
    for branch in ["personal/a", "personal/b", "personal/c"] {
        engine
            .report_event(&StateEvent::BranchPushed {
                branch: branch.into(),
            })
            .unwrap();
    }
    assert_eq!(engine.document().unwrap().metadata.history.len(), 3);

    let smaller = CONFIG.replace("history_size = 3", "history_size = 1");
    let mut engine = h.engine_with(&smaller);
    assert!(matches!(
        engine.ensure_fresh().unwrap(),
        Some(RefreshTrigger::FingerprintChanged { .. })
    ));

    let doc = engine.document().unwrap();
    assert_eq!(doc.metadata.history.len(), 1);
    assert_eq!(
        doc.metadata.history[0].event,
        StateEvent::BranchPushed {
            branch: "personal/c".into()
        }
    );
    assert_eq!(doc.metadata.counters["pushes"], 3);
    // Writes keep working under the new limit
    engine.set("metadata.custom.after", json!(true)).unwrap();
}

#[test]
fn retention_beyond_calendar_range_never_schedules() {
    let h = Harness::new();
    h.repo.add_branch(
        "acme/feature/x",
        FakeBranch::at(h.clock.now() - Duration::days(2)),
    );
    let forever = CONFIG.replace(
        "delete_after_merge = true\nretention_days = 0",
        "delete_after_merge = false\nretention_days = 100000000",
    );
    assert_ne!(forever, CONFIG);
    let mut engine = h.engine_with(&forever);

    engine.ensure_fresh().unwrap();
    let doc = engine.document().unwrap();
    let record = doc.repository_snapshot.branch("acme/feature/x").unwrap();
    assert_eq!(record.deletion.timing, ProjectedTiming::Never);
    assert_eq!(record.deletion.date, None);
    assert!(doc.decision_set.branches_for_cleanup.is_empty());
}

#[test]
fn age_threshold_marks_document_stale() {
    let h = Harness::new();
    let mut engine = h.fresh();

    h.clock.advance(Duration::minutes(4));
    assert_eq!(engine.staleness().unwrap(), None);

    h.clock.advance(Duration::minutes(2));
    assert_eq!(
        engine.staleness().unwrap(),
        Some(RefreshTrigger::Stale { age_ms: 360_000 })
    );
    engine.ensure_fresh().unwrap();
    assert_eq!(engine.document().unwrap().metadata.last_refresh, h.clock.now());
}

#[test]
fn other_document_version_triggers_rebuild() {
    let h = Harness::new();
    let mut engine = h.fresh();
    let mut value: serde_json::Value = serde_json::from_slice(&h.state_bytes()).unwrap();
    value["metadata"]["version"] = json!(0);
    std::fs::write(
        h.dir.path().join(".gitstate/state.json"),
        serde_json::to_vec(&value).unwrap(),
    )
    .unwrap();

    assert_eq!(
        engine.ensure_fresh().unwrap(),
        Some(RefreshTrigger::VersionMismatch {
            found: "0".to_string()
        })
    );
    assert_eq!(engine.document().unwrap().metadata.version, 1);
}

#[test]
fn corrupt_document_is_fatal() {
    let h = Harness::new();
    let mut engine = h.fresh();
    std::fs::write(h.dir.path().join(".gitstate/state.json"), "{ broken").unwrap();

    assert!(matches!(engine.ensure_fresh(), Err(Error::Corrupt { .. })));
    assert!(matches!(engine.set("metadata.custom.x", json!(1)), Err(Error::Corrupt { .. })));
}

#[test]
fn slow_repository_reports_query_timeout() {
    let h = Harness::new();
    let mut engine = h.engine_with(&format!("{CONFIG}query_timeout = \"10ms\"\n"));
    h.repo.set_query_delay(Some(std::time::Duration::from_millis(20)));

    assert!(matches!(engine.refresh_full(), Err(Error::QueryTimeout { .. })));
    assert!(!h.dir.path().join(".gitstate/state.json").exists());
}

#[test]
fn partial_refresh_updates_runtime_only() {
    let h = Harness::new();
    let mut engine = h.fresh();
    h.repo.add_branch("acme/feature/new", FakeBranch::at(h.clock.now()));
    h.repo.set_stash(2);

    engine.refresh_partial().unwrap();
    let doc = engine.document().unwrap();
    assert_eq!(doc.repository_snapshot.stash_count, 2);
    assert!(doc.repository_snapshot.branch("acme/feature/new").is_none());

    engine.refresh_full().unwrap();
    assert!(engine.document().unwrap().repository_snapshot.branch("acme/feature/new").is_some());
}

#[test]
fn partial_refresh_without_document_builds_one() {
    let h = Harness::new();
    let mut engine = h.engine();
    engine.refresh_partial().unwrap();
    assert!(engine.document().unwrap().repository_snapshot.main_branch_exists);
}

// ---- reads --------------------------------------------------------------

#[test]
fn reads_before_refresh_report_missing_document() {
    let h = Harness::new();
    let engine = h.engine();
    assert!(matches!(engine.get("metadata"), Err(Error::MissingDocument { .. })));
}

#[test]
fn point_lookups_follow_paths() {
    let h = Harness::new();
    let engine = h.fresh();

    assert_eq!(engine.get("metadata.workspaceIdentity").unwrap(), Some(json!("acme")));
    assert_eq!(
        engine.get("repositorySnapshot.branches[main].classification").unwrap(),
        Some(json!("main"))
    );
    assert_eq!(engine.get("decisionSet.prompts.nothing").unwrap(), None);
    assert_eq!(engine.get_or("metadata.custom.missing", json!(3)).unwrap(), json!(3));
    assert!(matches!(engine.get("metadata..version"), Err(Error::InvalidPath { .. })));
}

#[test]
fn dump_is_the_persisted_document() {
    let h = Harness::new();
    let engine = h.fresh();
    let dumped: serde_json::Value = serde_json::from_str(&engine.dump().unwrap()).unwrap();
    let stored: serde_json::Value = serde_json::from_slice(&h.state_bytes()).unwrap();
    assert_eq!(dumped, stored);
}

#[test]
fn summary_reports_branch_and_decisions() {
    let h = Harness::new();
    h.repo.set_changes(&[("README.md", ChangeKind::Modified)]);
    let engine = h.fresh();

    let summary = engine.summary().unwrap();
    assert!(summary.contains("Workspace: acme"), "{summary}");
    assert!(summary.contains("Branch: main [main]"), "{summary}");
    assert!(summary.contains("Working tree: 1 modified"), "{summary}");
    assert!(summary.contains("Can create branch: no (uncommitted changes)"), "{summary}");
}

// ---- writes -------------------------------------------------------------

#[test]
fn set_then_get_round_trips() {
    let h = Harness::new();
    let mut engine = h.fresh();

    engine.set("metadata.custom.tool", json!({"name": "agent", "runs": 2})).unwrap();
    assert_eq!(engine.get("metadata.custom.tool.runs").unwrap(), Some(json!(2)));
    assert_eq!(engine.document().unwrap().metadata.last_operation.unwrap().name, "set");
}

#[test]
fn snapshot_writes_recompute_decisions() {
    let h = Harness::new();
    let mut engine = h.fresh();
    assert_eq!(engine.get("decisionSet.canCreateBranch.allowed").unwrap(), Some(json!(true)));

    engine.set("repositorySnapshot.workingTree.clean", json!(false)).unwrap();
    assert_eq!(engine.get("decisionSet.canCreateBranch.allowed").unwrap(), Some(json!(false)));
}

#[rstest]
#[case::unknown_field("metadata.notAField", json!(1))]
#[case::wrong_type("repositorySnapshot.stashCount", json!("many"))]
#[case::derived_section("compiledConfiguration.workspace.mainBranch", json!("trunk"))]
#[case::raw_section("rawConfiguration.values", json!({}))]
#[case::version("metadata.version", json!(2))]
fn invalid_writes_leave_document_untouched(#[case] path: &str, #[case] value: serde_json::Value) {
    let h = Harness::new();
    let mut engine = h.fresh();
    let before = h.state_bytes();

    let err = engine.set(path, value).unwrap_err();
    assert!(matches!(err, Error::InvalidMutation { .. }), "{err}");
    assert_eq!(h.state_bytes(), before);
}

#[test]
fn batch_set_is_all_or_nothing() {
    let h = Harness::new();
    let mut engine = h.fresh();

    let err = engine
        .set_batch([
            ("metadata.custom.a", json!(1)),
            ("repositorySnapshot.stashCount", json!(-1)),
        ])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidMutation { .. }), "{err}");
    assert_eq!(engine.get("metadata.custom.a").unwrap(), None);

    engine
        .set_batch([("metadata.custom.a", json!(1)), ("metadata.custom.b", json!(2))])
        .unwrap();
    assert_eq!(engine.get("metadata.custom.b").unwrap(), Some(json!(2)));
}

#[test]
fn increment_accumulates_and_rejects_non_numbers() {
    let h = Harness::new();
    let mut engine = h.fresh();

    assert_eq!(engine.increment("metadata.custom.count", 5).unwrap(), 5);
    assert_eq!(engine.increment("metadata.custom.count", -2).unwrap(), 3);
    assert!(matches!(
        engine.increment("metadata.workspaceIdentity", 1),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn append_keeps_newest_entries() {
    let h = Harness::new();
    let mut engine = h.fresh();

    for i in 0..5 {
        engine.append_bounded("metadata.custom.recent", json!(i), 3).unwrap();
    }
    assert_eq!(engine.get("metadata.custom.recent").unwrap(), Some(json!([2, 3, 4])));
}

#[test]
fn remove_returns_previous_value() {
    let h = Harness::new();
    let mut engine = h.fresh();
    engine.set("metadata.custom.flag", json!(true)).unwrap();

    assert_eq!(engine.remove("metadata.custom.flag").unwrap(), Some(json!(true)));
    assert_eq!(engine.remove("metadata.custom.flag").unwrap(), None);
    assert!(matches!(
        engine.remove("metadata.workspaceIdentity"),
        Err(Error::InvalidMutation { .. })
    ));
}

// ---- events -------------------------------------------------------------

#[test]
fn branch_lifecycle_events_update_snapshot_and_history() {
    let h = Harness::new();
    let mut engine = h.fresh();

    engine
        .report_event(&StateEvent::BranchCreated {
            branch: "acme/feature/login".into(),
            parent: Some("main".into()),
        })
        .unwrap();
    engine
        .report_event(&StateEvent::BranchSwitched {
            from: Some("main".into()),
            to: "acme/feature/login".into(),
        })
        .unwrap();

    let doc = engine.document().unwrap();
    let record = doc.repository_snapshot.branch("acme/feature/login").unwrap();
    assert_eq!(record.classification, "feature");
    assert_eq!(record.deletion.timing, ProjectedTiming::Pending);
    assert_eq!(doc.repository_snapshot.current_branch.as_deref(), Some("acme/feature/login"));
    assert_eq!(doc.decision_set.merge_target.as_deref(), Some("main"));
    assert_eq!(doc.metadata.counters["branchesCreated"], 1);
    assert_eq!(doc.metadata.counters["branchSwitches"], 1);
    assert_eq!(doc.metadata.history.len(), 2);

    engine
        .report_event(&StateEvent::BranchMerged {
            branch: "acme/feature/login".into(),
            into: "main".into(),
        })
        .unwrap();
    let doc = engine.document().unwrap();
    assert_eq!(doc.decision_set.branches_for_cleanup.len(), 1);
    assert_eq!(doc.decision_set.branches_for_cleanup[0].branch, "acme/feature/login");

    engine
        .report_event(&StateEvent::BranchDeleted {
            branch: "acme/feature/login".into(),
        })
        .unwrap();
    let doc = engine.document().unwrap();
    assert!(doc.repository_snapshot.branch("acme/feature/login").is_none());
    // History is bounded by limits.history_size
    assert_eq!(doc.metadata.history.len(), 3);
    assert!(matches!(doc.metadata.history[2].event, StateEvent::BranchDeleted { .. }));
}

#[test]
fn files_modified_then_commit_clears_tracked_changes() {
    let h = Harness::new();
    let mut engine = h.fresh();

    engine
        .report_event(&StateEvent::FilesModified {
            files: vec![
                FileChange::new("src/lib.rs", ChangeKind::Modified),
                FileChange::new("scratch.txt", ChangeKind::Untracked),
            ],
        })
        .unwrap();
    let doc = engine.document().unwrap();
    assert!(!doc.repository_snapshot.working_tree.clean);
    assert!(!doc.decision_set.can_create_branch.allowed);
    assert_eq!(doc.metadata.counters["filesModified"], 2);

    engine
        .report_event(&StateEvent::CommitCreated {
            branch: "main".into(),
            commit: "abc123".into(),
        })
        .unwrap();
    let doc = engine.document().unwrap();
    assert_eq!(
        doc.repository_snapshot.working_tree.changes,
        vec![FileChange::new("scratch.txt", ChangeKind::Untracked)]
    );
    assert_eq!(
        doc.repository_snapshot.branch("main").unwrap().head.as_deref(),
        Some("abc123")
    );
}

#[test]
fn events_for_untracked_branches_only_count() {
    let h = Harness::new();
    let mut engine = h.fresh();

    engine
        .report_event(&StateEvent::BranchCreated {
            branch: "someone/else".into(),
            parent: None,
        })
        .unwrap();
    let doc = engine.document().unwrap();
    assert!(doc.repository_snapshot.branch("someone/else").is_none());
    assert_eq!(doc.metadata.counters["branchesCreated"], 1);
}

#[test]
fn bracketed_branch_names_are_rejected() {
    let h = Harness::new();
    let mut engine = h.fresh();
    let before = h.state_bytes();

    let err = engine
        .report_event(&StateEvent::BranchCreated {
            branch: "acme/feature/[x]".into(),
            parent: None,
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPath { .. }), "{err}");
    assert_eq!(h.state_bytes(), before);
}

// ---- drift --------------------------------------------------------------

#[test]
fn drift_is_itemized_and_report_only_never_mutates() {
    let h = Harness::new();
    let mut engine = h.fresh();
    h.repo.add_branch("acme/feature/x", FakeBranch::at(h.clock.now()));
    h.repo.checkout("acme/feature/x");
    h.repo.set_changes(&[("a.rs", ChangeKind::Added)]);
    let before = h.state_bytes();

    let report = engine.detect_drift().unwrap();
    let fields: Vec<&str> = report.items.iter().map(|i| i.field.as_str()).collect();
    assert_eq!(
        fields,
        vec!["currentBranch", "workingTree.clean", "workingTree.changeCount"]
    );

    let outcome = engine.repair_drift(RepairMode::ReportOnly, &mut FixedAnswer(true)).unwrap();
    assert!(!outcome.applied);
    assert_eq!(outcome.report, report);
    assert_eq!(h.state_bytes(), before);
}

#[test]
fn interactive_repair_respects_the_answer() {
    let h = Harness::new();
    let mut engine = h.fresh();
    h.repo.set_remote(true);
    let before = h.state_bytes();

    let declined = engine.repair_drift(RepairMode::Interactive, &mut FixedAnswer(false)).unwrap();
    assert!(!declined.applied);
    assert_eq!(h.state_bytes(), before);

    let accepted = engine.repair_drift(RepairMode::Interactive, &mut FixedAnswer(true)).unwrap();
    assert!(accepted.applied);
    assert!(engine.document().unwrap().repository_snapshot.has_remote);
}

#[test]
fn auto_repair_is_idempotent() {
    let h = Harness::new();
    let mut engine = h.fresh();
    h.repo.add_branch("acme/feature/x", FakeBranch::at(h.clock.now()));
    h.repo.checkout("acme/feature/x");

    let first = engine.repair_drift(RepairMode::Auto, &mut FixedAnswer(false)).unwrap();
    assert!(first.applied);
    let doc = engine.document().unwrap();
    assert!(doc.repository_snapshot.branch("acme/feature/x").is_some());
    assert_eq!(doc.metadata.last_operation.unwrap().name, "drift-repair");

    let second = engine.repair_drift(RepairMode::Auto, &mut FixedAnswer(false)).unwrap();
    assert!(second.report.is_clean());
    assert!(!second.applied);
}

#[test]
fn branch_count_drift_respects_tolerance() {
    let h = Harness::new();
    let engine = h.fresh();

    h.repo.add_branch("acme/feature/a", FakeBranch::at(h.clock.now()));
    h.repo.add_branch("acme/feature/b", FakeBranch::at(h.clock.now()));
    assert!(engine.detect_drift().unwrap().is_clean());

    h.repo.add_branch("acme/feature/c", FakeBranch::at(h.clock.now()));
    let report = engine.detect_drift().unwrap();
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].field, "branchCount");
    assert_eq!(report.items[0].live, "4");
}

#[test]
fn validate_against_truth_blocks_on_mismatch() {
    let h = Harness::new();
    let engine = h.fresh();
    engine.validate_against_truth().unwrap();

    h.repo.set_changes(&[("x", ChangeKind::Modified)]);
    match engine.validate_against_truth() {
        Err(Error::Inconsistent { items }) => {
            assert_eq!(items, vec!["workingTree.clean: cached true, live false".to_string()]);
        }
        other => panic!("expected Inconsistent, got {other:?}"),
    }
}

#[test]
fn unreachable_repository_fails_closed_unless_configured_open() {
    let h = Harness::new();
    let engine = h.fresh();
    h.repo.set_failing(true);
    assert!(matches!(engine.validate_against_truth(), Err(Error::Git(_))));

    h.repo.set_failing(false);
    let mut open = h.engine_with(&format!("{CONFIG}\n[errors]\nfail_closed = false\n"));
    // Rebuild under the new fingerprint, then lose the repository
    open.ensure_fresh().unwrap();
    h.repo.set_failing(true);
    open.validate_against_truth().unwrap();
}

#[test]
fn stored_document_reads_back_from_a_second_store() {
    let h = Harness::new();
    let engine = h.fresh();
    let again = StateStore::new(engine.paths().state_file()).read().unwrap().unwrap();
    assert_eq!(again, engine.document().unwrap());
}
