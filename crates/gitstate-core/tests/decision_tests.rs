//! Decision engine scenarios over inspected fake repositories

use chrono::{DateTime, Duration, TimeZone, Utc};
use gitstate_config::{
    CompiledConfiguration, DeletionTiming, USER_CLASS, WorkspaceConfiguration, compile,
};
use gitstate_core::decision::{REASON_DIRTY, REASON_EXCESS_SESSION, REASON_MAIN};
use gitstate_core::{
    BranchRecord, CleanupCandidate, Inspector, ProjectedTiming, RepositorySnapshot, Verdict, evaluate,
};
use gitstate_git::{ChangeKind, ExclusiveOperation};
use gitstate_test_utils::{FakeBranch, FakeRepository};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;

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

[session]
max_concurrent = 3

[workflow.sync]
fetch_on_start = "conditional"
push_on_stop = "ask"
"#;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap()
}

fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

fn config() -> CompiledConfiguration {
    compile(&WorkspaceConfiguration::from_toml_str(CONFIG).unwrap()).unwrap()
}

fn inspect(repo: &FakeRepository, config: &CompiledConfiguration) -> RepositorySnapshot {
    Inspector::new(repo, config).unwrap().inspect(now()).unwrap()
}

#[test]
fn merged_feature_with_zero_retention_is_cleaned_up_immediately() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(30));
    repo.add_branch(
        "acme/feature/login",
        FakeBranch::at(days_ago(10)).merged_into("main", days_ago(1)),
    );

    let snapshot = inspect(&repo, &config);
    let record = snapshot.branch("acme/feature/login").unwrap();
    assert_eq!(config.lifecycle["feature"].timing, DeletionTiming::Immediate);
    assert_eq!(record.classification, "feature");
    assert_eq!(record.deletion.timing, ProjectedTiming::Immediate);
    assert_eq!(record.merged_at, Some(days_ago(1)));

    let decisions = evaluate(&config, &snapshot);
    assert_eq!(
        decisions.branches_for_cleanup,
        vec![CleanupCandidate {
            branch: "acme/feature/login".to_string(),
            reason: "zero-day retention".to_string(),
        }]
    );
}

#[test]
fn unmerged_feature_awaits_merge() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(30));
    repo.add_branch("acme/feature/wip", FakeBranch::at(days_ago(3)));

    let snapshot = inspect(&repo, &config);
    assert_eq!(
        snapshot.branch("acme/feature/wip").unwrap().deletion.timing,
        ProjectedTiming::Pending
    );
    assert!(evaluate(&config, &snapshot).branches_for_cleanup.is_empty());
}

#[test]
fn session_with_unbounded_retention_is_never_scheduled() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(900));
    repo.add_branch("acme/session/ancient", FakeBranch::at(days_ago(800)));

    let snapshot = inspect(&repo, &config);
    let record = snapshot.branch("acme/session/ancient").unwrap();
    assert_eq!(record.classification, "session");
    assert_eq!(record.deletion.timing, ProjectedTiming::Never);
    assert_eq!(record.deletion.date, None);

    let decisions = evaluate(&config, &snapshot);
    assert!(decisions.branches_for_cleanup.is_empty());
    // Old, but stale is advisory only
    assert_eq!(decisions.stale_branches, vec!["acme/session/ancient".to_string()]);
}

const STALE_CONFIG: &str = r#"
[workspace]
name = "acme"

[branch.feature]
pattern = "${workspace.namespace}/feature/*"

[protected]
branches = ["release"]
namespace = ["keep"]

[workflow.cleanup]
stale_after_days = 30
"#;

#[rstest]
#[case::past_threshold("acme/feature/old", 31, true)]
#[case::exactly_at_threshold("acme/feature/edge", 30, false)]
#[case::within_threshold("acme/feature/fresh", 29, false)]
#[case::namespace_protected("acme/keep", 90, false)]
#[case::user_protected("release", 90, false)]
#[case::main_branch("main", 90, false)]
#[case::user_branch("personal/scratch", 90, false)]
fn stale_branches_skip_unmanaged_and_use_strict_threshold(
    #[case] branch: &str,
    #[case] age: i64,
    #[case] stale: bool,
) {
    let config = compile(&WorkspaceConfiguration::from_toml_str(STALE_CONFIG).unwrap()).unwrap();
    let repo = FakeRepository::with_main(days_ago(age));
    if branch != "main" {
        repo.add_branch(branch, FakeBranch::at(days_ago(age)));
    }

    let mut snapshot = inspect(&repo, &config);
    if branch.starts_with("personal/") {
        // Non-namespaced branches are only recorded when tooling reports them
        snapshot.branches.insert(
            branch.to_string(),
            BranchRecord {
                exists: true,
                last_activity: Some(days_ago(age)),
                ..BranchRecord::absent(USER_CLASS)
            },
        );
    }
    assert!(snapshot.branch(branch).is_some(), "{branch} was not recorded");
    let expected = if stale { vec![branch.to_string()] } else { Vec::new() };
    assert_eq!(evaluate(&config, &snapshot).stale_branches, expected);
}

#[test]
fn dirty_tree_blocks_branch_creation() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(5));
    repo.set_changes(&[("src/lib.rs", ChangeKind::Modified), ("notes.txt", ChangeKind::Untracked)]);

    let snapshot = inspect(&repo, &config);
    assert!(!snapshot.working_tree.clean);
    assert_eq!(snapshot.working_tree.counts["modified"], 1);
    assert_eq!(snapshot.working_tree.counts["untracked"], 1);

    let decisions = evaluate(&config, &snapshot);
    assert!(!decisions.can_create_branch.allowed);
    assert!(
        decisions
            .can_create_branch
            .reasons
            .iter()
            .any(|r| r.contains(REASON_DIRTY))
    );
}

#[test]
fn operation_in_progress_blocks_creation_and_merge() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(5));
    repo.add_branch("acme/feature/x", FakeBranch::at(days_ago(2)));
    repo.checkout("acme/feature/x");
    repo.set_operation(Some(ExclusiveOperation::Rebase));

    let decisions = evaluate(&config, &inspect(&repo, &config));
    assert_eq!(decisions.can_create_branch.reasons, vec!["rebase in progress".to_string()]);
    assert!(!decisions.can_merge_current_branch.allowed);
    assert_eq!(decisions.merge_strategy, None);
}

#[test]
fn main_branch_cannot_be_merged() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(5));

    let decisions = evaluate(&config, &inspect(&repo, &config));
    assert!(!decisions.can_merge_current_branch.allowed);
    assert!(
        decisions
            .can_merge_current_branch
            .reasons
            .contains(&REASON_MAIN.to_string())
    );
}

#[test]
fn feature_merges_into_parent_or_main() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(5));
    repo.add_branch("develop", FakeBranch::at(days_ago(4)));
    repo.add_branch("acme/feature/a", FakeBranch::at(days_ago(2)).parent("develop"));
    repo.add_branch("acme/feature/b", FakeBranch::at(days_ago(2)));

    repo.checkout("acme/feature/a");
    let decisions = evaluate(&config, &inspect(&repo, &config));
    assert!(decisions.can_merge_current_branch.allowed);
    assert_eq!(decisions.merge_target.as_deref(), Some("develop"));
    assert_eq!(decisions.merge_strategy.as_deref(), Some("merge"));

    repo.checkout("acme/feature/b");
    let decisions = evaluate(&config, &inspect(&repo, &config));
    assert_eq!(decisions.merge_target.as_deref(), Some("main"));
}

#[test]
fn excess_sessions_are_cleaned_oldest_first() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(30));
    for (name, age) in [("s1", 1), ("s2", 2), ("s3", 3), ("s4", 4), ("s5", 5)] {
        repo.add_branch(&format!("acme/session/{name}"), FakeBranch::at(days_ago(age)));
    }

    let decisions = evaluate(&config, &inspect(&repo, &config));
    assert_eq!(
        decisions.branches_for_cleanup,
        vec![
            CleanupCandidate {
                branch: "acme/session/s5".to_string(),
                reason: REASON_EXCESS_SESSION.to_string(),
            },
            CleanupCandidate {
                branch: "acme/session/s4".to_string(),
                reason: REASON_EXCESS_SESSION.to_string(),
            },
        ]
    );
}

#[test]
fn session_branch_uses_session_merge_strategy() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(30));
    repo.add_branch("acme/session/today", FakeBranch::at(days_ago(0)));
    repo.checkout("acme/session/today");

    let decisions = evaluate(&config, &inspect(&repo, &config));
    assert_eq!(decisions.merge_strategy.as_deref(), Some("squash"));
    assert_eq!(decisions.suggested_branch_type, "feature");
}

#[test]
fn next_session_name_follows_template() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(30));

    let decisions = evaluate(&config, &inspect(&repo, &config));
    assert_eq!(decisions.suggested_branch_type, "session");
    let name = decisions.next_session_name.unwrap();
    assert!(name.starts_with("acme/session/20240615-"), "got {name}");
    assert_eq!(name.len(), "acme/session/20240615-".len() + 8);
}

#[test]
fn sync_verdicts_follow_remote_and_upstream() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(30));

    let decisions = evaluate(&config, &inspect(&repo, &config));
    assert_eq!(decisions.should_fetch_on_start, Verdict::No);
    assert_eq!(decisions.should_push_on_stop, Verdict::No);

    repo.set_remote(true);
    repo.add_branch("main", FakeBranch::at(days_ago(30)).upstream());
    let decisions = evaluate(&config, &inspect(&repo, &config));
    assert_eq!(decisions.should_fetch_on_start, Verdict::Yes);
    assert_eq!(decisions.should_push_on_stop, Verdict::Ask);
    assert!(decisions.prompts.contains_key("pushOnStop"));
}

#[test]
fn evaluation_is_deterministic_for_a_snapshot() {
    let config = config();
    let repo = FakeRepository::with_main(days_ago(30));
    repo.add_branch("acme/session/a", FakeBranch::at(days_ago(2)));
    let snapshot = inspect(&repo, &config);

    let first = serde_json::to_vec(&evaluate(&config, &snapshot)).unwrap();
    let second = serde_json::to_vec(&evaluate(&config.clone(), &snapshot.clone())).unwrap();
    assert_eq!(first, second);
}

proptest! {
    #[test]
    fn decisions_are_byte_identical_for_equal_inputs(
        ages in proptest::collection::vec(0i64..400, 0..7),
        dirty in any::<bool>(),
        remote in any::<bool>(),
        on_session in any::<bool>(),
    ) {
        let config = config();
        let repo = FakeRepository::with_main(days_ago(500));
        for (i, age) in ages.iter().enumerate() {
            repo.add_branch(&format!("acme/session/s{i}"), FakeBranch::at(days_ago(*age)));
            repo.add_branch(
                &format!("acme/feature/f{i}"),
                FakeBranch::at(days_ago(*age + 1)).merged_into("main", days_ago(*age)),
            );
        }
        if dirty {
            repo.set_changes(&[("a.txt", ChangeKind::Added)]);
        }
        repo.set_remote(remote);
        if on_session && !ages.is_empty() {
            repo.checkout("acme/session/s0");
        }

        let a = inspect(&repo, &config);
        let b = inspect(&repo, &config);
        prop_assert_eq!(&a, &b);
        let first = serde_json::to_string(&evaluate(&config, &a)).unwrap();
        let second = serde_json::to_string(&evaluate(&config, &b)).unwrap();
        prop_assert_eq!(first, second);
    }
}
