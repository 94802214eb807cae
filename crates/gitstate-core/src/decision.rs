//! Decision engine
//!
//! [`evaluate`] is a pure function of the compiled configuration and a
//! repository snapshot. It performs no I/O and reads no clock: "now" is the
//! snapshot's capture time. Every call scans the whole branch map.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use gitstate_config::{
    CompiledConfiguration, MAIN_CLASS, MergeTargetSpec, SyncPolicy, USER_CLASS, WorkflowMode,
};
use serde::{Deserialize, Serialize};

use crate::snapshot::{BranchRecord, ProjectedTiming, RepositorySnapshot};

/// Branch type used for work sessions
pub const SESSION_TYPE: &str = "session";

pub const REASON_DIRTY: &str = "uncommitted changes";
pub const REASON_MAIN: &str = "cannot merge main branch";
pub const REASON_EXCESS_SESSION: &str = "exceeds max session count";

/// Prompt keys in [`DecisionSet::prompts`]
pub const PROMPT_CREATE_BRANCH: &str = "createBranch";
pub const PROMPT_MERGE: &str = "merge";
pub const PROMPT_FETCH: &str = "fetchOnStart";
pub const PROMPT_PUSH: &str = "pushOnStop";
pub const PROMPT_CLEANUP: &str = "cleanup";

/// Allow/deny flag with every reason that denied it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub allowed: bool,
    pub reasons: Vec<String>,
}

impl Allowance {
    fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            allowed: reasons.is_empty(),
            reasons,
        }
    }
}

/// Resolved tri-state sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Yes,
    No,
    Ask,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupCandidate {
    pub branch: String,
    pub reason: String,
}

/// Every precomputed decision the calling tooling may need
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionSet {
    pub can_create_branch: Allowance,
    pub suggested_branch_type: String,
    pub can_merge_current_branch: Allowance,
    pub merge_target: Option<String>,
    pub merge_strategy: Option<String>,
    pub stale_branches: Vec<String>,
    pub branches_for_cleanup: Vec<CleanupCandidate>,
    /// `None` when sessions are disabled
    pub next_session_name: Option<String>,
    pub should_fetch_on_start: Verdict,
    pub should_push_on_stop: Verdict,
    /// Decision name -> prompt, for every decision resolved to "ask"
    pub prompts: BTreeMap<String, String>,
}

/// Compute the decision set.
pub fn evaluate(config: &CompiledConfiguration, snapshot: &RepositorySnapshot) -> DecisionSet {
    let can_create_branch = can_create_branch(config, snapshot);
    let (can_merge_current_branch, merge_target, merge_strategy) = merge_decision(config, snapshot);
    let branches_for_cleanup = branches_for_cleanup(config, snapshot);
    let should_fetch_on_start = fetch_verdict(config, snapshot);
    let should_push_on_stop = push_verdict(config, snapshot);

    let mut prompts = BTreeMap::new();
    let workflow = &config.workflow;
    if can_create_branch.allowed && workflow.branch_creation.rule.mode == WorkflowMode::Ask {
        prompts.insert(
            PROMPT_CREATE_BRANCH.to_string(),
            workflow.branch_creation.rule.prompt.clone(),
        );
    }
    if can_merge_current_branch.allowed && workflow.merge.rule.mode == WorkflowMode::Ask {
        let prompt = workflow
            .merge
            .rule
            .prompt
            .replace("{branch}", snapshot.current_branch.as_deref().unwrap_or_default())
            .replace("{target}", merge_target.as_deref().unwrap_or_default())
            .replace("{strategy}", merge_strategy.as_deref().unwrap_or_default());
        prompts.insert(PROMPT_MERGE.to_string(), prompt);
    }
    if should_fetch_on_start == Verdict::Ask {
        prompts.insert(PROMPT_FETCH.to_string(), workflow.sync.fetch_prompt.clone());
    }
    if should_push_on_stop == Verdict::Ask {
        let prompt = workflow
            .sync
            .push_prompt
            .replace("{branch}", snapshot.current_branch.as_deref().unwrap_or_default());
        prompts.insert(PROMPT_PUSH.to_string(), prompt);
    }
    if !branches_for_cleanup.is_empty() && workflow.cleanup.rule.mode == WorkflowMode::Ask {
        let prompt = workflow
            .cleanup
            .rule
            .prompt
            .replace("{count}", &branches_for_cleanup.len().to_string());
        prompts.insert(PROMPT_CLEANUP.to_string(), prompt);
    }

    DecisionSet {
        can_create_branch,
        suggested_branch_type: suggested_branch_type(config, snapshot),
        can_merge_current_branch,
        merge_target,
        merge_strategy,
        stale_branches: stale_branches(config, snapshot),
        branches_for_cleanup,
        next_session_name: next_session_name(config, snapshot),
        should_fetch_on_start,
        should_push_on_stop,
        prompts,
    }
}

fn can_create_branch(config: &CompiledConfiguration, snapshot: &RepositorySnapshot) -> Allowance {
    let rule = &config.workflow.branch_creation;
    let mut reasons = Vec::new();
    if let Some(op) = snapshot.operation_in_progress {
        reasons.push(format!("{op} in progress"));
    }
    if rule.require_clean && !snapshot.working_tree.clean {
        reasons.push(REASON_DIRTY.to_string());
    }
    if rule.rule.mode == WorkflowMode::Never {
        reasons.push("branch creation disabled by workflow".to_string());
    }
    Allowance::from_reasons(reasons)
}

fn session_branches(snapshot: &RepositorySnapshot) -> impl Iterator<Item = (&String, &BranchRecord)> {
    snapshot
        .branches
        .iter()
        .filter(|(_, b)| b.exists && b.classification == SESSION_TYPE)
}

fn suggested_branch_type(config: &CompiledConfiguration, snapshot: &RepositorySnapshot) -> String {
    let session = &config.session;
    let has_session = session_branches(snapshot).next().is_some();
    if session.enabled && !has_session && (session.single || session.auto_create) {
        SESSION_TYPE.to_string()
    } else {
        config.workspace.default_branch_type.clone()
    }
}

fn merge_decision(
    config: &CompiledConfiguration,
    snapshot: &RepositorySnapshot,
) -> (Allowance, Option<String>, Option<String>) {
    let Some(current) = snapshot.current_branch.as_deref() else {
        return (
            Allowance::from_reasons(vec!["detached HEAD".to_string()]),
            None,
            None,
        );
    };

    let record = snapshot.branch(current);
    // Unrecorded branches are outside the namespace and unprotected
    let classification = record.map_or(USER_CLASS, |r| r.classification.as_str());
    let merge = &config.workflow.merge;

    let mut reasons = Vec::new();
    if current == config.workspace.main_branch || classification == MAIN_CLASS {
        reasons.push(REASON_MAIN.to_string());
    } else if record.is_some_and(|r| r.protected) || config.is_protected(current) {
        reasons.push("cannot merge protected branch".to_string());
    }
    if let Some(op) = snapshot.operation_in_progress {
        reasons.push(format!("{op} in progress"));
    }
    if merge.rule.mode == WorkflowMode::Never {
        reasons.push("merging disabled by workflow".to_string());
    }

    let spec = merge
        .targets
        .get(classification)
        .unwrap_or(&merge.default_target);
    let target = match spec {
        MergeTargetSpec::Parent => Some(
            record
                .and_then(|r| r.parent.clone())
                .unwrap_or_else(|| config.workspace.main_branch.clone()),
        ),
        MergeTargetSpec::Branch(branch) => Some(branch.clone()),
        MergeTargetSpec::None => {
            reasons.push("no merge target".to_string());
            None
        }
    };
    if target.as_deref() == Some(current) {
        reasons.push("branch is its own merge target".to_string());
    }

    let strategy = if classification == SESSION_TYPE {
        config.session.merge_strategy.clone()
    } else {
        merge.feature_strategy.clone()
    };

    let allowance = Allowance::from_reasons(reasons);
    if allowance.allowed {
        (allowance, target, Some(strategy))
    } else {
        (allowance, target, None)
    }
}

/// Branches eligible for the lifecycle, i.e. not main, user or protected.
fn is_managed(record: &BranchRecord) -> bool {
    record.exists
        && !record.protected
        && record.classification != MAIN_CLASS
        && record.classification != USER_CLASS
}

fn stale_branches(config: &CompiledConfiguration, snapshot: &RepositorySnapshot) -> Vec<String> {
    let threshold = Duration::days(i64::from(config.workflow.cleanup.stale_after_days));
    snapshot
        .branches
        .iter()
        .filter(|(_, record)| is_managed(record))
        .filter(|(_, record)| {
            record
                .last_activity
                .is_some_and(|at| snapshot.captured_at - at > threshold)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

fn branches_for_cleanup(
    config: &CompiledConfiguration,
    snapshot: &RepositorySnapshot,
) -> Vec<CleanupCandidate> {
    let mut seen = BTreeSet::new();
    let mut candidates = Vec::new();

    for (name, record) in &snapshot.branches {
        if !is_managed(record) || !record.deletion.is_due(snapshot.captured_at) {
            continue;
        }
        let reason = match record.deletion.timing {
            ProjectedTiming::Immediate => "zero-day retention",
            _ => "retention window elapsed",
        };
        seen.insert(name.as_str());
        candidates.push(CleanupCandidate {
            branch: name.clone(),
            reason: reason.to_string(),
        });
    }

    // Newest sessions are kept; the rest go, oldest first
    let mut sessions: Vec<(&String, Option<DateTime<Utc>>)> = session_branches(snapshot)
        .filter(|(_, record)| is_managed(record))
        .map(|(name, record)| (name, record.last_activity))
        .collect();
    sessions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let excess = sessions.split_off(config.session.max_concurrent.min(sessions.len()));
    for (name, _) in excess.into_iter().rev() {
        if seen.insert(name.as_str()) {
            candidates.push(CleanupCandidate {
                branch: name.clone(),
                reason: REASON_EXCESS_SESSION.to_string(),
            });
        }
    }
    candidates
}

fn next_session_name(config: &CompiledConfiguration, snapshot: &RepositorySnapshot) -> Option<String> {
    let session = &config.session;
    if !session.enabled {
        return None;
    }
    let date = snapshot.captured_at.format("%Y%m%d").to_string();
    let existing: Vec<&str> = session_branches(snapshot).map(|(n, _)| n.as_str()).collect();

    let mut seed = format!(
        "{}\n{}\n{}\n{}",
        config.workspace.namespace,
        session.name_template,
        snapshot.captured_at.to_rfc3339(),
        existing.join(",")
    );
    // Re-derive until the name is free; a collision is practically never hit
    for attempt in 0u32.. {
        let digest = gitstate_fs::content_digest(seed.as_bytes());
        let token = &gitstate_fs::checksum::digest_hex(&digest)[..8];
        let name = session
            .name_template
            .replace("{date}", &date)
            .replace("{token}", token);
        if !snapshot.branches.contains_key(&name) {
            return Some(name);
        }
        seed.push_str(&format!("\n{attempt}"));
    }
    None
}

fn fetch_verdict(config: &CompiledConfiguration, snapshot: &RepositorySnapshot) -> Verdict {
    if !snapshot.has_remote {
        return Verdict::No;
    }
    match config.workflow.sync.fetch_on_start {
        SyncPolicy::Always => Verdict::Yes,
        SyncPolicy::Ask => Verdict::Ask,
        SyncPolicy::Conditional => {
            if snapshot.working_tree.clean && snapshot.tracking.has_upstream {
                Verdict::Yes
            } else {
                Verdict::No
            }
        }
    }
}

fn push_verdict(config: &CompiledConfiguration, snapshot: &RepositorySnapshot) -> Verdict {
    let Some(current) = snapshot.current_branch.as_deref() else {
        return Verdict::No;
    };
    if !snapshot.has_remote {
        return Verdict::No;
    }
    match config.workflow.sync.push_on_stop {
        SyncPolicy::Always => Verdict::Yes,
        SyncPolicy::Ask => Verdict::Ask,
        SyncPolicy::Conditional => {
            let workspace_branch = snapshot.branch(current).is_some_and(is_managed);
            let unpushed = !snapshot.tracking.has_upstream || snapshot.tracking.ahead > 0;
            if workspace_branch && unpushed {
                Verdict::Yes
            } else {
                Verdict::No
            }
        }
    }
}
