//! Plain-text summary of a state document

use std::fmt::Write;

use crate::decision::{Allowance, Verdict};
use crate::document::StateDocument;

fn verdict(v: Verdict) -> &'static str {
    match v {
        Verdict::Yes => "yes",
        Verdict::No => "no",
        Verdict::Ask => "ask",
    }
}

fn allowance(a: &Allowance) -> String {
    if a.allowed {
        "yes".to_string()
    } else {
        format!("no ({})", a.reasons.join(", "))
    }
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Render the human-readable overview printed by `gitstate summary`.
pub fn render_summary(doc: &StateDocument) -> String {
    let meta = &doc.metadata;
    let config = &doc.compiled_configuration;
    let snapshot = &doc.repository_snapshot;
    let decisions = &doc.decision_set;
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "Workspace: {} (namespace {})", meta.workspace_identity, config.workspace.namespace);
    let _ = writeln!(
        out,
        "State: version {}, refreshed {}, config {}",
        meta.version,
        meta.last_refresh.to_rfc3339(),
        meta.config_fingerprint
    );
    if let Some(op) = &meta.last_operation {
        let _ = writeln!(out, "Last operation: {} ({}ms)", op.name, op.duration_ms);
    }
    out.push('\n');

    match &snapshot.current_branch {
        Some(branch) => {
            let class = snapshot
                .branch(branch)
                .map(|r| r.classification.as_str())
                .unwrap_or("untracked");
            let _ = writeln!(out, "Branch: {branch} [{class}]");
        }
        None => {
            let _ = writeln!(out, "Branch: (detached)");
        }
    }
    if let Some(op) = &snapshot.operation_in_progress {
        let _ = writeln!(out, "In progress: {op}");
    }

    let tree = &snapshot.working_tree;
    if tree.clean {
        let _ = writeln!(out, "Working tree: clean");
    } else {
        let counts: Vec<String> = tree
            .counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(kind, n)| format!("{n} {kind}"))
            .collect();
        let _ = writeln!(out, "Working tree: {}", counts.join(", "));
    }
    if snapshot.stash_count > 0 {
        let _ = writeln!(out, "Stashes: {}", snapshot.stash_count);
    }

    let tracking = &snapshot.tracking;
    if !snapshot.has_remote {
        let _ = writeln!(out, "Tracking: no remote");
    } else if !tracking.has_upstream {
        let _ = writeln!(out, "Tracking: no upstream");
    } else {
        let _ = writeln!(
            out,
            "Tracking: {} ahead, {} behind{}",
            tracking.ahead,
            tracking.behind,
            if tracking.diverged { " (diverged)" } else { "" }
        );
    }

    let protected = snapshot.branches.values().filter(|b| b.protected).count();
    let _ = writeln!(
        out,
        "Branches: {} tracked, {} protected",
        snapshot.existing_branch_count(),
        protected
    );
    out.push('\n');

    let _ = writeln!(
        out,
        "Can create branch: {} (suggested type {})",
        allowance(&decisions.can_create_branch),
        decisions.suggested_branch_type
    );
    let _ = writeln!(out, "Can merge: {}", allowance(&decisions.can_merge_current_branch));
    if let Some(target) = &decisions.merge_target {
        let _ = writeln!(
            out,
            "Merge target: {target} ({})",
            decisions.merge_strategy.as_deref().unwrap_or("-")
        );
    }
    let _ = writeln!(out, "Stale: {}", list(&decisions.stale_branches));
    let cleanup: Vec<String> = decisions
        .branches_for_cleanup
        .iter()
        .map(|c| format!("{} ({})", c.branch, c.reason))
        .collect();
    let _ = writeln!(out, "Cleanup: {}", list(&cleanup));
    if let Some(name) = &decisions.next_session_name {
        let _ = writeln!(out, "Next session: {name}");
    }
    let _ = writeln!(
        out,
        "Fetch on start: {}, push on stop: {}",
        verdict(decisions.should_fetch_on_start),
        verdict(decisions.should_push_on_stop)
    );
    out
}
