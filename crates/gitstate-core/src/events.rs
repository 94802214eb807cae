//! Semantic events reported by the tooling that mutates the repository
//!
//! Each event translates into path mutations on the state document plus a
//! history entry and a counter bump. The engine applies them as one
//! transaction and recomputes decisions afterwards.

use chrono::{DateTime, Utc};
use gitstate_config::BranchMatcher;
use gitstate_git::{ChangeKind, FileChange};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::document::{HistoryEntry, StateDocument};
use crate::inspector::project_deletion;
use crate::path::Mutation;
use crate::snapshot::{BranchRecord, WorkingTree};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StateEvent {
    BranchCreated {
        branch: String,
        #[serde(default)]
        parent: Option<String>,
    },
    BranchDeleted {
        branch: String,
    },
    BranchSwitched {
        #[serde(default)]
        from: Option<String>,
        to: String,
    },
    FilesModified {
        files: Vec<FileChange>,
    },
    CommitCreated {
        branch: String,
        commit: String,
    },
    BranchPushed {
        branch: String,
    },
    BranchMerged {
        branch: String,
        into: String,
    },
}

impl StateEvent {
    /// Counter bumped under `metadata.counters`.
    pub fn counter(&self) -> &'static str {
        match self {
            Self::BranchCreated { .. } => "branchesCreated",
            Self::BranchDeleted { .. } => "branchesDeleted",
            Self::BranchSwitched { .. } => "branchSwitches",
            Self::FilesModified { .. } => "filesModified",
            Self::CommitCreated { .. } => "commits",
            Self::BranchPushed { .. } => "pushes",
            Self::BranchMerged { .. } => "merges",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BranchCreated { .. } => "branch-created",
            Self::BranchDeleted { .. } => "branch-deleted",
            Self::BranchSwitched { .. } => "branch-switched",
            Self::FilesModified { .. } => "files-modified",
            Self::CommitCreated { .. } => "commit-created",
            Self::BranchPushed { .. } => "branch-pushed",
            Self::BranchMerged { .. } => "branch-merged",
        }
    }
}

fn branch_path(branch: &str) -> Result<String> {
    if branch.is_empty() || branch.contains(['[', ']']) {
        return Err(Error::invalid_path(branch, "not a usable branch name"));
    }
    Ok(format!("repositorySnapshot.branches[{branch}]"))
}

/// Path mutations that record `event` in `doc`.
pub fn translate(event: &StateEvent, doc: &StateDocument, at: DateTime<Utc>) -> Result<Vec<Mutation>> {
    let config = &doc.compiled_configuration;
    let snapshot = &doc.repository_snapshot;
    let matcher = BranchMatcher::new(config)?;
    let mut ops = Vec::new();

    // Re-project and store an updated branch record
    let put_record = |ops: &mut Vec<Mutation>, branch: &str, mut record: BranchRecord| -> Result<()> {
        record.deletion = project_deletion(config.lifecycle_for(&record.classification), &record);
        ops.push(Mutation::set(branch_path(branch)?, serde_json::to_value(&record)?));
        Ok(())
    };

    match event {
        StateEvent::BranchCreated { branch, parent } => {
            let tracked = matcher.is_namespaced(branch) || config.is_protected(branch);
            if tracked {
                let protection_reason = config.protected.get(branch).cloned();
                let record = BranchRecord {
                    exists: true,
                    parent: parent.clone(),
                    created_at: Some(at),
                    last_activity: Some(at),
                    protected: protection_reason.is_some(),
                    protection_reason,
                    ..BranchRecord::absent(matcher.classify(branch))
                };
                put_record(&mut ops, branch, record)?;
            }
        }
        StateEvent::BranchDeleted { branch } => match snapshot.branch(branch) {
            Some(existing) if existing.protected => {
                let record = BranchRecord {
                    protected: true,
                    protection_reason: existing.protection_reason.clone(),
                    ..BranchRecord::absent(existing.classification.clone())
                };
                ops.push(Mutation::set(branch_path(branch)?, serde_json::to_value(&record)?));
            }
            Some(_) => ops.push(Mutation::Remove {
                path: branch_path(branch)?,
            }),
            None => {}
        },
        StateEvent::BranchSwitched { to, .. } => {
            ops.push(Mutation::set("repositorySnapshot.currentBranch", json!(to)));
            let has_upstream = snapshot.branch(to).is_some_and(|b| b.has_upstream);
            ops.push(Mutation::set(
                "repositorySnapshot.tracking",
                json!({"hasUpstream": has_upstream, "ahead": 0, "behind": 0, "diverged": false}),
            ));
        }
        StateEvent::FilesModified { files } => {
            let mut changes = snapshot.working_tree.changes.clone();
            changes.retain(|c| !files.iter().any(|f| f.path == c.path));
            changes.extend(files.iter().cloned());
            let tree = WorkingTree::from_changes(changes);
            ops.push(Mutation::set(
                "repositorySnapshot.workingTree",
                serde_json::to_value(&tree)?,
            ));
        }
        StateEvent::CommitCreated { branch, commit } => {
            if let Some(existing) = snapshot.branch(branch) {
                let record = BranchRecord {
                    exists: true,
                    head: Some(commit.clone()),
                    last_activity: Some(at),
                    created_at: existing.created_at.or(Some(at)),
                    ..existing.clone()
                };
                put_record(&mut ops, branch, record)?;
            }
            if snapshot.current_branch.as_deref() == Some(branch.as_str()) {
                // Untracked files stay behind after a commit
                let remaining: Vec<FileChange> = snapshot
                    .working_tree
                    .changes
                    .iter()
                    .filter(|c| c.kind == ChangeKind::Untracked)
                    .cloned()
                    .collect();
                ops.push(Mutation::set(
                    "repositorySnapshot.workingTree",
                    serde_json::to_value(WorkingTree::from_changes(remaining))?,
                ));
                if snapshot.tracking.has_upstream {
                    ops.push(Mutation::Increment {
                        path: "repositorySnapshot.tracking.ahead".to_string(),
                        by: 1,
                    });
                    ops.push(Mutation::set(
                        "repositorySnapshot.tracking.diverged",
                        json!(snapshot.tracking.behind > 0),
                    ));
                }
            }
        }
        StateEvent::BranchPushed { branch } => {
            if let Some(existing) = snapshot.branch(branch) {
                let record = BranchRecord {
                    has_upstream: true,
                    ..existing.clone()
                };
                put_record(&mut ops, branch, record)?;
            }
            if snapshot.current_branch.as_deref() == Some(branch.as_str()) {
                let behind = snapshot.tracking.behind;
                ops.push(Mutation::set(
                    "repositorySnapshot.tracking",
                    json!({"hasUpstream": true, "ahead": 0, "behind": behind, "diverged": false}),
                ));
            }
        }
        StateEvent::BranchMerged { branch, into } => {
            if *into == config.workspace.main_branch
                && let Some(existing) = snapshot.branch(branch)
            {
                let record = BranchRecord {
                    merged_at: Some(at),
                    ..existing.clone()
                };
                put_record(&mut ops, branch, record)?;
            }
        }
    }

    let by = match event {
        StateEvent::FilesModified { files } => files.len() as i64,
        _ => 1,
    };
    ops.push(Mutation::Increment {
        path: format!("metadata.counters.{}", event.counter()),
        by,
    });
    if config.limits.history_size > 0 {
        let entry = HistoryEntry {
            at,
            event: event.clone(),
        };
        ops.push(Mutation::Append {
            path: "metadata.history".to_string(),
            value: serde_json::to_value(&entry)?,
            max: config.limits.history_size,
        });
    }
    Ok(ops)
}
