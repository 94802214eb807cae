//! Point-in-time facts about the live repository

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gitstate_git::{ChangeKind, ExclusiveOperation, FileChange};
use serde::{Deserialize, Serialize};

/// Read-only snapshot built by the inspector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySnapshot {
    /// Evaluation clock for everything derived from this snapshot
    pub captured_at: DateTime<Utc>,
    /// `None` when HEAD is detached
    pub current_branch: Option<String>,
    pub main_branch_exists: bool,
    pub has_remote: bool,
    pub working_tree: WorkingTree,
    pub stash_count: usize,
    pub tracking: TrackingState,
    pub operation_in_progress: Option<ExclusiveOperation>,
    pub branches: BTreeMap<String, BranchRecord>,
}

impl RepositorySnapshot {
    pub fn branch(&self, name: &str) -> Option<&BranchRecord> {
        self.branches.get(name)
    }

    pub fn current_record(&self) -> Option<&BranchRecord> {
        self.current_branch.as_deref().and_then(|b| self.branch(b))
    }

    /// Number of recorded branches that exist in the repository.
    pub fn existing_branch_count(&self) -> usize {
        self.branches.values().filter(|b| b.exists).count()
    }
}

/// Working-tree cleanliness and categorized changes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingTree {
    pub clean: bool,
    pub changes: Vec<FileChange>,
    /// Change count per category, every category present
    pub counts: BTreeMap<String, usize>,
}

impl WorkingTree {
    pub fn from_changes(mut changes: Vec<FileChange>) -> Self {
        changes.sort();
        changes.dedup();
        let mut counts: BTreeMap<String, usize> = ChangeKind::ALL
            .iter()
            .map(|k| (k.as_str().to_string(), 0))
            .collect();
        for change in &changes {
            *counts.entry(change.kind.as_str().to_string()).or_default() += 1;
        }
        Self {
            clean: changes.is_empty(),
            changes,
            counts,
        }
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }
}

/// Current branch position relative to its upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    pub has_upstream: bool,
    pub ahead: usize,
    pub behind: usize,
    pub diverged: bool,
}

/// Everything known about one candidate branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRecord {
    pub exists: bool,
    pub head: Option<String>,
    pub parent: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    /// When the branch landed in the main branch
    pub merged_at: Option<DateTime<Utc>>,
    pub protected: bool,
    pub protection_reason: Option<String>,
    pub classification: String,
    pub deletion: DeletionProjection,
    pub has_upstream: bool,
}

impl BranchRecord {
    /// Record for a declared branch that is not in the repository.
    pub fn absent(classification: impl Into<String>) -> Self {
        Self {
            exists: false,
            head: None,
            parent: None,
            created_at: None,
            last_activity: None,
            merged_at: None,
            protected: false,
            protection_reason: None,
            classification: classification.into(),
            deletion: DeletionProjection::never("branch does not exist"),
            has_upstream: false,
        }
    }
}

/// Projected deletion timing of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectedTiming {
    Never,
    Immediate,
    Scheduled,
    /// Deleted after merge, but not merged yet
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionProjection {
    pub timing: ProjectedTiming,
    pub date: Option<DateTime<Utc>>,
    pub reason: String,
}

impl DeletionProjection {
    pub fn never(reason: impl Into<String>) -> Self {
        Self {
            timing: ProjectedTiming::Never,
            date: None,
            reason: reason.into(),
        }
    }

    /// Whether the branch is eligible for deletion at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.timing {
            ProjectedTiming::Immediate => true,
            ProjectedTiming::Scheduled => self.date.is_some_and(|d| d <= now),
            ProjectedTiming::Never | ProjectedTiming::Pending => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn working_tree_counts_every_category() {
        let tree = WorkingTree::from_changes(vec![
            FileChange::new("b.rs", ChangeKind::Modified),
            FileChange::new("a.rs", ChangeKind::Modified),
            FileChange::new("new.txt", ChangeKind::Untracked),
        ]);
        assert!(!tree.clean);
        assert_eq!(tree.changes[0].path, "a.rs");
        assert_eq!(tree.counts["modified"], 2);
        assert_eq!(tree.counts["untracked"], 1);
        assert_eq!(tree.counts["renamed"], 0);
        assert_eq!(tree.counts.len(), ChangeKind::ALL.len());
    }

    #[test]
    fn empty_tree_is_clean() {
        assert!(WorkingTree::from_changes(Vec::new()).clean);
    }

    #[test]
    fn scheduled_projection_is_due_after_date() {
        let now = Utc::now();
        let projection = DeletionProjection {
            timing: ProjectedTiming::Scheduled,
            date: Some(now - Duration::days(1)),
            reason: String::new(),
        };
        assert!(projection.is_due(now));
        assert!(!projection.is_due(now - Duration::days(2)));
        assert!(!DeletionProjection::never("x").is_due(now));
    }
}
