//! The read-only repository interface consumed by the state engine

use chrono::{DateTime, Utc};

use crate::Result;
use crate::types::{BranchActivity, ExclusiveOperation, FileChange, Tracking};

/// Read-only view of a version-controlled repository.
///
/// Implementations must not mutate the repository. Branch names are short
/// local names (`team/feature/login`, not `refs/heads/...`).
pub trait VcsReader {
    /// Branch HEAD points at, or `None` when detached.
    fn current_branch(&self) -> Result<Option<String>>;

    /// All local branch names.
    fn local_branches(&self) -> Result<Vec<String>>;

    /// Commit id at the tip of `branch`, `None` when the branch does not exist.
    fn branch_head(&self, branch: &str) -> Result<Option<String>>;

    /// Commit times of `branch`, measuring "first" against `base`.
    fn branch_activity(&self, branch: &str, base: &str) -> Result<Option<BranchActivity>>;

    /// When `branch` landed in `into`, or `None` if it has not been merged.
    fn merge_date(&self, branch: &str, into: &str) -> Result<Option<DateTime<Utc>>>;

    /// Recorded parent branch, if any.
    fn branch_parent(&self, branch: &str) -> Result<Option<String>>;

    /// Whether `branch` has a configured upstream.
    fn has_upstream(&self, branch: &str) -> Result<bool>;

    /// Ahead/behind counts of the current branch against its upstream.
    fn tracking(&self) -> Result<Option<Tracking>>;

    /// Uncommitted changes in index and working tree.
    fn working_tree_changes(&self) -> Result<Vec<FileChange>>;

    fn stash_count(&self) -> Result<usize>;

    /// Merge, rebase or similar operation left in progress.
    fn operation_in_progress(&self) -> Result<Option<ExclusiveOperation>>;

    /// Whether any remote is configured.
    fn has_remote(&self) -> Result<bool>;
}
