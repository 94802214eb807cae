//! In-memory [`VcsReader`] for engine tests.
//!
//! Realism level: **FAKE**. Every fact is set directly, so tests can build
//! repositories that would take dozens of git commands to reach (five
//! sessions of different ages, a half-finished rebase, a diverged upstream).
//! Clones share state: a test keeps one handle to mutate the "repository"
//! while the engine owns another.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gitstate_git::{
    BranchActivity, ChangeKind, Error, ExclusiveOperation, FileChange, Result, Tracking, VcsReader,
};

/// One fake branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBranch {
    pub head: String,
    pub first_commit: DateTime<Utc>,
    pub last_commit: DateTime<Utc>,
    pub merged_into: BTreeMap<String, DateTime<Utc>>,
    pub parent: Option<String>,
    pub upstream: bool,
}

impl FakeBranch {
    /// Branch whose only activity happened at `at`.
    ///
    /// The head id is derived from the branch name when added.
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            head: String::new(),
            first_commit: at,
            last_commit: at,
            merged_into: BTreeMap::new(),
            parent: None,
            upstream: false,
        }
    }

    pub fn head(mut self, head: &str) -> Self {
        self.head = head.to_string();
        self
    }

    pub fn last_commit(mut self, at: DateTime<Utc>) -> Self {
        self.last_commit = at;
        self
    }

    pub fn merged_into(mut self, target: &str, at: DateTime<Utc>) -> Self {
        self.merged_into.insert(target.to_string(), at);
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn upstream(mut self) -> Self {
        self.upstream = true;
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    branches: BTreeMap<String, FakeBranch>,
    head: Option<String>,
    changes: Vec<FileChange>,
    stash: usize,
    tracking: Option<Tracking>,
    operation: Option<ExclusiveOperation>,
    remote: bool,
    delay: Option<Duration>,
    failing: bool,
}

/// Shared-state fake repository
#[derive(Debug, Clone, Default)]
pub struct FakeRepository {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRepository {
    /// Repository with a `main` branch checked out.
    pub fn with_main(at: DateTime<Utc>) -> Self {
        let repo = Self::default();
        repo.add_branch("main", FakeBranch::at(at));
        repo.checkout("main");
        repo
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_branch(&self, name: &str, mut branch: FakeBranch) {
        if branch.head.is_empty() {
            branch.head = format!("{name}@{}", branch.last_commit.timestamp());
        }
        self.lock().branches.insert(name.to_string(), branch);
    }

    pub fn remove_branch(&self, name: &str) {
        self.lock().branches.remove(name);
    }

    pub fn checkout(&self, name: &str) {
        self.lock().head = Some(name.to_string());
    }

    pub fn detach(&self) {
        self.lock().head = None;
    }

    pub fn set_changes(&self, changes: &[(&str, ChangeKind)]) {
        self.lock().changes = changes
            .iter()
            .map(|(path, kind)| FileChange::new(*path, *kind))
            .collect();
    }

    pub fn set_stash(&self, count: usize) {
        self.lock().stash = count;
    }

    pub fn set_tracking(&self, ahead: usize, behind: usize) {
        self.lock().tracking = Some(Tracking { ahead, behind });
    }

    pub fn set_operation(&self, operation: Option<ExclusiveOperation>) {
        self.lock().operation = operation;
    }

    pub fn set_remote(&self, remote: bool) {
        self.lock().remote = remote;
    }

    /// Make every query sleep first.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    /// Make every query fail.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    fn query(&self) -> Result<MutexGuard<'_, FakeState>> {
        let delay = {
            let state = self.lock();
            if state.failing {
                return Err(Error::Git(git2::Error::from_str("repository unavailable")));
            }
            state.delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(self.lock())
    }
}

impl VcsReader for FakeRepository {
    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.query()?.head.clone())
    }

    fn local_branches(&self) -> Result<Vec<String>> {
        Ok(self.query()?.branches.keys().cloned().collect())
    }

    fn branch_head(&self, branch: &str) -> Result<Option<String>> {
        Ok(self.query()?.branches.get(branch).map(|b| b.head.clone()))
    }

    fn branch_activity(&self, branch: &str, _base: &str) -> Result<Option<BranchActivity>> {
        Ok(self.query()?.branches.get(branch).map(|b| BranchActivity {
            first_commit: b.first_commit,
            last_commit: b.last_commit,
        }))
    }

    fn merge_date(&self, branch: &str, into: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .query()?
            .branches
            .get(branch)
            .and_then(|b| b.merged_into.get(into).copied()))
    }

    fn branch_parent(&self, branch: &str) -> Result<Option<String>> {
        Ok(self.query()?.branches.get(branch).and_then(|b| b.parent.clone()))
    }

    fn has_upstream(&self, branch: &str) -> Result<bool> {
        Ok(self.query()?.branches.get(branch).is_some_and(|b| b.upstream))
    }

    fn tracking(&self) -> Result<Option<Tracking>> {
        let state = self.query()?;
        let upstream = state
            .head
            .as_ref()
            .and_then(|h| state.branches.get(h))
            .is_some_and(|b| b.upstream);
        Ok(if upstream {
            Some(state.tracking.unwrap_or_default())
        } else {
            None
        })
    }

    fn working_tree_changes(&self) -> Result<Vec<FileChange>> {
        Ok(self.query()?.changes.clone())
    }

    fn stash_count(&self) -> Result<usize> {
        Ok(self.query()?.stash)
    }

    fn operation_in_progress(&self) -> Result<Option<ExclusiveOperation>> {
        Ok(self.query()?.operation)
    }

    fn has_remote(&self) -> Result<bool> {
        Ok(self.query()?.remote)
    }
}
