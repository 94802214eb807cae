//! `git2`-backed implementation of [`VcsReader`]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::{BranchType, ErrorCode, Oid, Repository, RepositoryState, Sort, Status, StatusOptions};

use crate::reader::VcsReader;
use crate::types::{BranchActivity, ChangeKind, ExclusiveOperation, FileChange, Tracking};
use crate::{Error, Result};

/// Read-only repository access through libgit2.
pub struct Git2Reader {
    repo: Repository,
    ignored_prefixes: Vec<String>,
}

impl Git2Reader {
    /// Open the repository at `root` (a working directory or a `.git` directory).
    pub fn open(root: &Path) -> Result<Self> {
        let repo = Repository::open(root).map_err(|e| match e.code() {
            ErrorCode::NotFound => Error::NotARepository {
                path: root.to_path_buf(),
            },
            _ => Error::Git(e),
        })?;
        Ok(Self {
            repo,
            ignored_prefixes: Vec::new(),
        })
    }

    /// Hide working-tree paths under `prefix` (such as the state directory)
    /// from [`VcsReader::working_tree_changes`].
    pub fn with_ignored_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_prefixes.push(prefix.into());
        self
    }

    /// Working directory of the repository, if it is not bare.
    pub fn workdir(&self) -> Option<PathBuf> {
        self.repo.workdir().map(Path::to_path_buf)
    }

    fn branch_oid(&self, branch: &str) -> Result<Option<Oid>> {
        match self.repo.find_branch(branch, BranchType::Local) {
            Ok(b) => Ok(b.get().target()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn commit_time(&self, oid: Oid, reference: &str) -> Result<DateTime<Utc>> {
        let seconds = self.repo.find_commit(oid)?.time().seconds();
        DateTime::from_timestamp(seconds, 0).ok_or_else(|| Error::InvalidTimestamp {
            reference: reference.to_string(),
            seconds,
        })
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.ignored_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

fn classify_status(status: Status) -> ChangeKind {
    if status.is_wt_new() {
        ChangeKind::Untracked
    } else if status.is_index_new() {
        ChangeKind::Added
    } else if status.is_index_renamed() || status.is_wt_renamed() {
        ChangeKind::Renamed
    } else if status.is_index_deleted() || status.is_wt_deleted() {
        ChangeKind::Deleted
    } else if status.is_index_modified()
        || status.is_wt_modified()
        || status.is_index_typechange()
        || status.is_wt_typechange()
    {
        ChangeKind::Modified
    } else {
        ChangeKind::Other
    }
}

impl VcsReader for Git2Reader {
    fn current_branch(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            // Fresh repository: HEAD names a branch with no commits yet
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn local_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn branch_head(&self, branch: &str) -> Result<Option<String>> {
        Ok(self.branch_oid(branch)?.map(|oid| oid.to_string()))
    }

    fn branch_activity(&self, branch: &str, base: &str) -> Result<Option<BranchActivity>> {
        let Some(head) = self.branch_oid(branch)? else {
            return Ok(None);
        };
        let last_commit = self.commit_time(head, branch)?;

        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)?;
        walk.push(head)?;
        if branch != base
            && let Some(base_oid) = self.branch_oid(base)?
        {
            walk.hide(base_oid)?;
        }

        let first_commit = match walk.next() {
            Some(oid) => self.commit_time(oid?, branch)?,
            None => last_commit,
        };

        Ok(Some(BranchActivity {
            first_commit,
            last_commit,
        }))
    }

    fn merge_date(&self, branch: &str, into: &str) -> Result<Option<DateTime<Utc>>> {
        if branch == into {
            return Ok(None);
        }
        let (Some(head), Some(target)) = (self.branch_oid(branch)?, self.branch_oid(into)?) else {
            return Ok(None);
        };
        if head != target && !self.repo.graph_descendant_of(target, head)? {
            return Ok(None);
        }

        // Follow the first-parent chain of `into` back to the oldest commit
        // that still contains the branch head: that commit brought it in.
        let mut landing = self.repo.find_commit(target)?;
        while landing.id() != head {
            let Ok(parent) = landing.parent(0) else {
                break;
            };
            if parent.id() == head || self.repo.graph_descendant_of(parent.id(), head)? {
                landing = parent;
            } else {
                break;
            }
        }

        self.commit_time(landing.id(), into).map(Some)
    }

    fn branch_parent(&self, branch: &str) -> Result<Option<String>> {
        let config = self.repo.config()?;
        match config.get_string(&format!("branch.{branch}.parent")) {
            Ok(parent) if !parent.trim().is_empty() => Ok(Some(parent.trim().to_string())),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn has_upstream(&self, branch: &str) -> Result<bool> {
        match self.repo.find_branch(branch, BranchType::Local) {
            Ok(b) => Ok(b.upstream().is_ok()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn tracking(&self) -> Result<Option<Tracking>> {
        let Some(current) = self.current_branch()? else {
            return Ok(None);
        };
        let branch = match self.repo.find_branch(&current, BranchType::Local) {
            Ok(b) => b,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Ok(upstream) = branch.upstream() else {
            return Ok(None);
        };
        let (Some(local), Some(remote)) = (branch.get().target(), upstream.get().target()) else {
            return Ok(None);
        };
        let (ahead, behind) = self.repo.graph_ahead_behind(local, remote)?;
        Ok(Some(Tracking { ahead, behind }))
    }

    fn working_tree_changes(&self) -> Result<Vec<FileChange>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .renames_head_to_index(true);

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut changes = Vec::new();
        for entry in statuses.iter() {
            let status = entry.status();
            if status.is_ignored() || status == Status::CURRENT {
                continue;
            }
            let Some(path) = entry.path() else {
                tracing::debug!("Skipping status entry with non UTF-8 path");
                continue;
            };
            if self.is_ignored(path) {
                continue;
            }
            changes.push(FileChange::new(path, classify_status(status)));
        }
        changes.sort();
        Ok(changes)
    }

    fn stash_count(&self) -> Result<usize> {
        // stash_foreach needs a mutable handle
        let mut repo = Repository::open(self.repo.path())?;
        let mut count = 0;
        match repo.stash_foreach(|_, _, _| {
            count += 1;
            true
        }) {
            Ok(()) => Ok(count),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn operation_in_progress(&self) -> Result<Option<ExclusiveOperation>> {
        let operation = match self.repo.state() {
            RepositoryState::Clean => None,
            RepositoryState::Merge => Some(ExclusiveOperation::Merge),
            RepositoryState::Revert | RepositoryState::RevertSequence => {
                Some(ExclusiveOperation::Revert)
            }
            RepositoryState::CherryPick | RepositoryState::CherryPickSequence => {
                Some(ExclusiveOperation::CherryPick)
            }
            RepositoryState::Bisect => Some(ExclusiveOperation::Bisect),
            RepositoryState::Rebase
            | RepositoryState::RebaseInteractive
            | RepositoryState::RebaseMerge => Some(ExclusiveOperation::Rebase),
            RepositoryState::ApplyMailbox | RepositoryState::ApplyMailboxOrRebase => {
                Some(ExclusiveOperation::ApplyMailbox)
            }
        };
        Ok(operation)
    }

    fn has_remote(&self) -> Result<bool> {
        Ok(!self.repo.remotes()?.is_empty())
    }
}
