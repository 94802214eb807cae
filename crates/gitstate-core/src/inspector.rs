//! Repository inspector: builds [`RepositorySnapshot`]s from live queries

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gitstate_config::{BranchMatcher, CompiledConfiguration, DeletionTiming, LifecycleRule};
use gitstate_git::VcsReader;

use crate::snapshot::{
    BranchRecord, DeletionProjection, ProjectedTiming, RepositorySnapshot, TrackingState,
    WorkingTree,
};
use crate::{Error, Result};

/// Read-only snapshot builder bounded by a query budget.
pub struct Inspector<'a> {
    vcs: &'a dyn VcsReader,
    config: &'a CompiledConfiguration,
    matcher: BranchMatcher,
    limit: Duration,
}

/// Tracks elapsed query time against the budget. Checked after queries
/// return, so it never cuts a running query short.
struct Budget {
    started: Instant,
    limit: Duration,
}

impl Budget {
    fn check(&self) -> Result<()> {
        let elapsed = self.started.elapsed();
        if elapsed > self.limit {
            return Err(Error::QueryTimeout {
                elapsed,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

impl<'a> Inspector<'a> {
    pub fn new(vcs: &'a dyn VcsReader, config: &'a CompiledConfiguration) -> Result<Self> {
        Ok(Self {
            vcs,
            config,
            matcher: BranchMatcher::new(config)?,
            limit: Duration::from_millis(config.limits.query_timeout_ms),
        })
    }

    pub fn with_query_limit(mut self, limit: Duration) -> Self {
        self.limit = limit;
        self
    }

    fn budget(&self) -> Budget {
        Budget {
            started: Instant::now(),
            limit: self.limit,
        }
    }

    /// Namespaced local branches plus every protected branch, with whether
    /// each exists locally.
    pub fn candidates(&self) -> Result<Vec<(String, bool)>> {
        let local: BTreeSet<String> = self.vcs.local_branches()?.into_iter().collect();
        let mut names: BTreeSet<&str> = local
            .iter()
            .filter(|b| self.matcher.is_namespaced(b))
            .map(String::as_str)
            .collect();
        names.extend(self.config.protected.keys().map(String::as_str));
        Ok(names
            .into_iter()
            .map(|name| (name.to_string(), local.contains(name)))
            .collect())
    }

    /// Full snapshot: runtime facts plus a record for every candidate branch.
    pub fn inspect(&self, now: DateTime<Utc>) -> Result<RepositorySnapshot> {
        let budget = self.budget();
        let mut snapshot = RepositorySnapshot {
            captured_at: now,
            current_branch: None,
            main_branch_exists: false,
            has_remote: false,
            working_tree: WorkingTree::default(),
            stash_count: 0,
            tracking: TrackingState::default(),
            operation_in_progress: None,
            branches: Default::default(),
        };
        self.fill_runtime(&mut snapshot, &budget)?;

        for (name, exists) in self.candidates()? {
            let record = self.record_branch(&name, exists)?;
            snapshot.branches.insert(name, record);
            budget.check()?;
        }
        snapshot.main_branch_exists = snapshot
            .branch(&self.config.workspace.main_branch)
            .is_some_and(|b| b.exists);

        tracing::debug!(
            branches = snapshot.branches.len(),
            elapsed_ms = budget.started.elapsed().as_millis() as u64,
            "Inspected repository"
        );
        Ok(snapshot)
    }

    /// Partial refresh: re-read current branch, working tree, stash,
    /// tracking, remote presence and operation state only.
    pub fn refresh_runtime(&self, snapshot: &mut RepositorySnapshot, now: DateTime<Utc>) -> Result<()> {
        let budget = self.budget();
        snapshot.captured_at = now;
        self.fill_runtime(snapshot, &budget)?;
        snapshot.main_branch_exists = self
            .vcs
            .branch_head(&self.config.workspace.main_branch)?
            .is_some();
        Ok(())
    }

    fn fill_runtime(&self, snapshot: &mut RepositorySnapshot, budget: &Budget) -> Result<()> {
        snapshot.current_branch = self.vcs.current_branch()?;
        snapshot.working_tree = WorkingTree::from_changes(self.vcs.working_tree_changes()?);
        budget.check()?;
        snapshot.stash_count = self.vcs.stash_count()?;
        snapshot.has_remote = self.vcs.has_remote()?;
        snapshot.operation_in_progress = self.vcs.operation_in_progress()?;
        snapshot.tracking = match self.vcs.tracking()? {
            Some(t) => TrackingState {
                has_upstream: true,
                ahead: t.ahead,
                behind: t.behind,
                diverged: t.diverged(),
            },
            None => TrackingState::default(),
        };
        budget.check()
    }

    /// Build the record for one branch.
    pub fn record_branch(&self, name: &str, exists: bool) -> Result<BranchRecord> {
        let classification = self.matcher.classify(name);
        let protection_reason = self.config.protected.get(name).cloned();

        if !exists {
            return Ok(BranchRecord {
                protected: protection_reason.is_some(),
                protection_reason,
                ..BranchRecord::absent(classification)
            });
        }

        let main = &self.config.workspace.main_branch;
        let head = self.vcs.branch_head(name)?;
        let activity = self.vcs.branch_activity(name, main)?;
        let merged_at = if name == main || head == self.vcs.branch_head(main)? {
            // Nothing of its own to merge yet
            None
        } else {
            self.vcs.merge_date(name, main)?
        };

        let mut record = BranchRecord {
            exists: true,
            head,
            parent: self.vcs.branch_parent(name)?,
            created_at: activity.map(|a| a.first_commit),
            last_activity: activity.map(|a| a.last_commit),
            merged_at,
            protected: protection_reason.is_some(),
            protection_reason,
            classification,
            deletion: DeletionProjection::never(""),
            has_upstream: self.vcs.has_upstream(name)?,
        };
        record.deletion = self.project(&record);
        Ok(record)
    }

    /// Deletion projection of `record` under the configured lifecycle.
    pub fn project(&self, record: &BranchRecord) -> DeletionProjection {
        project_deletion(
            self.config.lifecycle_for(&record.classification),
            record,
        )
    }
}

/// Project when a branch becomes eligible for deletion.
///
/// The reference date is the merge date for delete-after-merge types and the
/// last activity otherwise. Protected branches are never deleted.
pub fn project_deletion(rule: Option<&LifecycleRule>, record: &BranchRecord) -> DeletionProjection {
    if record.protected {
        return DeletionProjection::never("protected");
    }
    let Some(rule) = rule else {
        return DeletionProjection::never(format!(
            "no lifecycle rule for '{}'",
            record.classification
        ));
    };
    if rule.timing == DeletionTiming::Never {
        return DeletionProjection::never(rule.rationale.clone());
    }

    let reference = if rule.delete_after_merge {
        record.merged_at
    } else {
        record.last_activity
    };
    let Some(reference) = reference else {
        if rule.delete_after_merge {
            return DeletionProjection {
                timing: ProjectedTiming::Pending,
                date: None,
                reason: "awaiting merge".to_string(),
            };
        }
        return DeletionProjection::never("no recorded activity");
    };

    match (rule.timing, rule.retention_days) {
        (DeletionTiming::Scheduled, Some(days)) => {
            // Retention past the representable calendar never elapses
            match chrono::Duration::try_days(i64::from(days))
                .and_then(|window| reference.checked_add_signed(window))
            {
                Some(date) => DeletionProjection {
                    timing: ProjectedTiming::Scheduled,
                    date: Some(date),
                    reason: rule.rationale.clone(),
                },
                None => DeletionProjection::never(format!(
                    "retention of {days} days is beyond the calendar"
                )),
            }
        }
        _ => DeletionProjection {
            timing: ProjectedTiming::Immediate,
            date: Some(reference),
            reason: rule.rationale.clone(),
        },
    }
}
