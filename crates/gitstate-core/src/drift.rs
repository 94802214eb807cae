//! Drift between the cached document and the live repository

use gitstate_config::RepairMode;
use gitstate_git::VcsReader;
use serde::{Deserialize, Serialize};

use crate::document::StateDocument;
use crate::inspector::Inspector;
use crate::{Error, Result};

/// One cached field that disagrees with the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftItem {
    pub field: String,
    pub cached: String,
    pub live: String,
}

impl std::fmt::Display for DriftItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: cached {}, live {}", self.field, self.cached, self.live)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub items: Vec<DriftItem>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.items.is_empty()
    }

    fn compare(&mut self, field: &str, cached: impl ToString, live: impl ToString) {
        let (cached, live) = (cached.to_string(), live.to_string());
        if cached != live {
            self.items.push(DriftItem {
                field: field.to_string(),
                cached,
                live,
            });
        }
    }
}

/// What a repair run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub mode: RepairMode,
    pub report: DriftReport,
    /// Whether the document was rewritten
    pub applied: bool,
}

/// Confirmation collaborator for interactive repair
pub trait Confirm {
    fn confirm(&mut self, report: &DriftReport) -> bool;
}

/// Always answers the same.
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&mut self, _report: &DriftReport) -> bool {
        self.0
    }
}

fn branch_label(branch: Option<&str>) -> &str {
    branch.unwrap_or("(detached)")
}

/// Compare cached runtime fields against live values.
///
/// Branch counts only drift when they differ by more than the configured
/// tolerance.
pub fn detect(document: &StateDocument, vcs: &dyn VcsReader) -> Result<DriftReport> {
    let cached = &document.repository_snapshot;
    let config = &document.compiled_configuration;
    let mut report = DriftReport::default();

    let live_branch = vcs.current_branch()?;
    report.compare(
        "currentBranch",
        branch_label(cached.current_branch.as_deref()),
        branch_label(live_branch.as_deref()),
    );

    let live_changes = vcs.working_tree_changes()?;
    report.compare(
        "workingTree.clean",
        cached.working_tree.clean,
        live_changes.is_empty(),
    );
    report.compare(
        "workingTree.changeCount",
        cached.working_tree.change_count(),
        live_changes.len(),
    );
    report.compare("hasRemote", cached.has_remote, vcs.has_remote()?);

    let live_count = Inspector::new(vcs, config)?
        .candidates()?
        .into_iter()
        .filter(|(_, exists)| *exists)
        .count();
    let cached_count = cached.existing_branch_count();
    if cached_count.abs_diff(live_count) > config.limits.branch_count_tolerance {
        report.compare("branchCount", cached_count, live_count);
    }

    if !report.is_clean() {
        tracing::info!(items = report.items.len(), "Detected state drift");
    }
    Ok(report)
}

/// Fail-closed gate before operations that trust the cache.
///
/// Checks current branch, clean state and main-branch existence; any
/// mismatch is [`Error::Inconsistent`]. When the repository cannot be
/// queried the gate blocks if the policy is fail-closed and passes with a
/// warning otherwise.
pub fn validate_against_truth(document: &StateDocument, vcs: &dyn VcsReader) -> Result<()> {
    let fail_closed = document.compiled_configuration.errors.fail_closed;
    match compare_truth(document, vcs) {
        Ok(items) if items.is_empty() => Ok(()),
        Ok(items) => Err(Error::Inconsistent {
            items: items.iter().map(ToString::to_string).collect(),
        }),
        Err(e) if fail_closed => Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "Could not verify state against repository");
            Ok(())
        }
    }
}

fn compare_truth(document: &StateDocument, vcs: &dyn VcsReader) -> Result<Vec<DriftItem>> {
    let cached = &document.repository_snapshot;
    let main = &document.compiled_configuration.workspace.main_branch;
    let mut report = DriftReport::default();

    report.compare(
        "currentBranch",
        branch_label(cached.current_branch.as_deref()),
        branch_label(vcs.current_branch()?.as_deref()),
    );
    report.compare(
        "workingTree.clean",
        cached.working_tree.clean,
        vcs.working_tree_changes()?.is_empty(),
    );
    report.compare(
        "mainBranchExists",
        cached.main_branch_exists,
        vcs.branch_head(main)?.is_some(),
    );
    Ok(report.items)
}
