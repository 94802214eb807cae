//! Event reporting

use colored::Colorize;
use gitstate_core::StateEvent;
use gitstate_git::VcsReader;

use super::Engine;
use crate::cli::EventKind;
use crate::error::Result;

pub fn run_event(engine: &mut Engine, kind: EventKind) -> Result<()> {
    let event = match kind {
        EventKind::BranchCreated { branch, parent } => StateEvent::BranchCreated { branch, parent },
        EventKind::BranchDeleted { branch } => StateEvent::BranchDeleted { branch },
        EventKind::BranchSwitched { to, from } => StateEvent::BranchSwitched { from, to },
        EventKind::FilesModified => StateEvent::FilesModified {
            files: engine.vcs().working_tree_changes()?,
        },
        EventKind::CommitCreated { branch, commit } => StateEvent::CommitCreated { branch, commit },
        EventKind::BranchPushed { branch } => StateEvent::BranchPushed { branch },
        EventKind::BranchMerged { branch, into } => StateEvent::BranchMerged { branch, into },
    };

    engine.report_event(&event)?;
    println!("{} {}", "Recorded".green(), event.name());
    Ok(())
}
