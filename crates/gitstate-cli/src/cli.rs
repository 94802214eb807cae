//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use gitstate_config::RepairMode;

/// gitstate - Cached repository state and workflow decisions
#[derive(Parser, Debug)]
#[command(name = "gitstate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(short = 'C', long, global = true, env = "GITSTATE_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Bring the cached state up to date
    ///
    /// Without --full only the runtime fields (current branch, working tree,
    /// tracking) are re-read when the cache already exists.
    Refresh {
        /// Rebuild the whole document from the repository
        #[arg(long)]
        full: bool,
    },

    /// Print the value at a document path as JSON
    ///
    /// Examples:
    ///   gitstate get repositorySnapshot.currentBranch
    ///   gitstate get 'repositorySnapshot.branches[main].lastCommit'
    ///   gitstate get metadata.custom.ticket --default null
    Get {
        /// Dot/bracket path into the state document
        path: String,

        /// JSON value printed when the path is absent
        #[arg(long)]
        default: Option<String>,
    },

    /// Print the whole state document
    Dump,

    /// Print a human-readable overview
    Summary,

    /// Write a JSON value at a document path
    Set {
        path: String,
        /// JSON value (bare words are taken as strings)
        value: String,
    },

    /// Write several values in one transaction
    SetMany {
        /// Entries of the form path=json
        #[arg(required = true)]
        entries: Vec<String>,
    },

    /// Add to a numeric field
    Incr {
        path: String,
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        by: i64,
    },

    /// Append to a list, dropping the oldest entries beyond --max
    Append {
        path: String,
        value: String,
        #[arg(long, default_value_t = 50)]
        max: usize,
    },

    /// Delete a field or list element
    Remove { path: String },

    /// Report a repository event
    Event {
        #[command(subcommand)]
        event: EventKind,
    },

    /// Compare the cache with the repository
    Drift {
        /// Repair behaviour (defaults to errors.drift_repair)
        #[arg(long, value_enum)]
        repair: Option<RepairArg>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fail when the cache disagrees with the repository
    Verify,
}

/// Events reported by the surrounding tooling
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A branch was created
    BranchCreated {
        branch: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// A branch was deleted
    BranchDeleted { branch: String },
    /// HEAD moved to another branch
    BranchSwitched {
        to: String,
        #[arg(long)]
        from: Option<String>,
    },
    /// The working tree changed; the change list is read from the repository
    FilesModified,
    /// A commit was recorded
    CommitCreated { branch: String, commit: String },
    /// A branch was pushed
    BranchPushed { branch: String },
    /// A branch was merged
    BranchMerged { branch: String, into: String },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairArg {
    Report,
    Interactive,
    Auto,
}

impl From<RepairArg> for RepairMode {
    fn from(arg: RepairArg) -> Self {
        match arg {
            RepairArg::Report => RepairMode::ReportOnly,
            RepairArg::Interactive => RepairMode::Interactive,
            RepairArg::Auto => RepairMode::Auto,
        }
    }
}
