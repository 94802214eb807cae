//! State engine for gitstate
//!
//! Maintains one cached document describing a workspace: its compiled
//! configuration, a snapshot of the repository and every workflow decision
//! derived from both. Tooling reads decisions instead of re-deriving them.
//!
//! # Architecture
//!
//! ```text
//!                    gitstate-cli
//!                         |
//!                   gitstate-core
//!        engine -> transaction -> store
//!          |  \-> inspector -> decision
//!          \---> drift, events, path
//!                         |
//!     +-------------------+------------------+
//!     |                   |                  |
//! gitstate-fs        gitstate-git      gitstate-config
//! ```
//!
//! - [`StateEngine`] decides when the cache is stale and routes reads and writes.
//! - [`TransactionManager`] is the only writer; it holds the exclusive lock and
//!   restores the original bytes on failure.
//! - [`Inspector`] turns live repository queries into a [`RepositorySnapshot`].
//! - [`evaluate`] is a pure function from configuration and snapshot to a
//!   [`DecisionSet`].
//!
//! # Example
//!
//! ```ignore
//! use gitstate_core::StateEngine;
//!
//! let mut engine = StateEngine::open(std::path::Path::new("."))?;
//! engine.ensure_fresh()?;
//! let target = engine.get("decisionSet.mergeTarget")?;
//! # Ok::<(), gitstate_core::Error>(())
//! ```

pub mod decision;
pub mod document;
pub mod drift;
pub mod engine;
pub mod error;
pub mod events;
pub mod inspector;
pub mod path;
pub mod snapshot;
pub mod store;
pub mod summary;
pub mod transaction;
pub mod workspace;

pub use decision::{Allowance, CleanupCandidate, DecisionSet, Verdict, evaluate};
pub use document::{HistoryEntry, Metadata, OperationRecord, STATE_VERSION, StateDocument};
pub use drift::{Confirm, DriftItem, DriftReport, FixedAnswer, RepairOutcome};
pub use engine::{RefreshTrigger, StateEngine};
pub use error::{Error, Result};
pub use events::StateEvent;
pub use inspector::{Inspector, project_deletion};
pub use path::{DocPath, Mutation, Segment};
pub use snapshot::{
    BranchRecord, DeletionProjection, ProjectedTiming, RepositorySnapshot, TrackingState,
    WorkingTree,
};
pub use store::StateStore;
pub use summary::render_summary;
pub use transaction::{TransactionManager, TransactionState};
pub use workspace::{CONFIG_FILE, STATE_DIR, STATE_FILE, WorkspacePaths};
