//! Read-only version-control interface for gitstate
//!
//! The state engine never mutates the repository. Everything it needs to know
//! about branches, history and the working tree goes through [`VcsReader`];
//! [`Git2Reader`] implements it on top of `git2`.

pub mod error;
pub mod reader;
pub mod repository;
pub mod types;

pub use error::{Error, Result};
pub use reader::VcsReader;
pub use repository::Git2Reader;
pub use types::{BranchActivity, ChangeKind, ExclusiveOperation, FileChange, Tracking};
