//! Workspace configuration for gitstate
//!
//! Configuration lives in `.gitstate/config.toml`. It is loaded once into a
//! flat [`WorkspaceConfiguration`] (dotted keys, string values) and
//! fingerprinted. [`compile`] turns it into the derived rule tables of a
//! [`CompiledConfiguration`]; the transform is pure, so the same raw
//! configuration always compiles to the same output.
//!
//! # Example
//!
//! ```
//! use gitstate_config::{WorkspaceConfiguration, compile};
//!
//! let raw = WorkspaceConfiguration::from_toml_str(r#"
//!     [workspace]
//!     name = "acme"
//!
//!     [branch.feature]
//!     pattern = "${workspace.namespace}/feature/*"
//! "#).unwrap();
//!
//! let compiled = compile(&raw).unwrap();
//! assert_eq!(compiled.patterns[0].source, "acme/feature/*");
//! ```

pub mod compiled;
pub mod compiler;
pub mod error;
pub mod matcher;
pub mod raw;
pub mod units;

pub use compiled::{
    BranchPattern, CleanupRule, CompiledConfiguration, CreationRule, DeletionTiming,
    DeletionTrigger, ErrorPolicy, GradualProgression, Limits, LifecycleRule, MergeRule,
    MergeTargetSpec, PatternForm, ProgressionTrigger, RepairMode, SessionPolicy, Specificity,
    SyncPolicy, SyncRule, TeamPolicy, ValidationMode, ValidationPolicy, WorkflowMode,
    WorkflowRule, WorkflowTables, WorkspaceInfo,
};
pub use compiler::compile;
pub use error::{Error, Result};
pub use matcher::{BranchMatcher, MAIN_CLASS, UNKNOWN_CLASS, USER_CLASS};
pub use raw::WorkspaceConfiguration;
