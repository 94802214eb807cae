//! Command implementations for gitstate-cli

pub mod drift;
pub mod event;
pub mod state;
pub mod write;

use gitstate_core::StateEngine;
use gitstate_git::Git2Reader;
use serde_json::Value;

pub use drift::{run_drift, run_verify};
pub use event::run_event;
pub use state::{run_dump, run_get, run_refresh, run_summary};
pub use write::{run_append, run_incr, run_remove, run_set, run_set_many};

/// Engine over the workspace's git repository
pub type Engine = StateEngine<Git2Reader>;

/// JSON argument, falling back to a plain string for bare words.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
