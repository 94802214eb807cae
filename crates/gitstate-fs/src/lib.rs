//! Filesystem primitives for gitstate
//!
//! Provides the exclusive lock guarding the state document, crash-safe
//! atomic writes, and the canonical content digest format.

pub mod checksum;
pub mod error;
pub mod io;
pub mod lock;

pub use checksum::content_digest;
pub use error::{Error, Result};
pub use io::write_atomic;
pub use lock::{DirLockStrategy, FileLockStrategy, LockKind, LockManager, LockStrategy};
