//! Exclusive locking for the state document
//!
//! The lock is an advisory, single-host primitive. Two strategies exist:
//!
//! - [`FileLockStrategy`] takes a kernel advisory lock (`flock`/`LockFileEx`
//!   via `fs2`) on a lock file next to the state document.
//! - [`DirLockStrategy`] relies on `create_dir` being atomic, for platforms or
//!   filesystems where advisory locks are unavailable.
//!
//! [`LockManager`] drives a strategy with fixed-interval polling until a
//! timeout expires.
//!
//! A lock left behind by a crashed holder is not reclaimed. Kernel locks die
//! with their process; a stale directory lock must be removed by hand, and the
//! owner record inside it says who created it.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use backoff::ExponentialBackoff;
use fs2::FileExt;

use crate::{Error, Result};

/// Default interval between acquisition attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Which locking primitive to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockKind {
    /// Pick the best primitive the platform offers
    #[default]
    Auto,
    /// Kernel advisory file lock
    File,
    /// Atomic directory creation
    Directory,
}

impl LockKind {
    /// Parse a configuration value (`auto`, `file`, `directory`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "file" | "flock" => Some(Self::File),
            "directory" | "dir" | "mkdir" => Some(Self::Directory),
            _ => None,
        }
    }

    /// Resolve `Auto` to a concrete primitive for this platform.
    pub fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(any(unix, windows)) => Self::File,
            Self::Auto => Self::Directory,
            other => other,
        }
    }
}

/// A mutual-exclusion primitive backing a [`LockManager`].
pub trait LockStrategy: Send + std::fmt::Debug {
    /// Attempt to take the lock without blocking.
    ///
    /// Returns `Ok(false)` when another holder has it.
    fn try_acquire(&mut self) -> Result<bool>;

    /// Give the lock up. Calling this when not held is a no-op.
    fn release(&mut self) -> Result<()>;

    /// Whether this strategy currently holds the lock.
    fn is_held(&self) -> bool;

    /// Filesystem artifact representing the lock.
    fn artifact(&self) -> &Path;

    /// Human-readable description of the current holder, when recorded.
    fn describe_owner(&self) -> Option<String> {
        None
    }
}

fn owner_record() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("pid={} host={} acquired={}\n", std::process::id(), host, since_epoch)
}

/// Kernel advisory lock on a dedicated lock file.
///
/// The file is unlinked on release while the lock is still held, so a new
/// holder re-checks that the path still names the file it locked.
#[derive(Debug)]
pub struct FileLockStrategy {
    path: PathBuf,
    file: Option<File>,
}

impl FileLockStrategy {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn is_contended(err: &std::io::Error) -> bool {
        err.kind() == std::io::ErrorKind::WouldBlock
            || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
    }

    #[cfg(unix)]
    fn still_linked(&self, file: &File) -> bool {
        use std::os::unix::fs::MetadataExt;
        match (file.metadata(), fs::metadata(&self.path)) {
            (Ok(held), Ok(on_disk)) => held.ino() == on_disk.ino() && held.dev() == on_disk.dev(),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    fn still_linked(&self, _file: &File) -> bool {
        self.path.exists()
    }
}

impl LockStrategy for FileLockStrategy {
    fn try_acquire(&mut self) -> Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if Self::is_contended(&e) => return Ok(false),
            Err(e) => return Err(Error::io(&self.path, e)),
        }

        // The previous holder may have unlinked the file between open and lock
        if !self.still_linked(&file) {
            let _ = FileExt::unlock(&file);
            return Ok(false);
        }

        let record = owner_record();
        if let Err(e) = file.set_len(0).and_then(|()| file.write_all(record.as_bytes())) {
            tracing::debug!(path = %self.path.display(), error = %e, "Could not record lock owner");
        }

        self.file = Some(file);
        Ok(true)
    }

    fn release(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let removed = fs::remove_file(&self.path);
        let unlocked = FileExt::unlock(&file);
        drop(file);

        match removed {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(Error::io(&self.path, e));
            }
            _ => {}
        }
        unlocked.map_err(|e| Error::io(&self.path, e))
    }

    fn is_held(&self) -> bool {
        self.file.is_some()
    }

    fn artifact(&self) -> &Path {
        &self.path
    }

    fn describe_owner(&self) -> Option<String> {
        let mut content = String::new();
        File::open(&self.path)
            .and_then(|mut f| f.read_to_string(&mut content))
            .ok()?;
        let trimmed = content.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Lock implemented as atomic creation of a directory.
#[derive(Debug)]
pub struct DirLockStrategy {
    path: PathBuf,
    held: bool,
}

impl DirLockStrategy {
    const OWNER_FILE: &'static str = "owner";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: false,
        }
    }
}

impl LockStrategy for DirLockStrategy {
    fn try_acquire(&mut self) -> Result<bool> {
        if self.held {
            return Ok(true);
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        match fs::create_dir(&self.path) {
            Ok(()) => {
                self.held = true;
                let owner_path = self.path.join(Self::OWNER_FILE);
                if let Err(e) = fs::write(&owner_path, owner_record()) {
                    tracing::debug!(path = %owner_path.display(), error = %e, "Could not record lock owner");
                }
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    fn is_held(&self) -> bool {
        self.held
    }

    fn artifact(&self) -> &Path {
        &self.path
    }

    fn describe_owner(&self) -> Option<String> {
        fs::read_to_string(self.path.join(Self::OWNER_FILE))
            .ok()
            .map(|s| s.trim().to_string())
    }
}

/// Serializes access to the state document across processes.
#[derive(Debug)]
pub struct LockManager {
    strategy: Box<dyn LockStrategy>,
    poll_interval: Duration,
}

impl LockManager {
    /// Create a manager guarding `target` with the given primitive.
    ///
    /// The lock artifact is `<target>.lock` (file) or `<target>.lock.d`
    /// (directory).
    pub fn for_target(target: &Path, kind: LockKind) -> Self {
        let mut artifact = target.as_os_str().to_owned();
        let strategy: Box<dyn LockStrategy> = match kind.resolve() {
            LockKind::Directory => {
                artifact.push(".lock.d");
                Box::new(DirLockStrategy::new(PathBuf::from(artifact)))
            }
            _ => {
                artifact.push(".lock");
                Box::new(FileLockStrategy::new(PathBuf::from(artifact)))
            }
        };
        Self::with_strategy(strategy)
    }

    pub fn with_strategy(strategy: Box<dyn LockStrategy>) -> Self {
        Self {
            strategy,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the fixed delay between acquisition attempts.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Acquire the lock, polling until `timeout` elapses.
    ///
    /// A zero timeout makes exactly one attempt.
    pub fn acquire(&mut self, timeout: Duration) -> Result<()> {
        if self.strategy.is_held() {
            return Ok(());
        }

        let policy = ExponentialBackoff {
            current_interval: self.poll_interval,
            initial_interval: self.poll_interval,
            max_interval: self.poll_interval,
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_elapsed_time: Some(timeout),
            ..ExponentialBackoff::default()
        };

        let strategy = &mut self.strategy;
        let outcome = backoff::retry(policy, || match strategy.try_acquire() {
            Ok(true) => Ok(()),
            Ok(false) => Err(backoff::Error::transient(None)),
            Err(e) => Err(backoff::Error::permanent(Some(e))),
        });

        match outcome {
            Ok(()) => {
                tracing::debug!(artifact = %self.strategy.artifact().display(), "Lock acquired");
                Ok(())
            }
            Err(backoff::Error::Permanent(Some(e))) => Err(e),
            Err(_) => {
                let owner = self
                    .strategy
                    .describe_owner()
                    .unwrap_or_else(|| "unknown owner".to_string());
                tracing::warn!(
                    artifact = %self.strategy.artifact().display(),
                    ?timeout,
                    %owner,
                    "Lock acquisition timed out"
                );
                Err(Error::LockUnavailable {
                    path: self.strategy.artifact().to_path_buf(),
                    waited: timeout,
                    owner,
                })
            }
        }
    }

    /// Release the lock. Safe to call any number of times; never fails.
    pub fn release(&mut self) {
        if !self.strategy.is_held() {
            return;
        }
        match self.strategy.release() {
            Ok(()) => {
                tracing::debug!(artifact = %self.strategy.artifact().display(), "Lock released");
            }
            Err(e) => {
                tracing::warn!(
                    artifact = %self.strategy.artifact().display(),
                    error = %e,
                    "Failed to clean up lock artifact"
                );
            }
        }
    }

    /// Whether this manager holds the lock.
    pub fn is_held(&self) -> bool {
        self.strategy.is_held()
    }

    /// Guard for mutation paths: error unless the lock is held.
    pub fn validate_held(&self) -> Result<()> {
        if self.strategy.is_held() {
            Ok(())
        } else {
            Err(Error::LockNotHeld {
                path: self.strategy.artifact().to_path_buf(),
            })
        }
    }

    pub fn artifact(&self) -> &Path {
        self.strategy.artifact()
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.release();
    }
}
