//! Transaction manager
//!
//! ```text
//! Idle -> Active -> Committing -> Idle
//!                -> RollingBack -> Idle
//! ```
//!
//! `begin` takes the exclusive lock and captures the document bytes for
//! rollback. Mutations happen on an in-memory copy. `commit` validates,
//! stamps operation metadata and persists atomically; a failed commit rolls
//! back. The lock is released on every exit path, including drop.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gitstate_fs::LockManager;
use uuid::Uuid;

use crate::document::{OperationRecord, StateDocument};
use crate::store::StateStore;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Active,
    Committing,
    RollingBack,
}

#[derive(Debug)]
struct Active {
    name: String,
    started: Instant,
    started_at: DateTime<Utc>,
    original: Option<Vec<u8>>,
    document: Option<StateDocument>,
}

/// Owns the store and the lock; the only path that writes the document.
#[derive(Debug)]
pub struct TransactionManager {
    store: StateStore,
    lock: LockManager,
    lock_timeout: Duration,
    state: TransactionState,
    active: Option<Active>,
}

impl TransactionManager {
    pub fn new(store: StateStore, lock: LockManager, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock,
            lock_timeout,
            state: TransactionState::Idle,
            active: None,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Name of the active transaction.
    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    /// Acquire the lock and load the current document.
    ///
    /// A document from another format version loads as absent so the caller
    /// can rebuild it; a corrupt document aborts the transaction.
    pub fn begin(&mut self, name: &str) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(Error::TransactionActive {
                name: active.name.clone(),
            });
        }
        self.lock.acquire(self.lock_timeout)?;

        let loaded = self.store.read_bytes().and_then(|original| {
            let document = match self.store.read() {
                Ok(doc) => doc,
                Err(Error::VersionMismatch { found, expected }) => {
                    tracing::warn!(%found, expected, "Discarding state document from another version");
                    None
                }
                Err(e) => return Err(e),
            };
            Ok((original, document))
        });
        let (original, document) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                self.lock.release();
                return Err(e);
            }
        };

        tracing::debug!(transaction = name, "Transaction started");
        self.active = Some(Active {
            name: name.to_string(),
            started: Instant::now(),
            started_at: Utc::now(),
            original,
            document,
        });
        self.state = TransactionState::Active;
        Ok(())
    }

    fn active(&self) -> Result<&Active> {
        self.active.as_ref().ok_or(Error::NoTransaction)
    }

    fn active_mut(&mut self) -> Result<&mut Active> {
        self.active.as_mut().ok_or(Error::NoTransaction)
    }

    /// Working copy, `None` when no document exists yet.
    pub fn document(&self) -> Result<Option<&StateDocument>> {
        Ok(self.active()?.document.as_ref())
    }

    pub fn document_mut(&mut self) -> Result<&mut StateDocument> {
        let path = self.store.path().to_path_buf();
        self.lock.validate_held()?;
        self.active_mut()?
            .document
            .as_mut()
            .ok_or(Error::MissingDocument { path })
    }

    /// Replace the working copy wholesale.
    pub fn replace(&mut self, document: StateDocument) -> Result<()> {
        self.lock.validate_held()?;
        self.active_mut()?.document = Some(document);
        Ok(())
    }

    /// Validate, stamp and persist the working copy, then release the lock.
    ///
    /// Validation or write failures roll back and return the error.
    pub fn commit(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Err(Error::NoTransaction);
        };
        self.state = TransactionState::Committing;

        let result = self.persist(&mut active);
        match result {
            Ok(()) => {
                tracing::debug!(
                    transaction = %active.name,
                    duration_ms = active.started.elapsed().as_millis() as u64,
                    "Transaction committed"
                );
                self.lock.release();
                self.state = TransactionState::Idle;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(transaction = %active.name, error = %e, "Commit failed, rolling back");
                self.active = Some(active);
                self.rollback();
                Err(e)
            }
        }
    }

    fn persist(&self, active: &mut Active) -> Result<()> {
        self.lock.validate_held()?;
        let Some(document) = active.document.as_mut() else {
            // Nothing was produced; the disk is untouched
            return Ok(());
        };

        let problems = document.commit_problems();
        if !problems.is_empty() {
            return Err(Error::InvalidMutation {
                message: problems.join("; "),
            });
        }
        document.metadata.last_operation = Some(OperationRecord {
            id: Uuid::new_v4(),
            name: active.name.clone(),
            timestamp: active.started_at,
            duration_ms: active.started.elapsed().as_millis() as u64,
        });
        self.store.write(document)
    }

    /// Restore the pre-transaction document and release the lock.
    ///
    /// Never fails: restore errors are logged, the lock is always released.
    pub fn rollback(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.state = TransactionState::RollingBack;

        match self.store.read_bytes() {
            Ok(current) if current == active.original => {}
            _ => {
                if let Err(e) = self.store.restore(active.original.as_deref()) {
                    tracing::error!(
                        transaction = %active.name,
                        error = %e,
                        "Failed to restore state document during rollback"
                    );
                }
            }
        }

        tracing::debug!(transaction = %active.name, "Transaction rolled back");
        self.lock.release();
        self.state = TransactionState::Idle;
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub fn run<T>(&mut self, name: &str, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.begin(name)?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        if self.active.is_some() {
            tracing::warn!(
                transaction = self.active_name().unwrap_or_default(),
                "Transaction dropped while active, rolling back"
            );
            self.rollback();
        }
    }
}
