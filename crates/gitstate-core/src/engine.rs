//! State engine facade
//!
//! Owns the workspace configuration, the repository reader and the
//! transaction manager. Reads go straight to the store and may observe a
//! slightly stale document; every write, including refreshes, runs inside a
//! locked transaction.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gitstate_config::{CompiledConfiguration, RepairMode, WorkspaceConfiguration, compile};
use gitstate_fs::{LockKind, LockManager};
use gitstate_git::{Git2Reader, VcsReader};
use serde_json::Value;

use crate::document::StateDocument;
use crate::drift::{self, Confirm, DriftReport, RepairOutcome};
use crate::events::{self, StateEvent};
use crate::inspector::Inspector;
use crate::path::{DocPath, Mutation};
use crate::store::StateStore;
use crate::summary::render_summary;
use crate::transaction::TransactionManager;
use crate::workspace::{STATE_DIR, WorkspacePaths};
use crate::{Error, Result};

/// Why the cached document has to be rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTrigger {
    Missing,
    VersionMismatch { found: String },
    FingerprintChanged { cached: String, current: String },
    Stale { age_ms: u64 },
    Requested,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "no state document"),
            Self::VersionMismatch { found } => write!(f, "document version {found}"),
            Self::FingerprintChanged { .. } => write!(f, "configuration changed"),
            Self::Stale { age_ms } => write!(f, "document is {age_ms}ms old"),
            Self::Requested => write!(f, "requested"),
        }
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc>>;

/// Entry point for reading and mutating workspace state.
pub struct StateEngine<R: VcsReader> {
    paths: WorkspacePaths,
    vcs: R,
    raw: WorkspaceConfiguration,
    compiled: CompiledConfiguration,
    transactions: TransactionManager,
    clock: Clock,
}

impl StateEngine<Git2Reader> {
    /// Open the workspace at `root` backed by its git repository.
    pub fn open(root: &Path) -> Result<Self> {
        let paths = WorkspacePaths::new(root);
        let raw = paths.load_configuration()?;
        let vcs = Git2Reader::open(root)?.with_ignored_prefix(format!("{STATE_DIR}/"));
        Self::with_reader(root, raw, vcs)
    }
}

impl<R: VcsReader> StateEngine<R> {
    /// Build an engine over any repository reader.
    pub fn with_reader(root: &Path, raw: WorkspaceConfiguration, vcs: R) -> Result<Self> {
        let paths = WorkspacePaths::new(root);
        let compiled = compile(&raw)?;
        let limits = &compiled.limits;

        let kind = LockKind::parse(&limits.lock_strategy).unwrap_or_else(|| {
            tracing::warn!(strategy = %limits.lock_strategy, "Unknown lock strategy, using auto");
            LockKind::Auto
        });
        let state_file = paths.state_file();
        let lock = LockManager::for_target(&state_file, kind)
            .with_poll_interval(Duration::from_millis(limits.lock_poll_ms));
        let store = StateStore::new(state_file).with_max_bytes(limits.max_state_bytes);
        let transactions =
            TransactionManager::new(store, lock, Duration::from_millis(limits.lock_timeout_ms));

        Ok(Self {
            paths,
            vcs,
            raw,
            compiled,
            transactions,
            clock: Box::new(Utc::now),
        })
    }

    /// Replace the wall clock used for refresh timestamps and staleness.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn raw_configuration(&self) -> &WorkspaceConfiguration {
        &self.raw
    }

    pub fn configuration(&self) -> &CompiledConfiguration {
        &self.compiled
    }

    pub fn vcs(&self) -> &R {
        &self.vcs
    }

    pub fn store(&self) -> &StateStore {
        self.transactions.store()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // ---- cache ------------------------------------------------------------

    /// The trigger that would force a rebuild right now, if any.
    ///
    /// A corrupt document is an error, not a trigger.
    pub fn staleness(&self) -> Result<Option<RefreshTrigger>> {
        let document = match self.store().read() {
            Ok(Some(document)) => document,
            Ok(None) => return Ok(Some(RefreshTrigger::Missing)),
            Err(Error::VersionMismatch { found, .. }) => {
                return Ok(Some(RefreshTrigger::VersionMismatch { found }));
            }
            Err(e) => return Err(e),
        };

        let current = self.raw.fingerprint();
        if document.metadata.config_fingerprint != current {
            return Ok(Some(RefreshTrigger::FingerprintChanged {
                cached: document.metadata.config_fingerprint,
                current: current.to_string(),
            }));
        }

        let age = self.now() - document.metadata.last_refresh;
        let age_ms = u64::try_from(age.num_milliseconds()).unwrap_or(0);
        if age_ms > self.compiled.limits.cache_max_age_ms {
            return Ok(Some(RefreshTrigger::Stale { age_ms }));
        }
        Ok(None)
    }

    /// Rebuild the document if any trigger fires; returns the trigger.
    pub fn ensure_fresh(&mut self) -> Result<Option<RefreshTrigger>> {
        let trigger = self.staleness()?;
        if let Some(trigger) = &trigger {
            self.rebuild(trigger)?;
        }
        Ok(trigger)
    }

    /// Full rebuild: every candidate branch is re-inspected.
    pub fn refresh_full(&mut self) -> Result<()> {
        self.rebuild(&RefreshTrigger::Requested)
    }

    /// Re-read runtime facts only, keeping branch records.
    ///
    /// Falls back to a full rebuild when there is no usable document or the
    /// configuration changed.
    pub fn refresh_partial(&mut self) -> Result<()> {
        match self.staleness()? {
            Some(
                trigger @ (RefreshTrigger::Missing
                | RefreshTrigger::VersionMismatch { .. }
                | RefreshTrigger::FingerprintChanged { .. }),
            ) => self.rebuild(&trigger),
            _ => {
                let now = self.now();
                let inspector = Inspector::new(&self.vcs, &self.compiled)?;
                self.transactions.run("refresh-partial", |tx| {
                    let document = tx.document_mut()?;
                    inspector.refresh_runtime(&mut document.repository_snapshot, now)?;
                    document.metadata.last_refresh = now;
                    document.recompute_decisions();
                    Ok(())
                })
            }
        }
    }

    fn rebuild(&mut self, trigger: &RefreshTrigger) -> Result<()> {
        tracing::info!(trigger = %trigger, "Rebuilding state document");
        let now = self.now();
        let (raw, compiled) = (&self.raw, &self.compiled);
        let inspector = Inspector::new(&self.vcs, compiled)?;
        self.transactions.run("refresh-full", |tx| {
            let snapshot = inspector.inspect(now)?;
            let mut document = StateDocument::build(raw.clone(), compiled.clone(), snapshot, now);
            if let Some(previous) = tx.document()? {
                document = document.inherit(previous);
            }
            tx.replace(document)
        })
    }

    // ---- reads ------------------------------------------------------------

    /// The persisted document, read without locking.
    pub fn document(&self) -> Result<StateDocument> {
        self.store().read()?.ok_or_else(|| Error::MissingDocument {
            path: self.store().path().to_path_buf(),
        })
    }

    /// Value at `path`, `None` when nothing is there.
    pub fn get(&self, path: &str) -> Result<Option<Value>> {
        let path = DocPath::parse(path)?;
        let value = serde_json::to_value(self.document()?)?;
        Ok(path.get(&value).cloned())
    }

    pub fn get_or(&self, path: &str, default: Value) -> Result<Value> {
        Ok(self.get(path)?.unwrap_or(default))
    }

    /// Whole document as pretty JSON.
    pub fn dump(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document()?)?)
    }

    /// Human-readable overview.
    pub fn summary(&self) -> Result<String> {
        Ok(render_summary(&self.document()?))
    }

    // ---- writes -----------------------------------------------------------

    /// Apply `mutations` in one transaction, returning each result.
    pub fn apply(&mut self, name: &str, mutations: &[Mutation]) -> Result<Vec<Value>> {
        self.ensure_fresh()?;
        self.transactions.run(name, |tx| {
            let document = tx.document_mut()?;
            apply_mutations(document, mutations)
        })
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        self.apply("set", &[Mutation::set(path, value)])?;
        Ok(())
    }

    /// Set several paths atomically: all land or none do.
    pub fn set_batch<P: Into<String>>(&mut self, entries: impl IntoIterator<Item = (P, Value)>) -> Result<()> {
        let mutations: Vec<Mutation> = entries
            .into_iter()
            .map(|(path, value)| Mutation::set(path, value))
            .collect();
        self.apply("set-batch", &mutations)?;
        Ok(())
    }

    /// Add `by` to the number at `path`; returns the new value.
    pub fn increment(&mut self, path: &str, by: i64) -> Result<i64> {
        let results = self.apply(
            "increment",
            &[Mutation::Increment {
                path: path.to_string(),
                by,
            }],
        )?;
        Ok(results.first().and_then(Value::as_i64).unwrap_or_default())
    }

    /// Append to the array at `path`, dropping the oldest entries beyond
    /// `max`; returns the new length.
    pub fn append_bounded(&mut self, path: &str, value: Value, max: usize) -> Result<usize> {
        let results = self.apply(
            "append",
            &[Mutation::Append {
                path: path.to_string(),
                value,
                max,
            }],
        )?;
        Ok(results
            .first()
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_default())
    }

    /// Remove the value at `path`, returning what was there.
    pub fn remove(&mut self, path: &str) -> Result<Option<Value>> {
        let results = self.apply(
            "remove",
            &[Mutation::Remove {
                path: path.to_string(),
            }],
        )?;
        Ok(results.into_iter().next().filter(|v| !v.is_null()))
    }

    /// Record a semantic event in one transaction.
    pub fn report_event(&mut self, event: &StateEvent) -> Result<()> {
        self.ensure_fresh()?;
        let now = self.now();
        self.transactions.run(event.name(), |tx| {
            let document = tx.document_mut()?;
            let mutations = events::translate(event, document, now)?;
            apply_mutations(document, &mutations)?;
            Ok(())
        })?;
        tracing::info!(event = event.name(), "Recorded event");
        Ok(())
    }

    // ---- drift ------------------------------------------------------------

    pub fn detect_drift(&self) -> Result<DriftReport> {
        drift::detect(&self.document()?, &self.vcs)
    }

    /// Detect drift and handle it according to `mode`.
    pub fn repair_drift(&mut self, mode: RepairMode, confirm: &mut dyn Confirm) -> Result<RepairOutcome> {
        let report = self.detect_drift()?;
        let apply = match mode {
            _ if report.is_clean() => false,
            RepairMode::ReportOnly => false,
            RepairMode::Interactive => confirm.confirm(&report),
            RepairMode::Auto => true,
        };

        if apply {
            let now = self.now();
            let inspector = Inspector::new(&self.vcs, &self.compiled)?;
            self.transactions.run("drift-repair", |tx| {
                let document = tx.document_mut()?;
                let snapshot = &mut document.repository_snapshot;
                inspector.refresh_runtime(snapshot, now)?;
                let full = inspector.inspect(now)?;
                snapshot.branches = full.branches;
                snapshot.main_branch_exists = full.main_branch_exists;
                document.metadata.last_refresh = now;
                document.recompute_decisions();
                Ok(())
            })?;
            tracing::info!(items = report.items.len(), "Repaired state drift");
        }

        Ok(RepairOutcome {
            mode,
            report,
            applied: apply,
        })
    }

    /// Fail-closed check of the cached document against the repository.
    pub fn validate_against_truth(&self) -> Result<()> {
        drift::validate_against_truth(&self.document()?, &self.vcs)
    }
}

/// Apply path mutations to a typed document.
///
/// Mutations run against the JSON form; the result must still deserialize
/// as a document and every `set` path must survive the round trip, so
/// writes to unknown fields are rejected. Configuration sections are derived from
/// `config.toml` and cannot be written. Touching the snapshot recomputes
/// decisions.
fn apply_mutations(document: &mut StateDocument, mutations: &[Mutation]) -> Result<Vec<Value>> {
    let mut value = serde_json::to_value(&*document)?;
    let mut results = Vec::with_capacity(mutations.len());
    let mut snapshot_touched = false;

    for mutation in mutations {
        let path = DocPath::parse(mutation.path())?;
        match path.section() {
            Some("rawConfiguration" | "compiledConfiguration") => {
                return Err(Error::InvalidMutation {
                    message: format!("'{path}' is derived from {}", crate::workspace::CONFIG_FILE),
                });
            }
            Some("repositorySnapshot") => snapshot_touched = true,
            _ => {}
        }
        results.push(mutation.apply(&mut value)?);
    }

    let mut updated: StateDocument =
        serde_json::from_value(value).map_err(|e| Error::InvalidMutation {
            message: format!("document no longer fits its schema: {e}"),
        })?;

    let written = serde_json::to_value(&updated)?;
    for mutation in mutations {
        if let Mutation::Set { path, .. } = mutation
            && DocPath::parse(path)?.get(&written).is_none()
        {
            return Err(Error::InvalidMutation {
                message: format!("'{path}' is not a field of the state document"),
            });
        }
    }

    if snapshot_touched {
        updated.recompute_decisions();
    }
    *document = updated;
    Ok(results)
}

impl<R: VcsReader> fmt::Debug for StateEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEngine")
            .field("root", &self.paths.root())
            .field("workspace", &self.compiled.workspace.name)
            .field("transactions", &self.transactions)
            .finish_non_exhaustive()
    }
}
