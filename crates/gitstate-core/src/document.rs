//! The persisted state document

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gitstate_config::{CompiledConfiguration, WorkspaceConfiguration};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::decision::{DecisionSet, evaluate};
use crate::events::StateEvent;
use crate::snapshot::RepositorySnapshot;

/// Pinned document format version; any other value forces a full rebuild
pub const STATE_VERSION: u32 = 1;

/// Metadata of the state document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub last_refresh: DateTime<Utc>,
    pub config_fingerprint: String,
    pub workspace_identity: String,
    #[serde(default)]
    pub last_operation: Option<OperationRecord>,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Free-form values owned by the calling tooling
    #[serde(default)]
    pub custom: BTreeMap<String, Value>,
}

/// The last committed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub id: Uuid,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

/// A reported event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub event: StateEvent,
}

/// Metadata, configuration, snapshot and decisions: the sole persisted artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    pub metadata: Metadata,
    pub raw_configuration: WorkspaceConfiguration,
    pub compiled_configuration: CompiledConfiguration,
    pub repository_snapshot: RepositorySnapshot,
    pub decision_set: DecisionSet,
}

impl StateDocument {
    /// Assemble a fresh document, evaluating decisions for the snapshot.
    pub fn build(
        raw: WorkspaceConfiguration,
        compiled: CompiledConfiguration,
        snapshot: RepositorySnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        let decision_set = evaluate(&compiled, &snapshot);
        Self {
            metadata: Metadata {
                version: STATE_VERSION,
                generated_at: now,
                last_refresh: now,
                config_fingerprint: raw.fingerprint().to_string(),
                workspace_identity: compiled.workspace.name.clone(),
                last_operation: None,
                counters: BTreeMap::new(),
                history: Vec::new(),
                custom: BTreeMap::new(),
            },
            raw_configuration: raw,
            compiled_configuration: compiled,
            repository_snapshot: snapshot,
            decision_set,
        }
    }

    /// Carry counters, history, custom values and generation time over
    /// from `previous`. History keeps the newest entries that fit the
    /// current `limits.history_size`.
    pub fn inherit(mut self, previous: &StateDocument) -> Self {
        self.metadata.generated_at = previous
            .metadata
            .generated_at
            .min(self.metadata.last_refresh);
        self.metadata.counters = previous.metadata.counters.clone();
        let limit = self.compiled_configuration.limits.history_size;
        let history = &previous.metadata.history;
        self.metadata.history = history[history.len().saturating_sub(limit)..].to_vec();
        self.metadata.custom = previous.metadata.custom.clone();
        self.metadata.last_operation = previous.metadata.last_operation.clone();
        self
    }

    pub fn recompute_decisions(&mut self) {
        self.decision_set = evaluate(&self.compiled_configuration, &self.repository_snapshot);
    }

    /// Structural problems, empty when the document is well formed.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let meta = &self.metadata;
        if meta.version != STATE_VERSION {
            problems.push(format!(
                "metadata.version is {}, expected {STATE_VERSION}",
                meta.version
            ));
        }
        if meta.workspace_identity.trim().is_empty() {
            problems.push("metadata.workspaceIdentity is empty".to_string());
        }
        if meta.config_fingerprint != self.raw_configuration.fingerprint() {
            problems.push("metadata.configFingerprint does not match rawConfiguration".to_string());
        }
        if meta.generated_at > meta.last_refresh {
            problems.push("metadata.generatedAt is after metadata.lastRefresh".to_string());
        }
        if self.compiled_configuration.workspace.main_branch.trim().is_empty() {
            problems.push("compiledConfiguration.workspace.mainBranch is empty".to_string());
        }
        let history_limit = self.compiled_configuration.limits.history_size;
        if meta.history.len() > history_limit {
            problems.push(format!(
                "metadata.history holds {} entries, limit is {history_limit}",
                meta.history.len()
            ));
        }
        problems
    }

    /// Problems that block a commit: structure plus decisions that do not
    /// follow from the snapshot.
    pub fn commit_problems(&self) -> Vec<String> {
        let mut problems = self.problems();
        if self.decision_set != evaluate(&self.compiled_configuration, &self.repository_snapshot) {
            problems.push("decisionSet does not follow from the snapshot".to_string());
        }
        problems
    }
}
