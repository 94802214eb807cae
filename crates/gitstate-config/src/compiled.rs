//! Derived rule tables produced by the compiler

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity and naming basics of the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub name: String,
    /// Branch namespace; workspace branches live under `<namespace>/`
    pub namespace: String,
    pub main_branch: String,
    pub default_branch_type: String,
}

impl WorkspaceInfo {
    /// `<namespace>/`
    pub fn namespace_prefix(&self) -> String {
        format!("{}/", self.namespace)
    }
}

/// Syntactic form of a branch pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternForm {
    Regex,
    Glob,
    Prefixed,
    Literal,
}

/// Ordering key for pattern matches; greater is more specific
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specificity {
    pub form: PatternForm,
    pub literal_chars: usize,
}

/// A compiled naming pattern for one branch type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPattern {
    pub branch_type: String,
    /// Pattern text after cross-reference resolution
    pub source: String,
    pub form: PatternForm,
    /// Anchored regular expression equivalent to `source`
    pub regex: String,
    pub specificity: Specificity,
}

/// When a branch type becomes eligible for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionTiming {
    Never,
    Immediate,
    Scheduled,
}

/// Which date the retention window counts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionTrigger {
    SinceMerge,
    SinceLastActivity,
}

/// Retention rule for one branch type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRule {
    pub delete_after_merge: bool,
    /// `None` means unbounded retention
    pub retention_days: Option<u32>,
    pub timing: DeletionTiming,
    pub trigger: DeletionTrigger,
    pub rationale: String,
}

/// How a workflow decision is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    Auto,
    Ask,
    Never,
}

/// Mode plus the prompt shown when the mode is [`WorkflowMode::Ask`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRule {
    pub mode: WorkflowMode,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationRule {
    #[serde(flatten)]
    pub rule: WorkflowRule,
    pub require_clean: bool,
}

/// Where a finished branch merges to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeTargetSpec {
    /// The recorded parent, else the main branch
    Parent,
    /// Merging is not offered
    None,
    Branch(String),
}

impl MergeTargetSpec {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "parent" => Self::Parent,
            "none" | "" => Self::None,
            branch => Self::Branch(branch.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRule {
    #[serde(flatten)]
    pub rule: WorkflowRule,
    pub default_target: MergeTargetSpec,
    /// Per branch-type overrides of `default_target`
    pub targets: BTreeMap<String, MergeTargetSpec>,
    /// Strategy for non-session branches
    pub feature_strategy: String,
}

/// Tri-state remote synchronization policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    Always,
    Conditional,
    Ask,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRule {
    pub fetch_on_start: SyncPolicy,
    pub push_on_stop: SyncPolicy,
    pub fetch_prompt: String,
    pub push_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRule {
    #[serde(flatten)]
    pub rule: WorkflowRule,
    pub stale_after_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTables {
    pub branch_creation: CreationRule,
    pub merge: MergeRule,
    pub sync: SyncRule,
    pub cleanup: CleanupRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Strict,
    Relaxed,
    Gradual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressionTrigger {
    Time,
    Usage,
}

/// How gradual validation tightens towards strict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradualProgression {
    pub trigger: ProgressionTrigger,
    /// Days (time trigger) or operations (usage trigger) until strict
    pub threshold: u32,
    /// Warn this many units before the switch
    pub warning_lead: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub mode: ValidationMode,
    pub progression: Option<GradualProgression>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPolicy {
    pub sync_enabled: bool,
    pub sync_interval_ms: u64,
    pub shared_branches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPolicy {
    pub enabled: bool,
    /// At most one active session branch
    pub single: bool,
    pub auto_create: bool,
    pub max_concurrent: usize,
    pub merge_strategy: String,
    /// Cross-references resolved; `{date}` and `{token}` remain
    pub name_template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub lock_timeout_ms: u64,
    pub lock_poll_ms: u64,
    pub lock_strategy: String,
    pub cache_max_age_ms: u64,
    pub query_timeout_ms: u64,
    pub history_size: usize,
    pub max_state_bytes: u64,
    pub branch_count_tolerance: usize,
}

/// How detected drift is handled by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairMode {
    ReportOnly,
    Interactive,
    Auto,
}

impl RepairMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "report" | "report-only" | "report_only" => Some(Self::ReportOnly),
            "interactive" | "ask" => Some(Self::Interactive),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPolicy {
    pub drift_repair: RepairMode,
    /// Block operations when pre-flight validation fails
    pub fail_closed: bool,
    pub retry_attempts: u32,
}

/// All derived structures; a pure function of the raw configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledConfiguration {
    pub workspace: WorkspaceInfo,
    /// Sorted by branch type
    pub patterns: Vec<BranchPattern>,
    /// Protected branch -> reason
    pub protected: BTreeMap<String, String>,
    pub lifecycle: BTreeMap<String, LifecycleRule>,
    pub workflow: WorkflowTables,
    pub validation: ValidationPolicy,
    /// Category -> keywords
    pub knowledge: BTreeMap<String, Vec<String>>,
    pub team: TeamPolicy,
    pub session: SessionPolicy,
    pub limits: Limits,
    pub errors: ErrorPolicy,
}

impl CompiledConfiguration {
    pub fn is_protected(&self, branch: &str) -> bool {
        self.protected.contains_key(branch)
    }

    pub fn lifecycle_for(&self, branch_type: &str) -> Option<&LifecycleRule> {
        self.lifecycle.get(branch_type)
    }
}
