//! Raw configuration -> [`CompiledConfiguration`]
//!
//! Compilation is pure: no I/O, no clock, no environment. All collections in
//! the output are ordered, so identical input serializes identically.

mod lifecycle;
mod patterns;
mod policy;
mod resolve;
mod workflow;

use std::collections::BTreeMap;

use crate::compiled::{CompiledConfiguration, WorkspaceInfo};
use crate::raw::WorkspaceConfiguration;
use crate::{Result, units};

pub use lifecycle::lifecycle_rule;
pub use patterns::compile_pattern;

const DEFAULT_WORKSPACE: &str = "workspace";
const DEFAULT_MAIN_BRANCH: &str = "main";
const DEFAULT_BRANCH_TYPE: &str = "feature";
pub(crate) const DEFAULT_SESSION_TEMPLATE: &str = "${workspace.namespace}/session/{date}-{token}";

/// Resolved configuration values with typed accessors.
pub(crate) struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    fn new(raw: &WorkspaceConfiguration) -> Result<Self> {
        let mut values = raw.values().clone();

        // Defaults that other values may reference
        let name = values
            .get("workspace.name")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());
        values.entry("workspace.name".into()).or_insert_with(|| name.clone());
        values.entry("workspace.namespace".into()).or_insert(name);
        values
            .entry("workspace.main_branch".into())
            .or_insert_with(|| DEFAULT_MAIN_BRANCH.to_string());
        values
            .entry("session.name_template".into())
            .or_insert_with(|| DEFAULT_SESSION_TEMPLATE.to_string());

        Ok(Self {
            values: resolve::resolve_all(&values)?,
        })
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.trim())
    }

    pub(crate) fn str_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    pub(crate) fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        self.get(key)
            .map_or(Ok(default), |v| units::parse_bool(key, v))
    }

    pub(crate) fn u32_or(&self, key: &str, default: u32) -> Result<u32> {
        self.get(key).map_or(Ok(default), |v| units::parse_u32(key, v))
    }

    pub(crate) fn duration_ms_or(&self, key: &str, default: &str) -> Result<u64> {
        units::parse_duration_ms(key, self.get(key).unwrap_or(default))
    }

    pub(crate) fn size_or(&self, key: &str, default: &str) -> Result<u64> {
        units::parse_size(key, self.get(key).unwrap_or(default))
    }

    pub(crate) fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(units::parse_list).unwrap_or_default()
    }

    /// `<name>` for every key shaped `<prefix>.<name>.<suffix>`.
    pub(crate) fn names_between(&self, prefix: &str, suffix: &str) -> Vec<String> {
        let head = format!("{prefix}.");
        let tail = format!(".{suffix}");
        let mut names: Vec<String> = self
            .values
            .keys()
            .filter_map(|k| {
                k.strip_prefix(&head)
                    .and_then(|rest| rest.strip_suffix(&tail))
                    .filter(|n| !n.is_empty() && !n.contains('.'))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Direct children of `prefix.` as `(name, value)`.
    pub(crate) fn children(&self, prefix: &str) -> Vec<(String, String)> {
        let head = format!("{prefix}.");
        self.values
            .iter()
            .filter_map(|(k, v)| {
                let name = k.strip_prefix(&head)?;
                (!name.contains('.')).then(|| (name.to_string(), v.trim().to_string()))
            })
            .collect()
    }
}

/// Compile raw configuration into derived rule tables.
pub fn compile(raw: &WorkspaceConfiguration) -> Result<CompiledConfiguration> {
    let settings = Settings::new(raw)?;

    let workspace = WorkspaceInfo {
        name: settings.str_or("workspace.name", DEFAULT_WORKSPACE),
        namespace: settings
            .str_or("workspace.namespace", DEFAULT_WORKSPACE)
            .trim_end_matches('/')
            .to_string(),
        main_branch: settings.str_or("workspace.main_branch", DEFAULT_MAIN_BRANCH),
        default_branch_type: settings.str_or("workspace.default_branch_type", DEFAULT_BRANCH_TYPE),
    };

    let mut branch_patterns = Vec::new();
    for branch_type in settings.names_between("branch", "pattern") {
        let key = format!("branch.{branch_type}.pattern");
        let source = settings.get(&key).unwrap_or_default();
        branch_patterns.push(compile_pattern(&branch_type, source)?);
    }

    let protected = policy::protected_registry(&settings, &workspace);

    let mut lifecycle_types = settings.names_between("branch", "pattern");
    lifecycle_types.extend(settings.names_between("lifecycle", "retention_days"));
    lifecycle_types.extend(settings.names_between("lifecycle", "delete_after_merge"));
    lifecycle_types.sort();
    lifecycle_types.dedup();

    let mut lifecycle = BTreeMap::new();
    for branch_type in lifecycle_types {
        let rule = lifecycle::compile_lifecycle(&settings, &branch_type)?;
        lifecycle.insert(branch_type, rule);
    }

    let compiled = CompiledConfiguration {
        workflow: workflow::compile_workflow(&settings)?,
        validation: policy::validation_policy(&settings)?,
        knowledge: policy::knowledge_categories(&settings),
        team: policy::team_policy(&settings)?,
        session: policy::session_policy(&settings)?,
        limits: policy::limits(&settings)?,
        errors: policy::error_policy(&settings)?,
        workspace,
        patterns: branch_patterns,
        protected,
        lifecycle,
    };

    tracing::debug!(
        workspace = %compiled.workspace.name,
        patterns = compiled.patterns.len(),
        protected = compiled.protected.len(),
        "Compiled workspace configuration"
    );
    Ok(compiled)
}
