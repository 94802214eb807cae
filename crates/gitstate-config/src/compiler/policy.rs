//! Protected registry, validation policy and auxiliary tables

use std::collections::BTreeMap;

use super::{DEFAULT_SESSION_TEMPLATE, Settings};
use crate::compiled::{
    ErrorPolicy, GradualProgression, Limits, ProgressionTrigger, RepairMode, SessionPolicy,
    TeamPolicy, ValidationMode, ValidationPolicy, WorkspaceInfo,
};
use crate::{Error, Result, units};

const USER_DECLARED: &str = "user-declared";
const NAMESPACE_DECLARED: &str = "namespace-declared";
const MAIN_BRANCH: &str = "main branch";

/// Protected branches: the main branch ∪ user-declared ∪ namespace-declared.
///
/// Namespace entries are relative to the workspace namespace.
pub(super) fn protected_registry(
    settings: &Settings,
    workspace: &WorkspaceInfo,
) -> BTreeMap<String, String> {
    let mut protected = BTreeMap::new();
    for branch in settings.list("protected.branches") {
        protected.insert(branch, USER_DECLARED.to_string());
    }
    for relative in settings.list("protected.namespace") {
        let branch = format!(
            "{}{}",
            workspace.namespace_prefix(),
            relative.trim_start_matches('/')
        );
        protected.entry(branch).or_insert_with(|| NAMESPACE_DECLARED.to_string());
    }
    protected.insert(workspace.main_branch.clone(), MAIN_BRANCH.to_string());
    protected
}

pub(super) fn validation_policy(settings: &Settings) -> Result<ValidationPolicy> {
    let key = "validation.mode";
    let mode = match settings.str_or(key, "relaxed").to_ascii_lowercase().as_str() {
        "strict" => ValidationMode::Strict,
        "relaxed" => ValidationMode::Relaxed,
        "gradual" => ValidationMode::Gradual,
        other => return Err(Error::invalid(key, other, "strict, relaxed or gradual")),
    };

    let progression = if mode == ValidationMode::Gradual {
        let trigger_key = "validation.gradual_trigger";
        let trigger = match settings.str_or(trigger_key, "time").to_ascii_lowercase().as_str() {
            "time" | "days" => ProgressionTrigger::Time,
            "usage" | "operations" => ProgressionTrigger::Usage,
            other => return Err(Error::invalid(trigger_key, other, "time or usage")),
        };
        Some(GradualProgression {
            trigger,
            threshold: settings.u32_or("validation.gradual_threshold", 14)?,
            warning_lead: settings.u32_or("validation.gradual_warning", 3)?,
        })
    } else {
        None
    };

    Ok(ValidationPolicy { mode, progression })
}

/// `knowledge.<category> = "kw1,kw2"` -> category -> lowercase keywords.
pub(super) fn knowledge_categories(settings: &Settings) -> BTreeMap<String, Vec<String>> {
    settings
        .children("knowledge")
        .into_iter()
        .map(|(category, keywords)| {
            let mut keywords: Vec<String> = units::parse_list(&keywords)
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect();
            keywords.sort();
            keywords.dedup();
            (category, keywords)
        })
        .collect()
}

pub(super) fn team_policy(settings: &Settings) -> Result<TeamPolicy> {
    Ok(TeamPolicy {
        sync_enabled: settings.bool_or("team.sync_enabled", false)?,
        sync_interval_ms: settings.duration_ms_or("team.sync_interval", "15m")?,
        shared_branches: settings.list("team.shared_branches"),
    })
}

pub(super) fn session_policy(settings: &Settings) -> Result<SessionPolicy> {
    let max_key = "session.max_concurrent";
    let max_concurrent = settings.u32_or(max_key, 3)?;
    Ok(SessionPolicy {
        enabled: settings.bool_or("session.enabled", true)?,
        single: settings.bool_or("session.single", true)?,
        auto_create: settings.bool_or("session.auto_create", false)?,
        max_concurrent: max_concurrent as usize,
        merge_strategy: settings.str_or("session.merge_strategy", "squash"),
        name_template: settings.str_or("session.name_template", DEFAULT_SESSION_TEMPLATE),
    })
}

pub(super) fn limits(settings: &Settings) -> Result<Limits> {
    let strategy_key = "limits.lock_strategy";
    let lock_strategy = settings.str_or(strategy_key, "auto").to_ascii_lowercase();
    if gitstate_fs::LockKind::parse(&lock_strategy).is_none() {
        return Err(Error::invalid(strategy_key, &lock_strategy, "auto, file or directory"));
    }

    Ok(Limits {
        lock_timeout_ms: settings.duration_ms_or("limits.lock_timeout", "30s")?,
        lock_poll_ms: settings.duration_ms_or("limits.lock_poll_interval", "100ms")?,
        lock_strategy,
        cache_max_age_ms: settings.duration_ms_or("limits.cache_max_age", "5m")?,
        query_timeout_ms: settings.duration_ms_or("limits.query_timeout", "30s")?,
        history_size: settings.u32_or("limits.history_size", 50)? as usize,
        max_state_bytes: settings.size_or("limits.max_state_size", "5MB")?,
        branch_count_tolerance: settings.u32_or("limits.branch_count_tolerance", 2)? as usize,
    })
}

pub(super) fn error_policy(settings: &Settings) -> Result<ErrorPolicy> {
    let key = "errors.drift_repair";
    let value = settings.str_or(key, "report");
    let drift_repair = RepairMode::parse(&value)
        .ok_or_else(|| Error::invalid(key, &value, "report, interactive or auto"))?;
    Ok(ErrorPolicy {
        drift_repair,
        fail_closed: settings.bool_or("errors.fail_closed", true)?,
        retry_attempts: settings.u32_or("errors.retry_attempts", 3)?,
    })
}
