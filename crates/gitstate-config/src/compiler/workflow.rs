//! Workflow rule tables with their prompt templates

use std::collections::BTreeMap;

use super::Settings;
use crate::compiled::{
    CleanupRule, CreationRule, MergeRule, MergeTargetSpec, SyncPolicy, SyncRule, WorkflowMode,
    WorkflowRule, WorkflowTables,
};
use crate::{Error, Result};

fn parse_mode(key: &str, value: &str) -> Result<WorkflowMode> {
    match value.to_ascii_lowercase().as_str() {
        "auto" | "always" | "yes" => Ok(WorkflowMode::Auto),
        "ask" | "prompt" | "ask-user" => Ok(WorkflowMode::Ask),
        "never" | "off" | "no" => Ok(WorkflowMode::Never),
        _ => Err(Error::invalid(key, value, "auto, ask or never")),
    }
}

fn parse_sync(key: &str, value: &str) -> Result<SyncPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "always" | "auto" => Ok(SyncPolicy::Always),
        "conditional" | "if-clean" => Ok(SyncPolicy::Conditional),
        "ask" | "prompt" | "ask-user" => Ok(SyncPolicy::Ask),
        _ => Err(Error::invalid(key, value, "always, conditional or ask")),
    }
}

fn rule(settings: &Settings, section: &str, mode: &str, prompt: &str) -> Result<WorkflowRule> {
    let mode_key = format!("workflow.{section}.mode");
    Ok(WorkflowRule {
        mode: parse_mode(&mode_key, &settings.str_or(&mode_key, mode))?,
        prompt: settings.str_or(&format!("workflow.{section}.prompt"), prompt),
    })
}

pub(super) fn compile_workflow(settings: &Settings) -> Result<WorkflowTables> {
    let branch_creation = CreationRule {
        rule: rule(
            settings,
            "branch_creation",
            "auto",
            "Create a new branch for this work?",
        )?,
        require_clean: settings.bool_or("workflow.branch_creation.require_clean", true)?,
    };

    let targets: BTreeMap<String, MergeTargetSpec> = settings
        .children("workflow.merge.target")
        .into_iter()
        .map(|(branch_type, value)| (branch_type, MergeTargetSpec::parse(&value)))
        .collect();
    let merge = MergeRule {
        rule: rule(
            settings,
            "merge",
            "ask",
            "Merge {branch} into {target} using {strategy}?",
        )?,
        default_target: MergeTargetSpec::parse(
            &settings.str_or("workflow.merge.default_target", "parent"),
        ),
        targets,
        feature_strategy: settings.str_or("workflow.merge.feature_strategy", "merge"),
    };

    let fetch_key = "workflow.sync.fetch_on_start";
    let push_key = "workflow.sync.push_on_stop";
    let sync = SyncRule {
        fetch_on_start: parse_sync(fetch_key, &settings.str_or(fetch_key, "conditional"))?,
        push_on_stop: parse_sync(push_key, &settings.str_or(push_key, "ask"))?,
        fetch_prompt: settings.str_or(
            "workflow.sync.fetch_prompt",
            "Fetch remote changes before starting?",
        ),
        push_prompt: settings.str_or("workflow.sync.push_prompt", "Push {branch} to its upstream?"),
    };

    let cleanup = CleanupRule {
        rule: rule(
            settings,
            "cleanup",
            "ask",
            "Delete {count} branch(es) scheduled for cleanup?",
        )?,
        stale_after_days: settings.u32_or("workflow.cleanup.stale_after_days", 30)?,
    };

    Ok(WorkflowTables {
        branch_creation,
        merge,
        sync,
        cleanup,
    })
}
