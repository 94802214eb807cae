//! Lifecycle matrix: retention and deletion timing per branch type

use super::Settings;
use crate::compiled::{DeletionTiming, DeletionTrigger, LifecycleRule};
use crate::{Result, units};

pub(super) fn compile_lifecycle(settings: &Settings, branch_type: &str) -> Result<LifecycleRule> {
    let delete_key = format!("lifecycle.{branch_type}.delete_after_merge");
    let retention_key = format!("lifecycle.{branch_type}.retention_days");

    let delete_after_merge = settings.bool_or(&delete_key, false)?;
    let retention_days = match settings.get(&retention_key) {
        Some(value) => units::parse_retention(&retention_key, value)?,
        None => None,
    };
    Ok(lifecycle_rule(delete_after_merge, retention_days))
}

/// Classify a retention setting into timing, trigger and rationale.
pub fn lifecycle_rule(delete_after_merge: bool, retention_days: Option<u32>) -> LifecycleRule {
    let trigger = if delete_after_merge {
        DeletionTrigger::SinceMerge
    } else {
        DeletionTrigger::SinceLastActivity
    };
    let anchor = match trigger {
        DeletionTrigger::SinceMerge => "merge",
        DeletionTrigger::SinceLastActivity => "last activity",
    };

    let (timing, rationale) = match retention_days {
        None => (
            DeletionTiming::Never,
            "unbounded retention: kept until removed by hand".to_string(),
        ),
        Some(0) => (
            DeletionTiming::Immediate,
            format!("zero-day retention: deleted as soon as eligible after {anchor}"),
        ),
        Some(days) => (
            DeletionTiming::Scheduled,
            format!("deleted {days} day(s) after {anchor}"),
        ),
    };

    LifecycleRule {
        delete_after_merge,
        retention_days,
        timing,
        trigger,
        rationale,
    }
}
