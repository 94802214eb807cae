//! Refresh and read commands

use colored::Colorize;

use super::{Engine, parse_value};
use crate::error::{CliError, Result};

pub fn run_refresh(engine: &mut Engine, full: bool) -> Result<()> {
    if full {
        engine.refresh_full()?;
        println!("{} Rebuilt state", "OK".green().bold());
    } else {
        engine.refresh_partial()?;
        println!("{} Refreshed state", "OK".green().bold());
    }
    Ok(())
}

/// Print the value at `path`; absent paths fail unless a default is given.
pub fn run_get(engine: &mut Engine, path: &str, default: Option<&str>) -> Result<()> {
    engine.ensure_fresh()?;
    let value = match default {
        Some(default) => engine.get_or(path, parse_value(default))?,
        None => engine
            .get(path)?
            .ok_or_else(|| CliError::user(format!("no value at '{path}'")))?,
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub fn run_dump(engine: &mut Engine) -> Result<()> {
    engine.ensure_fresh()?;
    println!("{}", engine.dump()?);
    Ok(())
}

pub fn run_summary(engine: &mut Engine) -> Result<()> {
    if let Some(trigger) = engine.ensure_fresh()? {
        tracing::debug!(%trigger, "State rebuilt before summary");
    }
    print!("{}", engine.summary()?);
    Ok(())
}
