//! Path write commands

use colored::Colorize;

use super::{Engine, parse_value};
use crate::error::{CliError, Result};

pub fn run_set(engine: &mut Engine, path: &str, value: &str) -> Result<()> {
    engine.set(path, parse_value(value))?;
    println!("{} {}", "Set".green(), path.cyan());
    Ok(())
}

/// Split `path=json` entries and write them in one transaction.
pub fn run_set_many(engine: &mut Engine, entries: &[String]) -> Result<()> {
    let pairs = entries
        .iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(path, value)| (path.to_string(), parse_value(value)))
                .ok_or_else(|| CliError::user(format!("expected path=value, got '{entry}'")))
        })
        .collect::<Result<Vec<_>>>()?;

    let count = pairs.len();
    engine.set_batch(pairs)?;
    println!("{} {} values", "Set".green(), count);
    Ok(())
}

pub fn run_incr(engine: &mut Engine, path: &str, by: i64) -> Result<()> {
    let value = engine.increment(path, by)?;
    println!("{value}");
    Ok(())
}

pub fn run_append(engine: &mut Engine, path: &str, value: &str, max: usize) -> Result<()> {
    let len = engine.append_bounded(path, parse_value(value), max)?;
    println!("{len}");
    Ok(())
}

pub fn run_remove(engine: &mut Engine, path: &str) -> Result<()> {
    match engine.remove(path)? {
        Some(old) => println!("{}", serde_json::to_string_pretty(&old)?),
        None => println!("{} nothing at {}", "Note:".yellow(), path.cyan()),
    }
    Ok(())
}
