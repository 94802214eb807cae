//! Parsing of scalar configuration values
//!
//! All parsers take the originating key so errors point at the offending
//! configuration entry.

use crate::{Error, Result};

pub fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(Error::invalid(key, value, "a boolean")),
    }
}

pub fn parse_u32(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid(key, value, "a non-negative integer"))
}

/// Split a comma-separated list, dropping empty entries.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a size such as `512`, `64KB`, `10MB` or `1G` into bytes.
///
/// Units are binary multiples; a bare number is bytes.
pub fn parse_size(key: &str, value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| Error::invalid(key, value, "a size like 10MB"))?;
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        _ => return Err(Error::invalid(key, value, "a size unit of B, KB, MB or GB")),
    };
    amount
        .checked_mul(multiplier)
        .ok_or_else(|| Error::invalid(key, value, "a size that fits in 64 bits"))
}

/// Parse a duration such as `250ms`, `30s`, `5m`, `2h` or `7d` into
/// milliseconds. A bare number is seconds.
pub fn parse_duration_ms(key: &str, value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| Error::invalid(key, value, "a duration like 30s"))?;
    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "ms" => 1,
        "" | "s" | "sec" | "secs" => 1_000,
        "m" | "min" | "mins" => 60_000,
        "h" | "hr" | "hrs" => 3_600_000,
        "d" | "day" | "days" => 86_400_000,
        _ => return Err(Error::invalid(key, value, "a duration unit of ms, s, m, h or d")),
    };
    amount
        .checked_mul(multiplier)
        .ok_or_else(|| Error::invalid(key, value, "a duration that fits in 64 bits"))
}

/// Parse a retention window in days. `never`, `unbounded`, `infinite` and
/// negative numbers mean unbounded retention (`None`).
pub fn parse_retention(key: &str, value: &str) -> Result<Option<u32>> {
    let trimmed = value.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "never" | "unbounded" | "infinite" | "forever" => return Ok(None),
        _ => {}
    }
    let numeric = trimmed.strip_suffix('d').unwrap_or(trimmed);
    match numeric.parse::<i64>() {
        Ok(days) if days < 0 => Ok(None),
        Ok(days) => u32::try_from(days)
            .map(Some)
            .map_err(|_| Error::invalid(key, value, "a retention in days")),
        Err(_) => Err(Error::invalid(key, value, "a number of days or 'never'")),
    }
}
