//! `${key}` cross-reference resolution

use std::collections::BTreeMap;

use crate::{Error, Result};

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Resolve every value in `values`, replacing `${other.key}` with the fully
/// resolved value of `other.key`.
pub fn resolve_all(values: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
    let mut resolved = BTreeMap::new();
    for key in values.keys() {
        let mut chain = Vec::new();
        let value = resolve_key(key, values, &mut resolved, &mut chain)?;
        resolved.insert(key.clone(), value);
    }
    Ok(resolved)
}

fn resolve_key(
    key: &str,
    values: &BTreeMap<String, String>,
    memo: &mut BTreeMap<String, String>,
    chain: &mut Vec<String>,
) -> Result<String> {
    if let Some(done) = memo.get(key) {
        return Ok(done.clone());
    }
    if chain.iter().any(|k| k == key) {
        chain.push(key.to_string());
        return Err(Error::CyclicReference {
            key: chain[0].clone(),
            chain: chain.join(" -> "),
        });
    }
    let Some(raw) = values.get(key) else {
        let referrer = chain.last().cloned().unwrap_or_default();
        return Err(Error::UnresolvedReference {
            key: referrer,
            reference: key.to_string(),
        });
    };

    chain.push(key.to_string());
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw.as_str();
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            // Unterminated reference is kept verbatim
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let reference = after[..end].trim();
        out.push_str(&resolve_key(reference, values, memo, chain)?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    chain.pop();

    memo.insert(key.to_string(), out.clone());
    Ok(out)
}
