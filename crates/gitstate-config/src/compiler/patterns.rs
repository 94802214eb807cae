//! Branch naming patterns
//!
//! Pattern forms, from most to least specific:
//!
//! - literal: `acme/main-integration`
//! - prefixed: `acme/feature/` (anything below the prefix)
//! - glob: `acme/feature/*`, `acme/**/wip`, `acme/v?`
//! - regex: `regex:^acme/release/v\d+$`

use regex::Regex;

use crate::compiled::{BranchPattern, PatternForm, Specificity};
use crate::{Error, Result};

const REGEX_PREFIX: &str = "regex:";

/// Compile one resolved pattern for `branch_type`.
pub fn compile_pattern(branch_type: &str, source: &str) -> Result<BranchPattern> {
    let source = source.trim();
    if source.is_empty() {
        return Err(Error::InvalidPattern {
            branch_type: branch_type.to_string(),
            message: "pattern is empty".to_string(),
        });
    }

    let (form, regex, literal_chars) = if let Some(expr) = source.strip_prefix(REGEX_PREFIX) {
        (PatternForm::Regex, format!("^(?:{expr})$"), 0)
    } else if source.contains(['*', '?']) {
        let (regex, literal_chars) = glob_to_regex(source);
        (PatternForm::Glob, regex, literal_chars)
    } else if source.ends_with('/') {
        (
            PatternForm::Prefixed,
            format!("^{}.+$", regex::escape(source)),
            source.chars().count(),
        )
    } else {
        (
            PatternForm::Literal,
            format!("^{}$", regex::escape(source)),
            source.chars().count(),
        )
    };

    Regex::new(&regex).map_err(|e| Error::InvalidPattern {
        branch_type: branch_type.to_string(),
        message: e.to_string(),
    })?;

    Ok(BranchPattern {
        branch_type: branch_type.to_string(),
        source: source.to_string(),
        form,
        regex,
        specificity: Specificity {
            form,
            literal_chars,
        },
    })
}

/// Translate a glob into an anchored regex, counting literal characters.
///
/// `**` crosses `/`, `*` and `?` stay within one path segment.
fn glob_to_regex(glob: &str) -> (String, usize) {
    let mut regex = String::from("^");
    let mut literal_chars = 0;
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                regex.push_str(".*");
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            other => {
                literal_chars += 1;
                regex.push_str(&regex::escape(&other.to_string()));
            }
        }
    }
    regex.push('$');
    (regex, literal_chars)
}
