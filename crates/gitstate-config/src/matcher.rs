//! Branch classification against compiled naming patterns

use regex::Regex;

use crate::compiled::{CompiledConfiguration, Specificity};
use crate::{Error, Result};

/// Classification of the declared main branch
pub const MAIN_CLASS: &str = "main";
/// Classification of branches outside the workspace namespace
pub const USER_CLASS: &str = "user";
/// Namespaced branch no pattern claims unambiguously
pub const UNKNOWN_CLASS: &str = "unknown";

struct CompiledPattern {
    branch_type: String,
    regex: Regex,
    specificity: Specificity,
}

/// Matches branch names to types, most specific pattern first.
pub struct BranchMatcher {
    main_branch: String,
    namespace_prefix: String,
    patterns: Vec<CompiledPattern>,
}

impl BranchMatcher {
    pub fn new(config: &CompiledConfiguration) -> Result<Self> {
        let mut patterns = Vec::with_capacity(config.patterns.len());
        for pattern in &config.patterns {
            let regex = Regex::new(&pattern.regex).map_err(|e| Error::InvalidPattern {
                branch_type: pattern.branch_type.clone(),
                message: e.to_string(),
            })?;
            patterns.push(CompiledPattern {
                branch_type: pattern.branch_type.clone(),
                regex,
                specificity: pattern.specificity,
            });
        }
        // Most specific first; type name keeps the order total
        patterns.sort_by(|a, b| {
            b.specificity
                .cmp(&a.specificity)
                .then_with(|| a.branch_type.cmp(&b.branch_type))
        });

        Ok(Self {
            main_branch: config.workspace.main_branch.clone(),
            namespace_prefix: config.workspace.namespace_prefix(),
            patterns,
        })
    }

    /// Classify a branch name.
    ///
    /// The main branch is `main`, anything outside the namespace is `user`.
    /// Inside the namespace the most specific matching pattern wins; when two
    /// different types tie at the top, or nothing matches, the result is
    /// `unknown`.
    pub fn classify(&self, branch: &str) -> String {
        if branch == self.main_branch {
            return MAIN_CLASS.to_string();
        }
        if !branch.starts_with(&self.namespace_prefix) {
            return USER_CLASS.to_string();
        }

        let mut matches = self.patterns.iter().filter(|p| p.regex.is_match(branch));
        let Some(best) = matches.next() else {
            return UNKNOWN_CLASS.to_string();
        };
        let tied = matches
            .take_while(|p| p.specificity == best.specificity)
            .any(|p| p.branch_type != best.branch_type);
        if tied {
            tracing::debug!(branch, "Ambiguous branch classification");
            return UNKNOWN_CLASS.to_string();
        }
        best.branch_type.clone()
    }

    /// Whether `branch` lives under the workspace namespace.
    pub fn is_namespaced(&self, branch: &str) -> bool {
        branch.starts_with(&self.namespace_prefix)
    }
}
