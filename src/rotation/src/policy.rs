//! Policy resolution: mapping a discovered location to its retention scheme.

use crate::artifact::normalize_location;
use crate::scheme::RetentionScheme;
use glob::{MatchOptions, Pattern};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

const WILDCARDS: [char; 3] = ['*', '?', '['];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RotationError {
    #[error("No policy matches location '{location}'")]
    NoPolicyMatch { location: String },

    #[error("Invalid policy pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Policy pattern '{0}' is configured more than once")]
    DuplicatePattern(String),

    #[error("No policies configured")]
    EmptyPolicySet,
}

/// A location pattern bound to the scheme that rotates matching locations.
#[derive(Debug, Clone)]
pub struct PolicyBinding {
    pattern: String,
    matcher: Pattern,
    descendants: Pattern,
    scheme: Arc<RetentionScheme>,
}

impl PolicyBinding {
    pub fn new(pattern: &str, scheme: RetentionScheme) -> Result<Self, RotationError> {
        let pattern = normalize_location(pattern.trim()).to_string();
        let compile = |source: &str| {
            Pattern::new(source).map_err(|e| RotationError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })
        };
        let matcher = compile(&pattern)?;
        let descendants = compile(&format!("{}/*", pattern.trim_end_matches('/')))?;

        Ok(Self {
            pattern,
            matcher,
            descendants,
            scheme: Arc::new(scheme),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn scheme(&self) -> &RetentionScheme {
        &self.scheme
    }

    /// Length of the pattern before its first wildcard.
    pub fn literal_prefix_len(&self) -> usize {
        self.pattern.find(WILDCARDS).unwrap_or(self.pattern.len())
    }

    fn literal_chars(&self) -> usize {
        self.pattern.chars().filter(|c| !WILDCARDS.contains(c)).count()
    }

    /// Glob match of the location itself or anything below it.
    fn covers(&self, location: &str) -> bool {
        self.matcher.matches_with(location, MATCH_OPTIONS)
            || self.descendants.matches_with(location, MATCH_OPTIONS)
    }
}

/// Resolves locations to bindings.
///
/// Without a traversal root a location must equal a configured pattern
/// literally. With a root every binding whose glob covers the location is a
/// match and the most specific one wins:
/// 1. Longest literal prefix before the first wildcard
/// 2. Most literal characters overall
/// 3. Earliest declaration
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    bindings: Vec<PolicyBinding>,
    root: Option<String>,
}

impl PolicyResolver {
    /// # Errors
    ///
    /// Returns an error if no bindings are given or a pattern repeats.
    pub fn new(bindings: Vec<PolicyBinding>, root: Option<String>) -> Result<Self, RotationError> {
        if bindings.is_empty() {
            return Err(RotationError::EmptyPolicySet);
        }

        let mut seen = HashSet::new();
        for binding in &bindings {
            if !seen.insert(binding.pattern()) {
                return Err(RotationError::DuplicatePattern(binding.pattern().to_string()));
            }
        }

        let root = root
            .map(|root| normalize_location(root.trim()).to_string())
            .filter(|root| !root.is_empty());

        Ok(Self { bindings, root })
    }

    pub fn bindings(&self) -> &[PolicyBinding] {
        &self.bindings
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn is_traversal(&self) -> bool {
        self.root.is_some()
    }

    /// Configured locations listed directly when not traversing.
    pub fn literal_locations(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(PolicyBinding::pattern)
    }

    /// Resolve `location` to exactly one binding.
    pub fn resolve(&self, location: &str) -> Result<&PolicyBinding, RotationError> {
        let location = normalize_location(location);

        let resolved = if self.is_traversal() {
            self.bindings
                .iter()
                .enumerate()
                .filter(|(_, binding)| binding.covers(location))
                .max_by_key(|(index, binding)| {
                    (
                        binding.literal_prefix_len(),
                        binding.literal_chars(),
                        Reverse(*index),
                    )
                })
                .map(|(_, binding)| binding)
        } else {
            self.bindings
                .iter()
                .find(|binding| binding.pattern() == location)
        };

        match resolved {
            Some(binding) => {
                debug!(location = %location, pattern = %binding.pattern(), "Resolved policy");
                Ok(binding)
            }
            None => Err(RotationError::NoPolicyMatch {
                location: location.to_string(),
            }),
        }
    }
}
