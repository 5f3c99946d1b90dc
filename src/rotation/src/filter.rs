//! Include/exclude glob filtering of candidate paths.

use glob::{MatchOptions, Pattern};
use thiserror::Error;

/// `*` crosses path separators and leading dots are not special: patterns
/// apply to the whole `location/name` string.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid filter pattern '{pattern}': {message}")]
pub struct FilterError {
    pub pattern: String,
    pub message: String,
}

/// An ordered list of compiled glob patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Compile `patterns`, skipping blank entries.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, FilterError> {
        let patterns = patterns
            .iter()
            .map(|pattern| pattern.as_ref().trim())
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| FilterError {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// First pattern matching `path`.
    pub fn first_match(&self, path: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pattern| pattern.matches_with(path, MATCH_OPTIONS))
            .map(Pattern::as_str)
    }
}

/// Outcome of filtering one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Eligible,
    /// Matched an exclude pattern.
    Excluded { pattern: String },
    /// Include patterns are configured and none matched.
    NotIncluded,
}

impl FilterVerdict {
    pub fn is_eligible(&self) -> bool {
        matches!(self, FilterVerdict::Eligible)
    }
}

/// Exclude-then-include filter applied before any retention decision.
#[derive(Debug, Clone, Default)]
pub struct FilterStage {
    include: PatternSet,
    exclude: PatternSet,
}

impl FilterStage {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, FilterError> {
        Ok(Self {
            include: PatternSet::new(include)?,
            exclude: PatternSet::new(exclude)?,
        })
    }

    pub fn include(&self) -> &PatternSet {
        &self.include
    }

    pub fn exclude(&self) -> &PatternSet {
        &self.exclude
    }

    /// Evaluate a full `location/name` path.
    ///
    /// Exclusion wins over inclusion; include patterns only narrow the set.
    pub fn evaluate(&self, path: &str) -> FilterVerdict {
        if let Some(pattern) = self.exclude.first_match(path) {
            return FilterVerdict::Excluded {
                pattern: pattern.to_string(),
            };
        }
        if !self.include.is_empty() && self.include.first_match(path).is_none() {
            return FilterVerdict::NotIncluded;
        }
        FilterVerdict::Eligible
    }
}
