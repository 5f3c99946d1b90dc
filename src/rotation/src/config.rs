//! Serializable policy configuration and its validation into bindings.

use crate::count::{CountExpressionError, RetentionCount};
use crate::filter::{FilterError, FilterStage};
use crate::policy::{PolicyBinding, RotationError};
use crate::scheme::{Frequency, RetentionScheme, TimezoneMode};
use crate::timestamp::{TimestampError, TimestampRule};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A configured count: a plain integer, or an expression string such as
/// `"24*7"` or `"always"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountSpec {
    Number(u64),
    Expression(String),
}

impl Default for CountSpec {
    fn default() -> Self {
        CountSpec::Number(0)
    }
}

impl CountSpec {
    pub fn always() -> Self {
        CountSpec::Expression("always".to_string())
    }

    pub fn evaluate(&self) -> Result<RetentionCount, CountExpressionError> {
        match self {
            CountSpec::Number(value) => usize::try_from(*value)
                .map(RetentionCount::Limited)
                .map_err(|_| CountExpressionError::Overflow(value.to_string())),
            CountSpec::Expression(expression) => RetentionCount::parse(expression),
        }
    }
}

impl From<u64> for CountSpec {
    fn from(value: u64) -> Self {
        CountSpec::Number(value)
    }
}

impl From<&str> for CountSpec {
    fn from(value: &str) -> Self {
        CountSpec::Expression(value.to_string())
    }
}

impl fmt::Display for CountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountSpec::Number(value) => write!(f, "{value}"),
            CountSpec::Expression(expression) => f.write_str(expression),
        }
    }
}

/// One `[[policies]]` entry.
///
/// Unknown keys are rejected so a misspelled count never silently reads as
/// zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Location pattern; a glob when a traversal root is configured.
    pub pattern: String,

    #[serde(default)]
    pub minutely: CountSpec,
    #[serde(default)]
    pub hourly: CountSpec,
    #[serde(default)]
    pub daily: CountSpec,
    #[serde(default)]
    pub weekly: CountSpec,
    #[serde(default)]
    pub monthly: CountSpec,
    #[serde(default)]
    pub yearly: CountSpec,

    /// Group by proximity instead of calendar boundaries.
    #[serde(default)]
    pub relaxed: bool,

    /// Multiple of a frequency's nominal span that still joins a relaxed slot.
    #[serde(default = "default_relaxed_span_ratio")]
    pub relaxed_span_ratio: f64,

    /// Keep the newest member of each bucket instead of the oldest.
    #[serde(default)]
    pub prefer_recent: bool,

    /// Regex with named groups; the built-in pattern when absent.
    #[serde(default)]
    pub timestamp_pattern: Option<String>,

    /// Take timestamps from modification times.
    #[serde(default)]
    pub filestat: bool,

    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub timezone: TimezoneMode,
}

fn default_relaxed_span_ratio() -> f64 {
    1.0
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            minutely: CountSpec::default(),
            hourly: CountSpec::default(),
            daily: CountSpec::default(),
            weekly: CountSpec::default(),
            monthly: CountSpec::default(),
            yearly: CountSpec::default(),
            relaxed: false,
            relaxed_span_ratio: default_relaxed_span_ratio(),
            prefer_recent: false,
            timestamp_pattern: None,
            filestat: false,
            include: Vec::new(),
            exclude: Vec::new(),
            timezone: TimezoneMode::default(),
        }
    }
}

impl PolicyConfig {
    pub fn count_spec(&self, frequency: Frequency) -> &CountSpec {
        match frequency {
            Frequency::Minutely => &self.minutely,
            Frequency::Hourly => &self.hourly,
            Frequency::Daily => &self.daily,
            Frequency::Weekly => &self.weekly,
            Frequency::Monthly => &self.monthly,
            Frequency::Yearly => &self.yearly,
        }
    }

    /// Validate this entry into a scheme.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A count does not evaluate to a non-negative integer or `always`
    /// - The timestamp pattern is invalid or lacks required groups
    /// - An include/exclude glob is invalid
    /// - The relaxed span ratio is not a positive number
    /// - Every count is zero, so the scheme would retain nothing
    pub fn to_scheme(&self) -> Result<RetentionScheme, SchemeError> {
        let mut scheme = RetentionScheme::new();
        for frequency in Frequency::ALL {
            let count = self.count_spec(frequency).evaluate().map_err(|source| {
                SchemeError::InvalidCountExpression {
                    policy: self.pattern.clone(),
                    frequency,
                    source,
                }
            })?;
            scheme = scheme.with_count(frequency, count);
        }

        if !(self.relaxed_span_ratio.is_finite() && self.relaxed_span_ratio > 0.0) {
            return Err(SchemeError::InvalidRelaxedRatio {
                policy: self.pattern.clone(),
                ratio: self.relaxed_span_ratio,
            });
        }

        let rule = TimestampRule::from_config(self.timestamp_pattern.as_deref(), self.filestat)
            .map_err(|source| SchemeError::InvalidTimestampRule {
                policy: self.pattern.clone(),
                source,
            })?;
        let filter = FilterStage::new(&self.include, &self.exclude).map_err(|source| {
            SchemeError::InvalidFilter {
                policy: self.pattern.clone(),
                source,
            }
        })?;

        if scheme.retains_nothing() {
            return Err(SchemeError::EmptyScheme {
                policy: self.pattern.clone(),
            });
        }

        Ok(scheme
            .with_relaxed(self.relaxed)
            .with_relaxed_span_ratio(self.relaxed_span_ratio)
            .with_prefer_recent(self.prefer_recent)
            .with_timestamp_rule(rule)
            .with_filter(filter)
            .with_timezone(self.timezone))
    }
}

#[derive(Error, Debug)]
pub enum SchemeError {
    #[error("Policy {index} has an empty pattern")]
    EmptyPattern { index: usize },

    #[error("Invalid {frequency} count for policy '{policy}': {source}")]
    InvalidCountExpression {
        policy: String,
        frequency: Frequency,
        #[source]
        source: CountExpressionError,
    },

    #[error("Invalid timestamp rule for policy '{policy}': {source}")]
    InvalidTimestampRule {
        policy: String,
        #[source]
        source: TimestampError,
    },

    #[error("Invalid filter for policy '{policy}': {source}")]
    InvalidFilter {
        policy: String,
        #[source]
        source: FilterError,
    },

    #[error("Invalid relaxed span ratio {ratio} for policy '{policy}': must be positive")]
    InvalidRelaxedRatio { policy: String, ratio: f64 },

    #[error("Refusing empty rotation scheme for policy '{policy}': every count is zero, all backups would be deleted")]
    EmptyScheme { policy: String },

    #[error(transparent)]
    Policy(#[from] RotationError),
}

/// Build bindings from ordered policy entries, failing on the first bad one.
pub fn build_bindings(policies: &[PolicyConfig]) -> Result<Vec<PolicyBinding>, SchemeError> {
    policies
        .iter()
        .enumerate()
        .map(|(index, policy)| {
            if policy.pattern.trim().is_empty() {
                return Err(SchemeError::EmptyPattern { index });
            }
            let scheme = policy.to_scheme()?;
            Ok(PolicyBinding::new(&policy.pattern, scheme)?)
        })
        .collect()
}
