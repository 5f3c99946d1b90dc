//! Timestamp extraction from artifact names or modification times.

use crate::scheme::TimezoneMode;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};
use thiserror::Error;

/// Pattern used when a policy does not configure its own.
///
/// Matches `YYYY MM DD [HH MM [SS]]` with at most one non-digit separator
/// between components, e.g. `backup-20240101-0130` or `2024-01-01_01-30-00`.
pub const DEFAULT_TIMESTAMP_PATTERN: &str = r"
    (?P<year>\d{4}) \D?
    (?P<month>\d{2}) \D?
    (?P<day>\d{2}) \D?
    (?:
        (?P<hour>\d{2}) \D?
        (?P<minute>\d{2}) \D?
        (?P<second>\d{2})?
    )?
";

static DEFAULT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    compile(DEFAULT_TIMESTAMP_PATTERN).expect("default timestamp pattern must compile")
});

const REQUIRED_GROUPS: [&str; 3] = ["year", "month", "day"];
const UNIXTIME_GROUP: &str = "unixtime";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Invalid timestamp pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Timestamp pattern '{pattern}' has no '{group}' capture group")]
    MissingCaptureGroup {
        pattern: String,
        group: &'static str,
    },

    #[error("No timestamp found in '{name}'")]
    NoTimestampFound { name: String },

    #[error("Malformed timestamp in '{name}': {reason}")]
    MalformedTimestamp { name: String, reason: String },
}

/// How a scheme derives a point in time for an artifact.
#[derive(Debug, Clone)]
pub enum TimestampRule {
    /// Parse the name with named capture groups.
    NamedGroups(Regex),
    /// Use the supplied modification time. The pattern only decides whether
    /// a name is a backup at all.
    ModificationTime(Regex),
}

impl Default for TimestampRule {
    fn default() -> Self {
        TimestampRule::NamedGroups(DEFAULT_PATTERN.clone())
    }
}

impl TimestampRule {
    /// Build a rule from configured values.
    ///
    /// Patterns are compiled in verbose mode, so whitespace inside them is
    /// ignored. In named-group mode the pattern must capture `year`, `month`
    /// and `day`, or a single `unixtime` group.
    pub fn from_config(pattern: Option<&str>, filestat: bool) -> Result<Self, TimestampError> {
        let regex = match pattern {
            Some(pattern) => compile(pattern)?,
            None => DEFAULT_PATTERN.clone(),
        };

        if filestat {
            return Ok(TimestampRule::ModificationTime(regex));
        }

        let has_group = |group: &str| regex.capture_names().flatten().any(|name| name == group);
        if !has_group(UNIXTIME_GROUP) {
            if let Some(missing) = REQUIRED_GROUPS.into_iter().find(|group| !has_group(group)) {
                return Err(TimestampError::MissingCaptureGroup {
                    pattern: regex.as_str().to_string(),
                    group: missing,
                });
            }
        }

        Ok(TimestampRule::NamedGroups(regex))
    }

    pub fn pattern(&self) -> &Regex {
        match self {
            TimestampRule::NamedGroups(regex) | TimestampRule::ModificationTime(regex) => regex,
        }
    }

    pub fn uses_modification_time(&self) -> bool {
        matches!(self, TimestampRule::ModificationTime(_))
    }

    /// Whether `name` looks like a backup under this rule.
    pub fn matches(&self, name: &str) -> bool {
        self.pattern().is_match(name)
    }

    /// Extract the wall-clock timestamp of `name` in `timezone`.
    ///
    /// Calendar components parsed from a name are taken as already being in
    /// the location's timezone; epoch values and modification times are
    /// converted into it.
    pub fn extract(
        &self,
        name: &str,
        modified: Option<DateTime<Utc>>,
        timezone: TimezoneMode,
    ) -> Result<NaiveDateTime, TimestampError> {
        match self {
            TimestampRule::NamedGroups(regex) => {
                let captures = regex
                    .captures(name)
                    .ok_or_else(|| TimestampError::NoTimestampFound {
                        name: name.to_string(),
                    })?;
                if let Some(unixtime) = captures.name(UNIXTIME_GROUP) {
                    let instant = parse_unixtime(name, unixtime.as_str())?;
                    return Ok(timezone.normalize(instant));
                }
                parse_calendar(name, &captures)
            }
            TimestampRule::ModificationTime(regex) => {
                if !regex.is_match(name) {
                    return Err(TimestampError::NoTimestampFound {
                        name: name.to_string(),
                    });
                }
                let modified = modified.ok_or_else(|| TimestampError::MalformedTimestamp {
                    name: name.to_string(),
                    reason: "modification time unavailable".to_string(),
                })?;
                Ok(timezone.normalize(modified))
            }
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, TimestampError> {
    RegexBuilder::new(pattern)
        .ignore_whitespace(true)
        .build()
        .map_err(|e| TimestampError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn parse_unixtime(name: &str, value: &str) -> Result<DateTime<Utc>, TimestampError> {
    let malformed = |reason: String| TimestampError::MalformedTimestamp {
        name: name.to_string(),
        reason,
    };
    let value: i64 = value
        .parse()
        .map_err(|e| malformed(format!("unixtime '{value}': {e}")))?;

    // Values too large to be seconds are milliseconds.
    match DateTime::from_timestamp(value, 0) {
        Some(instant) if instant.year() <= 9999 => Ok(instant),
        _ => DateTime::from_timestamp_millis(value)
            .filter(|instant| instant.year() <= 9999)
            .ok_or_else(|| malformed(format!("unixtime {value} is out of range"))),
    }
}

fn parse_calendar(name: &str, captures: &Captures<'_>) -> Result<NaiveDateTime, TimestampError> {
    let component = |group: &str, default: Option<u32>| -> Result<u32, TimestampError> {
        match captures.name(group) {
            Some(value) => value
                .as_str()
                .parse()
                .map_err(|e| TimestampError::MalformedTimestamp {
                    name: name.to_string(),
                    reason: format!("{group} '{}': {e}", value.as_str()),
                }),
            None => default.ok_or_else(|| TimestampError::NoTimestampFound {
                name: name.to_string(),
            }),
        }
    };

    let year = component("year", None)?;
    let month = component("month", None)?;
    let day = component("day", None)?;
    let hour = component("hour", Some(0))?;
    let minute = component("minute", Some(0))?;
    let second = component("second", Some(0))?;

    let malformed = |reason: String| TimestampError::MalformedTimestamp {
        name: name.to_string(),
        reason,
    };
    let year = i32::try_from(year).map_err(|_| malformed(format!("year {year} out of range")))?;
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| malformed(format!("invalid date {year:04}-{month:02}-{day:02}")))?;
    date.and_hms_opt(hour, minute, second)
        .ok_or_else(|| malformed(format!("invalid time {hour:02}:{minute:02}:{second:02}")))
}
