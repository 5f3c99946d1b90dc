//! Frequency classes, timezone handling and the retention scheme itself.

use crate::count::RetentionCount;
use crate::filter::FilterStage;
use crate::timestamp::TimestampRule;
use chrono::{DateTime, Datelike, Days, Duration, Local, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar granularity of a retention bucket.
///
/// Variants are declared in precedence order: finer classes run first and
/// consume the artifacts they bucket before coarser classes see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// All classes in precedence order.
    pub const ALL: [Frequency; 6] = [
        Frequency::Minutely,
        Frequency::Hourly,
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Yearly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Frequency::Minutely => "minutely",
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }

    /// Nominal length of one bucket, used by relaxed grouping.
    pub fn nominal_span(&self) -> Duration {
        match self {
            Frequency::Minutely => Duration::minutes(1),
            Frequency::Hourly => Duration::hours(1),
            Frequency::Daily => Duration::days(1),
            Frequency::Weekly => Duration::weeks(1),
            Frequency::Monthly => Duration::days(30),
            Frequency::Yearly => Duration::days(365),
        }
    }

    /// Start of the calendar-aligned bucket containing `timestamp`.
    ///
    /// Weeks start on Monday (ISO 8601) and are cut at month boundaries, so a
    /// week spanning two months is two buckets. Every bucket therefore lies
    /// inside one bucket of each coarser class.
    pub fn bucket_start(&self, timestamp: NaiveDateTime) -> NaiveDateTime {
        let date = timestamp.date();
        let midnight = |date: chrono::NaiveDate| date.and_time(NaiveTime::MIN);
        match self {
            Frequency::Minutely => {
                midnight(date)
                    + Duration::hours(i64::from(timestamp.hour()))
                    + Duration::minutes(i64::from(timestamp.minute()))
            }
            Frequency::Hourly => midnight(date) + Duration::hours(i64::from(timestamp.hour())),
            Frequency::Daily => midnight(date),
            Frequency::Weekly => {
                let monday = date - Days::new(u64::from(date.weekday().num_days_from_monday()));
                let first_of_month = date - Days::new(u64::from(date.day0()));
                midnight(monday.max(first_of_month))
            }
            Frequency::Monthly => midnight(date - Days::new(u64::from(date.day0()))),
            Frequency::Yearly => midnight(date - Days::new(u64::from(date.ordinal0()))),
        }
    }

    /// Relaxed-mode join threshold: `ratio` times the nominal span.
    pub fn relaxed_threshold(&self, ratio: f64) -> Duration {
        let millis = self.nominal_span().num_milliseconds() as f64 * ratio;
        Duration::milliseconds(millis as i64)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|frequency| frequency.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown frequency '{s}'"))
    }
}

/// Timezone in which a location's timestamps are compared and bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimezoneMode {
    #[default]
    Utc,
    Local,
}

impl TimezoneMode {
    /// Wall-clock representation of `instant` in this timezone.
    pub fn normalize(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            TimezoneMode::Utc => instant.naive_utc(),
            TimezoneMode::Local => instant.with_timezone(&Local).naive_local(),
        }
    }
}

impl fmt::Display for TimezoneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimezoneMode::Utc => f.write_str("utc"),
            TimezoneMode::Local => f.write_str("local"),
        }
    }
}

/// One retention policy.
///
/// Schemes are immutable once built; the builder methods consume and return
/// the scheme so a fully configured value can be shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RetentionScheme {
    counts: [RetentionCount; 6],
    relaxed: bool,
    relaxed_span_ratio: f64,
    prefer_recent: bool,
    timestamp_rule: TimestampRule,
    filter: FilterStage,
    timezone: TimezoneMode,
}

impl Default for RetentionScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl RetentionScheme {
    /// A scheme that retains nothing, using the default timestamp pattern.
    pub fn new() -> Self {
        Self {
            counts: [RetentionCount::Limited(0); 6],
            relaxed: false,
            relaxed_span_ratio: 1.0,
            prefer_recent: false,
            timestamp_rule: TimestampRule::default(),
            filter: FilterStage::default(),
            timezone: TimezoneMode::default(),
        }
    }

    pub fn with_count(mut self, frequency: Frequency, count: RetentionCount) -> Self {
        self.counts[frequency.index()] = count;
        self
    }

    pub fn with_relaxed(mut self, relaxed: bool) -> Self {
        self.relaxed = relaxed;
        self
    }

    pub fn with_relaxed_span_ratio(mut self, ratio: f64) -> Self {
        self.relaxed_span_ratio = ratio;
        self
    }

    pub fn with_prefer_recent(mut self, prefer_recent: bool) -> Self {
        self.prefer_recent = prefer_recent;
        self
    }

    pub fn with_timestamp_rule(mut self, rule: TimestampRule) -> Self {
        self.timestamp_rule = rule;
        self
    }

    pub fn with_filter(mut self, filter: FilterStage) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_timezone(mut self, timezone: TimezoneMode) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn count(&self, frequency: Frequency) -> RetentionCount {
        self.counts[frequency.index()]
    }

    pub fn relaxed(&self) -> bool {
        self.relaxed
    }

    pub fn relaxed_span_ratio(&self) -> f64 {
        self.relaxed_span_ratio
    }

    pub fn prefer_recent(&self) -> bool {
        self.prefer_recent
    }

    pub fn timestamp_rule(&self) -> &TimestampRule {
        &self.timestamp_rule
    }

    pub fn filter(&self) -> &FilterStage {
        &self.filter
    }

    pub fn timezone(&self) -> TimezoneMode {
        self.timezone
    }

    /// Classes with a non-zero or unbounded count, in precedence order.
    pub fn active_frequencies(&self) -> impl Iterator<Item = (Frequency, RetentionCount)> + '_ {
        Frequency::ALL
            .into_iter()
            .map(|frequency| (frequency, self.count(frequency)))
            .filter(|(_, count)| count.is_enabled())
    }

    /// True when every class has a zero count.
    pub fn retains_nothing(&self) -> bool {
        self.active_frequencies().next().is_none()
    }

    /// Compact one-line description for logs and reports.
    pub fn describe(&self) -> String {
        let counts = Frequency::ALL
            .iter()
            .map(|frequency| format!("{}={}", frequency, self.count(*frequency)))
            .collect::<Vec<_>>()
            .join(" ");
        let mode = if self.relaxed {
            format!("relaxed x{}", self.relaxed_span_ratio)
        } else {
            "strict".to_string()
        };
        let preference = if self.prefer_recent { "newest" } else { "oldest" };
        format!("{counts} ({mode}, {preference} per bucket, {})", self.timezone)
    }
}
