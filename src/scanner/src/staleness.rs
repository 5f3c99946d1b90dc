//! Staleness check over a rotation report's most recent timestamps.

use chrono::{DateTime, NaiveDateTime, Utc};
use rotation::RotationReport;
use std::time::Duration;
use tracing::warn;

/// A location without a sufficiently recent backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleLocation {
    pub location: String,
    /// `None` when the location held no timestamped artifact at all.
    pub most_recent: Option<NaiveDateTime>,
    pub age: Option<chrono::Duration>,
}

/// Locations whose newest artifact is older than `threshold`, as of now.
pub fn stale_locations(report: &RotationReport, threshold: Duration) -> Vec<StaleLocation> {
    stale_locations_at(report, threshold, Utc::now())
}

/// Like [`stale_locations`] with an explicit reference instant. Each
/// location is compared in its own timezone.
pub fn stale_locations_at(
    report: &RotationReport,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Vec<StaleLocation> {
    let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);

    report
        .most_recent()
        .filter_map(|(location, timezone, most_recent)| {
            let age = most_recent.map(|ts| timezone.normalize(now) - ts);
            let stale = age.is_none_or(|age| age > threshold);
            if !stale {
                return None;
            }
            warn!(
                location = %location,
                most_recent = ?most_recent,
                "No recent backup found"
            );
            Some(StaleLocation {
                location: location.to_string(),
                most_recent,
                age,
            })
        })
        .collect()
}
