//! Rotation decisions and their per-location and per-run aggregation.
//!
//! Nothing here performs I/O; consumers decide how to log, print, alert on or
//! act upon a report.

use crate::artifact::{Artifact, SourceKind, join_path};
use crate::scheme::{Frequency, TimezoneMode};
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Why an artifact received its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DecisionReason {
    /// Kept as a representative (or bucket member) of this class.
    Retained(Frequency),
    /// Removed from consideration by an include/exclude pattern.
    ExcludedByFilter,
    /// The location has a policy, but this name carries no timestamp under its
    /// timestamp rule, so no class can place it. Never removed.
    ///
    /// Locations with no policy at all get no decisions; they are listed in
    /// [`RotationReport::unresolved`] instead.
    UnmatchedNoPolicy,
    /// Not selected by any class.
    OverLimit,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Retained(frequency) => frequency.name(),
            DecisionReason::ExcludedByFilter => "excluded-by-filter",
            DecisionReason::UnmatchedNoPolicy => "unmatched-no-policy",
            DecisionReason::OverLimit => "over-limit",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DecisionReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Decision for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationDecision {
    pub location: String,
    pub name: String,
    /// Absent only for candidates whose name yielded no timestamp.
    pub timestamp: Option<NaiveDateTime>,
    pub size_bytes: u64,
    pub is_dir: bool,
    pub source_kind: SourceKind,
    pub keep: bool,
    pub reason: DecisionReason,
}

impl RotationDecision {
    pub fn retained(artifact: Artifact, frequency: Frequency) -> Self {
        Self::from_artifact(artifact, true, DecisionReason::Retained(frequency))
    }

    pub fn over_limit(artifact: Artifact) -> Self {
        Self::from_artifact(artifact, false, DecisionReason::OverLimit)
    }

    pub fn excluded(artifact: Artifact) -> Self {
        Self::from_artifact(artifact, false, DecisionReason::ExcludedByFilter)
    }

    pub fn unmatched(
        location: String,
        name: String,
        size_bytes: u64,
        is_dir: bool,
        source_kind: SourceKind,
    ) -> Self {
        Self {
            location,
            name,
            timestamp: None,
            size_bytes,
            is_dir,
            source_kind,
            keep: false,
            reason: DecisionReason::UnmatchedNoPolicy,
        }
    }

    fn from_artifact(artifact: Artifact, keep: bool, reason: DecisionReason) -> Self {
        Self {
            location: artifact.location,
            name: artifact.name,
            timestamp: Some(artifact.timestamp),
            size_bytes: artifact.size_bytes,
            is_dir: artifact.is_dir,
            source_kind: artifact.source_kind,
            keep,
            reason,
        }
    }

    /// Only over-limit artifacts are handed to the deletion collaborator.
    /// Filtered and unmatched entries are left alone.
    pub fn is_removal(&self) -> bool {
        self.reason == DecisionReason::OverLimit
    }

    pub fn path(&self) -> String {
        join_path(&self.location, &self.name)
    }
}

/// A candidate dropped because its timestamp could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionFailure {
    pub location: String,
    pub name: String,
    pub reason: String,
}

/// A location that could not be resolved to a policy outside traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedLocation {
    pub location: String,
    pub candidates: usize,
}

/// One removal handed to a deletion collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Removal {
    pub location: String,
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
    pub source_kind: SourceKind,
}

impl Removal {
    pub fn path(&self) -> String {
        join_path(&self.location, &self.name)
    }
}

/// Result of rotating one location.
#[derive(Debug, Clone, Serialize)]
pub struct LocationReport {
    pub location: String,
    /// Pattern of the binding that was applied.
    pub policy: String,
    pub scheme: String,
    pub timezone: TimezoneMode,
    /// Chronological, oldest first; unmatched entries lead.
    pub decisions: Vec<RotationDecision>,
    pub failures: Vec<ExtractionFailure>,
    /// Most recent timestamp seen at this location, kept or not.
    pub most_recent: Option<NaiveDateTime>,
}

impl LocationReport {
    pub fn kept(&self) -> impl Iterator<Item = &RotationDecision> {
        self.decisions.iter().filter(|decision| decision.keep)
    }

    pub fn removals(&self) -> impl Iterator<Item = &RotationDecision> {
        self.decisions.iter().filter(|decision| decision.is_removal())
    }

    pub fn count_reason(&self, reason: DecisionReason) -> usize {
        self.decisions
            .iter()
            .filter(|decision| decision.reason == reason)
            .count()
    }

    /// Kept artifacts per frequency class.
    pub fn kept_by_frequency(&self) -> BTreeMap<Frequency, usize> {
        let mut counts = BTreeMap::new();
        for decision in &self.decisions {
            if let DecisionReason::Retained(frequency) = decision.reason {
                *counts.entry(frequency).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn total_bytes(&self) -> u64 {
        self.decisions.iter().map(|decision| decision.size_bytes).sum()
    }

    pub fn removable_bytes(&self) -> u64 {
        self.removals().map(|decision| decision.size_bytes).sum()
    }
}

impl fmt::Display for LocationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (policy {})", self.location, self.policy)?;
        writeln!(f, "  {}", self.scheme)?;
        writeln!(f, "  {:<48} {:<20} {:>12}  {}", "NAME", "TIMESTAMP", "SIZE", "DECISION")?;
        for decision in &self.decisions {
            let timestamp = decision
                .timestamp
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            let verdict = if decision.keep {
                "keep"
            } else if decision.is_removal() {
                "remove"
            } else {
                "skip"
            };
            writeln!(
                f,
                "  {:<48} {:<20} {:>12}  {} ({})",
                decision.name,
                timestamp,
                format_bytes(decision.size_bytes),
                verdict,
                decision.reason
            )?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  {:<48} {:<20} {:>12}  error ({})",
                failure.name, "-", "-", failure.reason
            )?;
        }
        Ok(())
    }
}

/// Result of one rotation run across all locations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RotationReport {
    pub locations: Vec<LocationReport>,
    pub unresolved: Vec<UnresolvedLocation>,
}

impl RotationReport {
    /// Removals in location order, oldest first within a location.
    pub fn removals(&self) -> Vec<Removal> {
        self.locations
            .iter()
            .flat_map(LocationReport::removals)
            .map(|decision| Removal {
                location: decision.location.clone(),
                name: decision.name.clone(),
                is_dir: decision.is_dir,
                size_bytes: decision.size_bytes,
                source_kind: decision.source_kind,
            })
            .collect()
    }

    pub fn location(&self, location: &str) -> Option<&LocationReport> {
        self.locations.iter().find(|report| report.location == location)
    }

    /// Most recent timestamp per location, for staleness checks.
    pub fn most_recent(&self) -> impl Iterator<Item = (&str, TimezoneMode, Option<NaiveDateTime>)> {
        self.locations
            .iter()
            .map(|report| (report.location.as_str(), report.timezone, report.most_recent))
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            locations: self.locations.len(),
            unresolved: self.unresolved.len(),
            ..ReportSummary::default()
        };
        for report in &self.locations {
            summary.decisions += report.decisions.len();
            summary.kept += report.kept().count();
            summary.removed += report.removals().count();
            summary.excluded += report.count_reason(DecisionReason::ExcludedByFilter);
            summary.unmatched += report.count_reason(DecisionReason::UnmatchedNoPolicy);
            summary.failures += report.failures.len();
            summary.total_bytes += report.total_bytes();
            summary.removable_bytes += report.removable_bytes();
            for (frequency, count) in report.kept_by_frequency() {
                *summary.kept_by_frequency.entry(frequency).or_insert(0) += count;
            }
        }
        summary
    }
}

/// Read-only run totals for logging and alerting collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub locations: usize,
    pub unresolved: usize,
    pub decisions: usize,
    pub kept: usize,
    pub removed: usize,
    pub excluded: usize,
    pub unmatched: usize,
    pub failures: usize,
    pub total_bytes: u64,
    pub removable_bytes: u64,
    pub kept_by_frequency: BTreeMap<Frequency, usize>,
}

impl ReportSummary {
    /// Artifacts left in place after removals.
    pub fn remaining(&self) -> usize {
        self.decisions - self.removed
    }

    pub fn log(&self) {
        info!(
            locations = self.locations,
            unresolved = self.unresolved,
            artifacts = self.decisions,
            kept = self.kept,
            removed = self.removed,
            remaining = self.remaining(),
            excluded = self.excluded,
            unmatched = self.unmatched,
            failures = self.failures,
            total = %format_bytes(self.total_bytes),
            removable = %format_bytes(self.removable_bytes),
            "Rotation summary"
        );
    }
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} locations, {} artifacts: {} kept, {} to remove, {} excluded, {} unmatched, {} failures ({} of {} removable)",
            self.locations,
            self.decisions,
            self.kept,
            self.removed,
            self.excluded,
            self.unmatched,
            self.failures,
            format_bytes(self.removable_bytes),
            format_bytes(self.total_bytes)
        )
    }
}

/// Human-readable byte count with two decimals (`1.50 KB`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
