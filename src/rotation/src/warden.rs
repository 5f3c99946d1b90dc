//! Run driver: groups candidates by location, resolves policies and rotates
//! every location independently.

use crate::artifact::{Artifact, Candidate, normalize_location};
use crate::engine::RotationEngine;
use crate::filter::FilterVerdict;
use crate::metrics::RotationMetrics;
use crate::policy::{PolicyBinding, PolicyResolver};
use crate::report::{
    DecisionReason, ExtractionFailure, LocationReport, RotationDecision, RotationReport,
    UnresolvedLocation,
};
use crate::timestamp::TimestampError;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a scanner should treat an entry it found.
#[derive(Debug, Clone, Copy)]
pub enum EntryClass<'a> {
    /// A backup under the given binding. Do not descend into it.
    Artifact(&'a PolicyBinding),
    /// The location has a policy but this name is not a backup.
    NotArtifact,
    /// No policy covers the location.
    Unresolved,
}

/// Entry point of the rotation core.
#[derive(Debug, Clone)]
pub struct Warden {
    resolver: PolicyResolver,
    metrics: RotationMetrics,
}

impl Warden {
    pub fn new(resolver: PolicyResolver) -> Self {
        Self {
            resolver,
            metrics: RotationMetrics::new(),
        }
    }

    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    pub fn metrics(&self) -> &RotationMetrics {
        &self.metrics
    }

    /// Classify an entry found at `location` during scanning.
    pub fn classify(&self, location: &str, name: &str) -> EntryClass<'_> {
        match self.resolver.resolve(location) {
            Ok(binding) if binding.scheme().timestamp_rule().matches(name) => {
                EntryClass::Artifact(binding)
            }
            Ok(_) => EntryClass::NotArtifact,
            Err(_) => EntryClass::Unresolved,
        }
    }

    /// Rotate every location represented in `candidates`.
    ///
    /// Locations are processed in parallel and reported in path order.
    pub fn rotate(&self, candidates: Vec<Candidate>) -> RotationReport {
        let start = Instant::now();

        let mut grouped: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
        for candidate in candidates {
            let location = normalize_location(&candidate.location).to_string();
            grouped.entry(location).or_default().push(candidate);
        }

        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();
        for (location, candidates) in grouped {
            match self.resolver.resolve(&location) {
                Ok(binding) => resolved.push((location, binding, candidates)),
                Err(e) if self.resolver.is_traversal() => {
                    debug!(location = %location, error = %e, "Skipping location without policy");
                }
                Err(e) => {
                    warn!(
                        location = %location,
                        candidates = candidates.len(),
                        error = %e,
                        "Location has no policy"
                    );
                    self.metrics.record_location_unresolved();
                    unresolved.push(UnresolvedLocation {
                        location,
                        candidates: candidates.len(),
                    });
                }
            }
        }

        let locations: Vec<LocationReport> = resolved
            .into_par_iter()
            .map(|(location, binding, candidates)| {
                self.rotate_location(location, binding, candidates)
            })
            .collect();

        self.metrics
            .record_duration_ms(start.elapsed().as_millis() as u64);

        RotationReport {
            locations,
            unresolved,
        }
    }

    /// Extract, filter and rotate one location's candidates under `binding`.
    pub fn rotate_location(
        &self,
        location: String,
        binding: &PolicyBinding,
        candidates: Vec<Candidate>,
    ) -> LocationReport {
        let scheme = binding.scheme();
        let rule = scheme.timestamp_rule();
        let timezone = scheme.timezone();

        let mut eligible = Vec::new();
        let mut skipped = Vec::new();
        let mut failures = Vec::new();
        let mut most_recent = None;

        for candidate in candidates {
            match rule.extract(&candidate.name, candidate.modified, timezone) {
                Ok(timestamp) => {
                    most_recent = most_recent.max(Some(timestamp));
                    let artifact = Artifact::from_candidate(candidate, timestamp);
                    match scheme.filter().evaluate(&artifact.path()) {
                        FilterVerdict::Eligible => eligible.push(artifact),
                        verdict => {
                            debug!(path = %artifact.path(), verdict = ?verdict, "Excluded by filter");
                            skipped.push(RotationDecision::excluded(artifact));
                        }
                    }
                }
                Err(TimestampError::NoTimestampFound { .. }) => {
                    debug!(location = %location, name = %candidate.name, "No timestamp in name");
                    skipped.push(RotationDecision::unmatched(
                        candidate.location,
                        candidate.name,
                        candidate.size_bytes,
                        candidate.is_dir,
                        candidate.source_kind,
                    ));
                }
                Err(e) => {
                    warn!(
                        location = %location,
                        name = %candidate.name,
                        error = %e,
                        "Dropping candidate"
                    );
                    failures.push(ExtractionFailure {
                        location: candidate.location,
                        name: candidate.name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut decisions = RotationEngine::new(scheme).rotate(eligible);
        decisions.extend(skipped);
        decisions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.name.cmp(&b.name))
        });

        let report = LocationReport {
            location,
            policy: binding.pattern().to_string(),
            scheme: scheme.describe(),
            timezone,
            decisions,
            failures,
            most_recent,
        };

        let kept = report.kept().count();
        let removed = report.removals().count();
        let excluded = report.count_reason(DecisionReason::ExcludedByFilter);
        self.metrics.record_location_rotated();
        self.metrics.record_artifacts_evaluated(report.decisions.len());
        self.metrics.record_artifacts_kept(kept);
        self.metrics.record_artifacts_removed(removed);
        self.metrics.record_artifacts_excluded(excluded);
        self.metrics.record_extraction_failures(report.failures.len());
        self.metrics.record_bytes_removable(report.removable_bytes());

        info!(
            location = %report.location,
            policy = %report.policy,
            kept,
            removed,
            excluded,
            failures = report.failures.len(),
            "Rotated location"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::count::RetentionCount;
    use crate::filter::FilterStage;
    use crate::scheme::{Frequency, RetentionScheme};

    fn scheme() -> RetentionScheme {
        RetentionScheme::new().with_count(Frequency::Daily, RetentionCount::Limited(1))
    }

    fn warden(patterns: &[&str], root: Option<&str>) -> Warden {
        let bindings = patterns
            .iter()
            .map(|pattern| PolicyBinding::new(pattern, scheme()).unwrap())
            .collect();
        Warden::new(PolicyResolver::new(bindings, root.map(str::to_string)).unwrap())
    }

    #[test]
    fn test_classify() {
        let warden = warden(&["/backups/db"], Some("/backups"));
        assert!(matches!(
            warden.classify("/backups/db", "backup-20240101"),
            EntryClass::Artifact(_)
        ));
        assert!(matches!(
            warden.classify("/backups/db", "README"),
            EntryClass::NotArtifact
        ));
        assert!(matches!(
            warden.classify("/srv", "backup-20240101"),
            EntryClass::Unresolved
        ));
    }

    #[test]
    fn test_rotate_groups_by_normalized_location() {
        let warden = warden(&["/backups/db"], None);
        let report = warden.rotate(vec![
            Candidate::new("/backups/db", "backup-20240101"),
            Candidate::new("/backups/db/", "backup-20240102"),
        ]);
        assert_eq!(report.locations.len(), 1);
        assert_eq!(report.locations[0].decisions.len(), 2);
    }

    #[test]
    fn test_failures_and_unmatched_are_reported() {
        let warden = warden(&["/backups/db"], None);
        let report = warden.rotate(vec![
            Candidate::new("/backups/db", "backup-20240101"),
            Candidate::new("/backups/db", "backup-20241301"),
            Candidate::new("/backups/db", "notes.txt"),
        ]);
        let location = &report.locations[0];
        assert_eq!(location.failures.len(), 1);
        assert_eq!(location.failures[0].name, "backup-20241301");
        assert_eq!(location.count_reason(DecisionReason::UnmatchedNoPolicy), 1);
        assert_eq!(location.decisions[0].name, "notes.txt");
        assert_eq!(location.kept().count(), 1);
        assert_eq!(location.removals().count(), 0);
    }

    #[test]
    fn test_unmatched_names_differ_from_unresolved_locations() {
        let warden = warden(&["/backups/db"], None);
        let report = warden.rotate(vec![
            Candidate::new("/backups/db", "notes.txt"),
            Candidate::new("/backups/other", "backup-20240101"),
        ]);

        assert_eq!(report.locations.len(), 1);
        let location = &report.locations[0];
        assert_eq!(location.location, "/backups/db");
        assert_eq!(location.decisions.len(), 1);
        assert_eq!(location.decisions[0].reason, DecisionReason::UnmatchedNoPolicy);
        assert!(location.decisions[0].timestamp.is_none());

        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].location, "/backups/other");
        assert!(report.removals().is_empty());
    }

    #[test]
    fn test_traversal_skips_unresolved_silently() {
        let warden = warden(&["/backups/db"], Some("/backups"));
        let report = warden.rotate(vec![Candidate::new("/srv/tmp", "backup-20240101")]);
        assert!(report.locations.is_empty());
        assert!(report.unresolved.is_empty());
    }

    #[test]
    fn test_most_recent_includes_excluded_artifacts() {
        let scheme = scheme().with_filter(FilterStage::new(&[] as &[&str], &["*0105*"]).unwrap());
        let binding = PolicyBinding::new("/b", scheme).unwrap();
        let warden = Warden::new(PolicyResolver::new(vec![binding], None).unwrap());
        let report = warden.rotate(vec![
            Candidate::new("/b", "backup-20240101"),
            Candidate::new("/b", "backup-20240105"),
        ]);
        let location = &report.locations[0];
        assert_eq!(
            location.most_recent.map(|ts| ts.format("%Y%m%d").to_string()),
            Some("20240105".to_string())
        );
    }

    #[test]
    fn test_metrics_track_run() {
        let warden = warden(&["/a", "/b"], None);
        warden.rotate(vec![
            Candidate::new("/a", "backup-20240101"),
            Candidate::new("/a", "backup-20240102"),
            Candidate::new("/b", "backup-20240101"),
            Candidate::new("/c", "backup-20240101"),
        ]);
        let metrics = warden.metrics();
        assert_eq!(metrics.locations_rotated(), 2);
        assert_eq!(metrics.locations_unresolved(), 1);
        assert_eq!(metrics.artifacts_evaluated(), 3);
        assert_eq!(metrics.artifacts_kept(), 2);
        assert_eq!(metrics.artifacts_removed(), 1);
    }
}
