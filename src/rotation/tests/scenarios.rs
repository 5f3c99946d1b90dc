// End-to-end rotation scenarios and properties over the public API.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rotation::{
    Artifact, Candidate, DecisionReason, FilterStage, Frequency, PolicyBinding, PolicyResolver,
    RetentionCount, RetentionScheme, RotationDecision, RotationEngine, Warden,
};
use std::collections::{BTreeSet, HashSet};

fn jan_first() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn backup_name(ts: NaiveDateTime) -> String {
    format!("backup-{}", ts.format("%Y%m%d-%H%M"))
}

/// One artifact per hour starting 2024-01-01 00:00.
fn hourly_artifacts(hours: i64) -> Vec<Artifact> {
    (0..hours)
        .map(|h| {
            let ts = jan_first() + Duration::hours(h);
            Artifact::new("/backups/db", backup_name(ts), ts)
        })
        .collect()
}

fn hourly_candidates(hours: i64) -> Vec<Candidate> {
    (0..hours)
        .map(|h| Candidate::new("/backups/db", backup_name(jan_first() + Duration::hours(h))))
        .collect()
}

fn counts(hourly: RetentionCount, daily: RetentionCount) -> RetentionScheme {
    RetentionScheme::new()
        .with_count(Frequency::Hourly, hourly)
        .with_count(Frequency::Daily, daily)
}

fn kept_set(decisions: &[RotationDecision]) -> BTreeSet<String> {
    decisions
        .iter()
        .filter(|d| d.keep)
        .map(|d| d.name.clone())
        .collect()
}

fn literal_warden(pattern: &str, scheme: RetentionScheme) -> Warden {
    let binding = PolicyBinding::new(pattern, scheme).unwrap();
    Warden::new(PolicyResolver::new(vec![binding], None).unwrap())
}

#[test]
fn test_seventy_two_hours_hourly_then_daily() {
    let scheme = counts(RetentionCount::Limited(24), RetentionCount::Limited(7));
    let warden = literal_warden("/backups/db", scheme);
    let report = warden.rotate(hourly_candidates(72));

    assert_eq!(report.locations.len(), 1);
    let location = &report.locations[0];
    assert_eq!(location.decisions.len(), 72);

    let hourly: Vec<&str> = location
        .decisions
        .iter()
        .filter(|d| d.reason == DecisionReason::Retained(Frequency::Hourly))
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(hourly.len(), 24);
    assert!(hourly.iter().all(|name| name.starts_with("backup-20240103-")));

    let daily: Vec<&str> = location
        .decisions
        .iter()
        .filter(|d| d.reason == DecisionReason::Retained(Frequency::Daily))
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(daily, vec!["backup-20240101-0000", "backup-20240102-0000"]);

    assert_eq!(location.count_reason(DecisionReason::OverLimit), 46);
    assert_eq!(report.removals().len(), 46);
}

#[test]
fn test_exclude_pattern_removes_artifact_from_rotation() {
    let scheme = RetentionScheme::new()
        .with_count(Frequency::Yearly, RetentionCount::Always)
        .with_filter(FilterStage::new(&[] as &[&str], &["*2022*"]).unwrap());
    let warden = literal_warden("/backups/db", scheme);
    let report = warden.rotate(vec![
        Candidate::new("/backups/db", "backup-20220101"),
        Candidate::new("/backups/db", "backup-20230101"),
    ]);

    let location = &report.locations[0];
    let excluded = location
        .decisions
        .iter()
        .find(|d| d.name == "backup-20220101")
        .unwrap();
    assert!(!excluded.keep);
    assert_eq!(excluded.reason, DecisionReason::ExcludedByFilter);
    assert!(!excluded.is_removal());

    let kept = location
        .decisions
        .iter()
        .find(|d| d.name == "backup-20230101")
        .unwrap();
    assert_eq!(kept.reason, DecisionReason::Retained(Frequency::Yearly));
    assert!(report.removals().is_empty());
}

#[test]
fn test_literal_mode_unconfigured_location_is_reported() {
    let scheme = counts(RetentionCount::Limited(24), RetentionCount::Limited(7));
    let warden = literal_warden("/backups/physical", scheme);
    let report = warden.rotate(vec![
        Candidate::new("/backups/logical", "backup-20240101"),
        Candidate::new("/backups/logical", "backup-20240102"),
    ]);

    assert!(report.locations.is_empty());
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].location, "/backups/logical");
    assert_eq!(report.unresolved[0].candidates, 2);
    assert_eq!(report.summary().decisions, 0);
}

#[test]
fn test_every_artifact_gets_exactly_one_decision() {
    let scheme = RetentionScheme::new()
        .with_count(Frequency::Minutely, RetentionCount::Limited(3))
        .with_count(Frequency::Hourly, RetentionCount::Limited(5))
        .with_count(Frequency::Daily, RetentionCount::Limited(4))
        .with_count(Frequency::Weekly, RetentionCount::Limited(2))
        .with_count(Frequency::Monthly, RetentionCount::Always);
    // Irregular spacing: every 7 hours and 13 minutes over a month.
    let artifacts: Vec<Artifact> = (0..100)
        .map(|i| {
            let ts = jan_first() + Duration::minutes(i * (7 * 60 + 13));
            Artifact::new("/b", backup_name(ts), ts)
        })
        .collect();
    let decisions = RotationEngine::new(&scheme).rotate(artifacts.clone());

    assert_eq!(decisions.len(), artifacts.len());
    let names: HashSet<&str> = decisions.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names.len(), artifacts.len());
    for decision in &decisions {
        match decision.reason {
            DecisionReason::Retained(_) => assert!(decision.keep),
            DecisionReason::OverLimit => assert!(!decision.keep),
            other => panic!("unexpected reason {other}"),
        }
    }
}

#[test]
fn test_raising_hourly_count_never_drops_kept_artifacts() {
    let artifacts = hourly_artifacts(120);
    let mut previous: Option<BTreeSet<String>> = None;
    for hourly in 0..60 {
        let scheme = counts(RetentionCount::Limited(hourly), RetentionCount::Limited(3));
        let kept = kept_set(&RotationEngine::new(&scheme).rotate(artifacts.clone()));
        if let Some(previous) = &previous {
            assert!(
                previous.is_subset(&kept),
                "hourly={hourly} dropped {:?}",
                previous.difference(&kept).collect::<Vec<_>>()
            );
            assert!(kept.len() >= previous.len());
        }
        previous = Some(kept);
    }
}

/// Artifacts `step` apart, starting at `start`.
fn spaced_artifacts(start: NaiveDateTime, step: Duration, count: i32) -> Vec<Artifact> {
    (0..count)
        .map(|i| {
            let ts = start + step * i;
            Artifact::new("/backups/db", backup_name(ts), ts)
        })
        .collect()
}

fn assert_raising_finer_count_keeps_superset(
    artifacts: &[Artifact],
    finer: Frequency,
    coarser: Frequency,
    prefer_recent: bool,
) {
    let mut previous: Option<BTreeSet<String>> = None;
    for n in 0..=40 {
        let scheme = RetentionScheme::new()
            .with_count(finer, RetentionCount::Limited(n))
            .with_count(coarser, RetentionCount::Limited(3))
            .with_prefer_recent(prefer_recent);
        let kept = kept_set(&RotationEngine::new(&scheme).rotate(artifacts.to_vec()));
        if let Some(previous) = &previous {
            assert!(
                previous.is_subset(&kept),
                "{finer}={n} (prefer_recent={prefer_recent}) dropped {:?} kept by {coarser}",
                previous.difference(&kept).collect::<Vec<_>>()
            );
        }
        previous = Some(kept);
    }
}

#[test]
fn test_raising_any_count_never_drops_kept_artifacts() {
    let at = |y, m, d| {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    };
    let cases = [
        (Frequency::Minutely, Frequency::Hourly, at(2024, 1, 1), Duration::minutes(7), 400),
        (Frequency::Hourly, Frequency::Daily, at(2024, 1, 1), Duration::minutes(97), 200),
        (Frequency::Daily, Frequency::Weekly, at(2024, 1, 1), Duration::hours(11), 200),
        // Weeks straddling Nov/Dec, Jan/Feb and Feb/Mar
        (Frequency::Weekly, Frequency::Monthly, at(2023, 11, 20), Duration::hours(29), 150),
        (Frequency::Monthly, Frequency::Yearly, at(2021, 3, 17), Duration::days(9), 160),
    ];
    for (finer, coarser, start, step, count) in cases {
        let artifacts = spaced_artifacts(start, step, count);
        for prefer_recent in [false, true] {
            assert_raising_finer_count_keeps_superset(&artifacts, finer, coarser, prefer_recent);
        }
    }
}

#[test]
fn test_week_split_by_month_keeps_both_sides() {
    // Wed 2024-01-31 and Thu 2024-02-01 share an ISO week
    let artifacts: Vec<Artifact> = [(1, 31), (2, 1), (2, 12)]
        .into_iter()
        .map(|(m, d)| {
            let ts = NaiveDate::from_ymd_opt(2024, m, d)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap();
            Artifact::new("/backups/db", backup_name(ts), ts)
        })
        .collect();
    let all: BTreeSet<String> = artifacts.iter().map(|a| a.name.clone()).collect();

    for weekly in [1, 2] {
        let scheme = RetentionScheme::new()
            .with_count(Frequency::Weekly, RetentionCount::Limited(weekly))
            .with_count(Frequency::Monthly, RetentionCount::Limited(12));
        let kept = kept_set(&RotationEngine::new(&scheme).rotate(artifacts.clone()));
        assert_eq!(kept, all, "weekly={weekly}");
    }
}

#[test]
fn test_always_retains_every_bucket_member() {
    let artifacts = hourly_artifacts(72);

    let bounded = counts(RetentionCount::Limited(24), RetentionCount::Limited(1));
    let bounded_decisions = RotationEngine::new(&bounded).rotate(artifacts.clone());
    let daily_bucket_of_bounded: Vec<&RotationDecision> = bounded_decisions
        .iter()
        .filter(|d| d.name.starts_with("backup-20240102-"))
        .collect();
    // Only one member of the considered day survives a bounded count.
    assert_eq!(
        daily_bucket_of_bounded.iter().filter(|d| d.keep).count(),
        1
    );

    let unbounded = counts(RetentionCount::Limited(24), RetentionCount::Always);
    let decisions = RotationEngine::new(&unbounded).rotate(artifacts);
    assert!(decisions.iter().all(|d| d.keep));
    assert_eq!(
        decisions
            .iter()
            .filter(|d| d.reason == DecisionReason::Retained(Frequency::Daily))
            .count(),
        48
    );
}

#[test]
fn test_strict_and_relaxed_agree_on_regular_input() {
    let artifacts = hourly_artifacts(100);
    let strict = RetentionScheme::new().with_count(Frequency::Hourly, RetentionCount::Limited(10));
    let relaxed = strict.clone().with_relaxed(true);

    let strict_kept = kept_set(&RotationEngine::new(&strict).rotate(artifacts.clone()));
    let relaxed_kept = kept_set(&RotationEngine::new(&relaxed).rotate(artifacts));
    assert_eq!(strict_kept.len(), 10);
    assert_eq!(strict_kept, relaxed_kept);
}

#[test]
fn test_tie_break_within_bucket() {
    let early = jan_first() + Duration::minutes(10 * 60 + 5);
    let late = jan_first() + Duration::minutes(10 * 60 + 45);
    let artifacts = vec![
        Artifact::new("/b", backup_name(early), early),
        Artifact::new("/b", backup_name(late), late),
    ];
    let oldest = RetentionScheme::new().with_count(Frequency::Hourly, RetentionCount::Limited(1));
    let newest = oldest.clone().with_prefer_recent(true);

    let kept = kept_set(&RotationEngine::new(&oldest).rotate(artifacts.clone()));
    assert_eq!(kept, BTreeSet::from(["backup-20240101-1005".to_string()]));

    let kept = kept_set(&RotationEngine::new(&newest).rotate(artifacts));
    assert_eq!(kept, BTreeSet::from(["backup-20240101-1045".to_string()]));
}

#[test]
fn test_rotation_is_idempotent() {
    let scheme = counts(RetentionCount::Limited(12), RetentionCount::Limited(2))
        .with_count(Frequency::Weekly, RetentionCount::Limited(1));
    let warden = literal_warden("/backups/db", scheme);

    let first = warden.rotate(hourly_candidates(200));
    let second = warden.rotate(hourly_candidates(200));
    assert_eq!(first.locations[0].decisions, second.locations[0].decisions);
}

#[test]
fn test_input_order_does_not_matter() {
    let scheme = counts(RetentionCount::Limited(6), RetentionCount::Limited(2));
    let artifacts = hourly_artifacts(50);
    let mut reversed = artifacts.clone();
    reversed.reverse();

    let forward = RotationEngine::new(&scheme).rotate(artifacts);
    let backward = RotationEngine::new(&scheme).rotate(reversed);
    assert_eq!(forward, backward);
}

#[test]
fn test_traversal_uses_most_specific_policy_per_location() {
    let generic = PolicyBinding::new(
        "/backups",
        RetentionScheme::new().with_count(Frequency::Daily, RetentionCount::Limited(1)),
    )
    .unwrap();
    let mysql = PolicyBinding::new(
        "/backups/mysql",
        RetentionScheme::new().with_count(Frequency::Daily, RetentionCount::Always),
    )
    .unwrap();
    let resolver = PolicyResolver::new(vec![generic, mysql], Some("/backups".to_string())).unwrap();
    let warden = Warden::new(resolver);

    let report = warden.rotate(vec![
        Candidate::new("/backups/mysql", "dump-20240101"),
        Candidate::new("/backups/mysql", "dump-20240102"),
        Candidate::new("/backups/pg", "dump-20240101"),
        Candidate::new("/backups/pg", "dump-20240102"),
        Candidate::new("/elsewhere", "dump-20240101"),
    ]);

    assert_eq!(report.locations.len(), 2);
    let mysql = report.location("/backups/mysql").unwrap();
    assert_eq!(mysql.policy, "/backups/mysql");
    assert_eq!(mysql.kept().count(), 2);

    let pg = report.location("/backups/pg").unwrap();
    assert_eq!(pg.policy, "/backups");
    assert_eq!(pg.kept().count(), 1);
    assert_eq!(pg.removals().count(), 1);

    assert!(report.unresolved.is_empty());
}
