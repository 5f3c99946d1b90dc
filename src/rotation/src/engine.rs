//! The rotation engine: partitions one location's artifacts into kept and
//! over-limit sets.
//!
//! Frequency classes run in precedence order (minutely first). Each class is
//! a pure pass over the artifacts still available after the previous class:
//!
//! 1. Group the available artifacts into buckets, most recent first. Strict
//!    mode uses calendar-aligned boundaries; relaxed mode starts a new slot
//!    whenever an artifact is at least `ratio x span` older than the slot's
//!    first member.
//! 2. Consider the `n` most recent buckets (all of them for `always`).
//! 3. Keep one representative per considered bucket (the oldest member, or
//!    the newest with `prefer_recent`), or every member for `always`.
//! 4. Every member of a considered bucket leaves the available set.
//!
//! Whatever is still available after the last class is over limit.

use crate::artifact::Artifact;
use crate::count::RetentionCount;
use crate::report::RotationDecision;
use crate::scheme::{Frequency, RetentionScheme};
use tracing::debug;

/// Result of one frequency pass, as indices into the sorted artifact slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyPass {
    pub kept: Vec<usize>,
    pub remaining: Vec<usize>,
}

/// Run one frequency class over the `available` artifacts.
///
/// `artifacts` must be sorted most recent first and `available` must be in
/// ascending index order.
pub fn run_pass(
    frequency: Frequency,
    count: RetentionCount,
    scheme: &RetentionScheme,
    artifacts: &[Artifact],
    available: &[usize],
) -> FrequencyPass {
    if !count.is_enabled() {
        return FrequencyPass {
            kept: Vec::new(),
            remaining: available.to_vec(),
        };
    }

    let buckets = if scheme.relaxed() {
        relaxed_buckets(frequency, scheme.relaxed_span_ratio(), artifacts, available)
    } else {
        strict_buckets(frequency, artifacts, available)
    };
    let considered = count
        .limit()
        .map_or(buckets.len(), |limit| limit.min(buckets.len()));

    let mut kept = Vec::new();
    for bucket in &buckets[..considered] {
        match count {
            RetentionCount::Always => kept.extend_from_slice(bucket),
            RetentionCount::Limited(_) => {
                let representative = if scheme.prefer_recent() {
                    bucket.first()
                } else {
                    bucket.last()
                };
                kept.extend(representative.copied());
            }
        }
    }

    let remaining = buckets[considered..].iter().flatten().copied().collect();
    FrequencyPass { kept, remaining }
}

fn strict_buckets(frequency: Frequency, artifacts: &[Artifact], available: &[usize]) -> Vec<Vec<usize>> {
    let mut buckets: Vec<Vec<usize>> = Vec::new();
    let mut current_start = None;
    for &index in available {
        let start = frequency.bucket_start(artifacts[index].timestamp);
        match buckets.last_mut() {
            Some(bucket) if current_start == Some(start) => bucket.push(index),
            _ => {
                buckets.push(vec![index]);
                current_start = Some(start);
            }
        }
    }
    buckets
}

fn relaxed_buckets(
    frequency: Frequency,
    ratio: f64,
    artifacts: &[Artifact],
    available: &[usize],
) -> Vec<Vec<usize>> {
    let threshold = frequency.relaxed_threshold(ratio);
    let mut buckets: Vec<Vec<usize>> = Vec::new();
    for &index in available {
        let timestamp = artifacts[index].timestamp;
        match buckets.last_mut() {
            Some(bucket) if artifacts[bucket[0]].timestamp - timestamp < threshold => {
                bucket.push(index)
            }
            _ => buckets.push(vec![index]),
        }
    }
    buckets
}

/// Applies one scheme to one location's eligible artifacts.
#[derive(Debug, Clone, Copy)]
pub struct RotationEngine<'a> {
    scheme: &'a RetentionScheme,
}

impl<'a> RotationEngine<'a> {
    pub fn new(scheme: &'a RetentionScheme) -> Self {
        Self { scheme }
    }

    /// Decide every artifact. Decisions come back oldest first.
    pub fn rotate(&self, mut artifacts: Vec<Artifact>) -> Vec<RotationDecision> {
        artifacts.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.name.cmp(&a.name))
        });

        let mut reasons: Vec<Option<Frequency>> = vec![None; artifacts.len()];
        let mut available: Vec<usize> = (0..artifacts.len()).collect();

        for (frequency, count) in self.scheme.active_frequencies() {
            if available.is_empty() {
                break;
            }
            let pass = run_pass(frequency, count, self.scheme, &artifacts, &available);
            debug!(
                frequency = %frequency,
                count = %count,
                kept = pass.kept.len(),
                consumed = available.len() - pass.remaining.len(),
                remaining = pass.remaining.len(),
                "Frequency pass complete"
            );
            for index in pass.kept {
                reasons[index] = Some(frequency);
            }
            available = pass.remaining;
        }

        let mut decisions: Vec<RotationDecision> = artifacts
            .into_iter()
            .zip(reasons)
            .map(|(artifact, reason)| {
                let decision = match reason {
                    Some(frequency) => RotationDecision::retained(artifact, frequency),
                    None => RotationDecision::over_limit(artifact),
                };
                debug!(
                    location = %decision.location,
                    name = %decision.name,
                    keep = decision.keep,
                    reason = %decision.reason,
                    "Rotation decision"
                );
                decision
            })
            .collect();
        decisions.reverse();
        decisions
    }
}
