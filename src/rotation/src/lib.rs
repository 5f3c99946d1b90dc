//! Retention decisions for timestamped backup artifacts.
//!
//! Candidates reported by a scanner are grouped by location, matched to a
//! policy, given a timestamp, filtered and finally partitioned into kept and
//! over-limit sets per calendar frequency. The crate performs no I/O.

pub mod artifact;
pub mod config;
pub mod count;
pub mod engine;
pub mod filter;
pub mod metrics;
pub mod policy;
pub mod report;
pub mod scheme;
pub mod timestamp;
pub mod warden;

pub use artifact::{Artifact, Candidate, SourceKind};
pub use config::{CountSpec, PolicyConfig, SchemeError, build_bindings};
pub use count::{CountExpressionError, RetentionCount};
pub use engine::{FrequencyPass, RotationEngine, run_pass};
pub use filter::{FilterStage, FilterVerdict};
pub use metrics::RotationMetrics;
pub use policy::{PolicyBinding, PolicyResolver, RotationError};
pub use report::{
    DecisionReason, LocationReport, ReportSummary, Removal, RotationDecision, RotationReport,
    format_bytes,
};
pub use scheme::{Frequency, RetentionScheme, TimezoneMode};
pub use timestamp::{DEFAULT_TIMESTAMP_PATTERN, TimestampError, TimestampRule};
pub use warden::{EntryClass, Warden};
