//! Candidate and artifact types exchanged with the scanning collaborators.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Backend that produced a candidate. Reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Local filesystem.
    #[default]
    Local,
    /// S3-compatible object storage.
    S3,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Local => "local",
            SourceKind::S3 => "s3",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = UnknownSourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(SourceKind::Local),
            "s3" => Ok(SourceKind::S3),
            _ => Err(UnknownSourceKind(s.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown source '{0}', expected one of: local, s3")]
pub struct UnknownSourceKind(pub String);

/// One entry reported by a scanning collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Containing directory or key prefix.
    pub location: String,
    /// File, directory or object name as found.
    pub name: String,
    /// Modification time, when the backend knows it.
    pub modified: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub is_dir: bool,
    pub source_kind: SourceKind,
}

impl Candidate {
    pub fn new(location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
            modified: None,
            size_bytes: 0,
            is_dir: false,
            source_kind: SourceKind::default(),
        }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_directory(mut self, is_dir: bool) -> Self {
        self.is_dir = is_dir;
        self
    }

    pub fn with_source_kind(mut self, source_kind: SourceKind) -> Self {
        self.source_kind = source_kind;
        self
    }

    /// Full identifying path (`location/name`).
    pub fn path(&self) -> String {
        join_path(&self.location, &self.name)
    }
}

/// A candidate whose timestamp has been extracted.
///
/// The timestamp is wall-clock time in the timezone chosen by the scheme that
/// extracted it; all bucket arithmetic for a location happens in that zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub location: String,
    pub name: String,
    pub timestamp: NaiveDateTime,
    pub size_bytes: u64,
    pub is_dir: bool,
    pub source_kind: SourceKind,
}

impl Artifact {
    pub fn new(location: impl Into<String>, name: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
            timestamp,
            size_bytes: 0,
            is_dir: false,
            source_kind: SourceKind::default(),
        }
    }

    pub fn from_candidate(candidate: Candidate, timestamp: NaiveDateTime) -> Self {
        Self {
            location: candidate.location,
            name: candidate.name,
            timestamp,
            size_bytes: candidate.size_bytes,
            is_dir: candidate.is_dir,
            source_kind: candidate.source_kind,
        }
    }

    pub fn path(&self) -> String {
        join_path(&self.location, &self.name)
    }
}

/// Join a location and a name with exactly one separator.
pub fn join_path(location: &str, name: &str) -> String {
    if location.is_empty() {
        name.to_string()
    } else if location.ends_with('/') {
        format!("{location}{name}")
    } else {
        format!("{location}/{name}")
    }
}

/// Strip trailing separators so `/backups/db/` and `/backups/db` group together.
pub fn normalize_location(location: &str) -> &str {
    let trimmed = location.trim_end_matches('/');
    if trimmed.is_empty() && location.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/backups/db", "dump.sql"), "/backups/db/dump.sql");
        assert_eq!(join_path("/backups/db/", "dump.sql"), "/backups/db/dump.sql");
        assert_eq!(join_path("", "dump.sql"), "dump.sql");
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("/backups/db/"), "/backups/db");
        assert_eq!(normalize_location("/backups/db"), "/backups/db");
        assert_eq!(normalize_location("/"), "/");
        assert_eq!(normalize_location("mysql/daily/"), "mysql/daily");
    }

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("local".parse::<SourceKind>().unwrap(), SourceKind::Local);
        assert_eq!("S3".parse::<SourceKind>().unwrap(), SourceKind::S3);
        assert!("ssh".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_candidate_builder() {
        let candidate = Candidate::new("/backups", "nightly")
            .with_size(42)
            .with_directory(true)
            .with_source_kind(SourceKind::S3);
        assert_eq!(candidate.path(), "/backups/nightly");
        assert_eq!(candidate.size_bytes, 42);
        assert!(candidate.is_dir);
        assert_eq!(candidate.source_kind, SourceKind::S3);
        assert!(candidate.modified.is_none());
    }
}
