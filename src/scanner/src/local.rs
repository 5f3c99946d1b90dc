//! Local filesystem scanning.

use crate::{ArtifactScanner, ScanError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rotation::{Candidate, EntryClass, SourceKind, Warden};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Scans directories on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalScanner;

impl LocalScanner {
    pub fn new() -> Self {
        Self
    }

    /// Blocking scan; [`ArtifactScanner::scan`] runs it on the blocking pool.
    pub fn scan_blocking(&self, warden: &Warden) -> Result<Vec<Candidate>, ScanError> {
        let resolver = warden.resolver();
        let candidates = match resolver.root() {
            Some(root) => scan_tree(Path::new(root), warden)?,
            None => {
                let mut candidates = Vec::new();
                for location in resolver.literal_locations() {
                    match list_location(location) {
                        Ok(found) => candidates.extend(found),
                        Err(e) => warn!(location = %location, error = %e, "Skipping location"),
                    }
                }
                candidates
            }
        };

        info!(
            candidates = candidates.len(),
            traversal = resolver.is_traversal(),
            "Local scan complete"
        );
        Ok(candidates)
    }
}

#[async_trait]
impl ArtifactScanner for LocalScanner {
    fn source_kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn scan(&self, warden: &Warden) -> Result<Vec<Candidate>, ScanError> {
        let scanner = *self;
        let warden = warden.clone();
        tokio::task::spawn_blocking(move || scanner.scan_blocking(&warden))
            .await
            .map_err(|e| ScanError::Task(e.to_string()))?
    }
}

/// Walk `root` in name order. Artifacts are not descended into.
fn scan_tree(root: &Path, warden: &Warden) -> Result<Vec<Candidate>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::MissingLocation(root.display().to_string()));
    }

    let mut candidates = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let Some(parent) = entry.path().parent() else {
            continue;
        };
        let location = parent.to_string_lossy().into_owned();
        let name = entry.file_name().to_string_lossy().into_owned();

        match warden.classify(&location, &name) {
            EntryClass::Artifact(binding) => {
                debug!(
                    location = %location,
                    name = %name,
                    policy = %binding.pattern(),
                    "Found artifact"
                );
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                candidates.push(candidate_from_entry(location, name, &entry)?);
            }
            EntryClass::NotArtifact | EntryClass::Unresolved => {}
        }
    }
    Ok(candidates)
}

/// Every direct child of a configured location is a candidate.
fn list_location(location: &str) -> Result<Vec<Candidate>, ScanError> {
    let path = Path::new(location);
    if !path.is_dir() {
        return Err(ScanError::MissingLocation(location.to_string()));
    }

    WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            let entry = entry.map_err(|source| ScanError::Walk {
                path: location.to_string(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            candidate_from_entry(location.to_string(), name, &entry)
        })
        .collect()
}

fn candidate_from_entry(
    location: String,
    name: String,
    entry: &DirEntry,
) -> Result<Candidate, ScanError> {
    let io_error = |source: std::io::Error| ScanError::Io {
        path: entry.path().display().to_string(),
        source,
    };
    let metadata = entry.metadata().map_err(|e| io_error(e.into()))?;
    let is_dir = metadata.is_dir();
    let size_bytes = if is_dir {
        directory_size(entry.path())
    } else {
        metadata.len()
    };

    let mut candidate = Candidate::new(location, name)
        .with_size(size_bytes)
        .with_directory(is_dir)
        .with_source_kind(SourceKind::Local);
    if let Ok(modified) = metadata.modified() {
        candidate = candidate.with_modified(DateTime::<Utc>::from(modified));
    }
    Ok(candidate)
}

fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}
