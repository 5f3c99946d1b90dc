//! Object storage scanning.
//!
//! Keys are split on `/` into a location (the parent prefix) and a name. A
//! prefix whose name is classified as an artifact stands for every object
//! below it, like a directory on a filesystem.

use crate::{ArtifactScanner, ScanError};
use async_trait::async_trait;
use futures::StreamExt;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use rotation::{Candidate, EntryClass, SourceKind, Warden};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ObjectStoreScanner {
    object_store: Arc<dyn ObjectStore>,
}

impl ObjectStoreScanner {
    pub fn new(object_store: Arc<dyn ObjectStore>) -> Self {
        Self { object_store }
    }

    async fn scan_tree(&self, root: &str, warden: &Warden) -> Result<Vec<Candidate>, ScanError> {
        let prefix = ObjectPath::from(root);
        let mut found: BTreeMap<(String, String), Candidate> = BTreeMap::new();

        let mut list_stream = self.object_store.list(Some(&prefix));
        while let Some(meta_result) = list_stream.next().await {
            let meta = meta_result?;
            let parts: Vec<&str> = meta.location.as_ref().split('/').collect();

            // Outermost ancestor classified as an artifact claims the object.
            for depth in 1..parts.len() {
                let location = parts[..depth].join("/");
                let name = parts[depth];
                if let EntryClass::Artifact(_) = warden.classify(&location, name) {
                    let is_dir = depth + 1 < parts.len();
                    let candidate = found
                        .entry((location.clone(), name.to_string()))
                        .or_insert_with(|| {
                            Candidate::new(location, name)
                                .with_directory(is_dir)
                                .with_source_kind(SourceKind::S3)
                        });
                    accumulate(candidate, meta.size, meta.last_modified);
                    break;
                }
            }
        }

        Ok(found.into_values().collect())
    }

    async fn list_location(&self, location: &str) -> Result<Vec<Candidate>, ScanError> {
        let prefix = ObjectPath::from(location);
        let listing = self.object_store.list_with_delimiter(Some(&prefix)).await?;

        let mut candidates = Vec::new();
        for object in listing.objects {
            let Some(name) = object.location.filename() else {
                continue;
            };
            candidates.push(
                Candidate::new(location, name)
                    .with_size(object.size)
                    .with_modified(object.last_modified)
                    .with_source_kind(SourceKind::S3),
            );
        }

        for common_prefix in listing.common_prefixes {
            let Some(name) = common_prefix.filename() else {
                continue;
            };
            let mut candidate = Candidate::new(location, name)
                .with_directory(true)
                .with_source_kind(SourceKind::S3);
            let mut list_stream = self.object_store.list(Some(&common_prefix));
            while let Some(meta_result) = list_stream.next().await {
                let meta = meta_result?;
                accumulate(&mut candidate, meta.size, meta.last_modified);
            }
            candidates.push(candidate);
        }

        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(location = %location, candidates = candidates.len(), "Listed location");
        Ok(candidates)
    }
}

/// Fold one object into a candidate: sizes add up, the newest object dates it.
fn accumulate(candidate: &mut Candidate, size: u64, modified: chrono::DateTime<chrono::Utc>) {
    candidate.size_bytes += size;
    candidate.modified = candidate.modified.max(Some(modified));
}

#[async_trait]
impl ArtifactScanner for ObjectStoreScanner {
    fn source_kind(&self) -> SourceKind {
        SourceKind::S3
    }

    async fn scan(&self, warden: &Warden) -> Result<Vec<Candidate>, ScanError> {
        let resolver = warden.resolver();
        let candidates = match resolver.root() {
            Some(root) => self.scan_tree(root, warden).await?,
            None => {
                let mut candidates = Vec::new();
                for location in resolver.literal_locations() {
                    match self.list_location(location).await {
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
            "Object store scan complete"
        );
        Ok(candidates)
    }
}
