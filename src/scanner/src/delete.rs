//! Removal of over-limit artifacts.
//!
//! Deletion only happens when a run is committed; otherwise every removal is
//! logged as a dry run. Individual failures are collected in the result and
//! never abort the remaining deletions.

use crate::ScanError;
use async_trait::async_trait;
use futures::StreamExt;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use rotation::{Removal, format_bytes};
use std::sync::Arc;

/// Result of a deletion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionResult {
    /// Number of artifacts deleted (or that would be, in a dry run).
    pub deleted_count: usize,
    /// Number of artifacts that failed to delete.
    pub failed_count: usize,
    /// Total bytes freed by deletion.
    pub total_bytes_freed: u64,
    /// Artifacts that failed to delete with error messages.
    pub failed_deletions: Vec<(String, String)>,
}

/// Deletes one artifact from its backend.
#[async_trait]
pub trait ArtifactDeleter: Send + Sync {
    async fn delete(&self, removal: &Removal) -> Result<(), ScanError>;
}

/// Deletes files and whole directories on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDeleter;

#[async_trait]
impl ArtifactDeleter for LocalDeleter {
    async fn delete(&self, removal: &Removal) -> Result<(), ScanError> {
        let path = removal.path();
        let result = if removal.is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        result.map_err(|source| ScanError::Io { path, source })
    }
}

/// Deletes objects, or every object below a prefix artifact.
pub struct ObjectStoreDeleter {
    object_store: Arc<dyn ObjectStore>,
}

impl ObjectStoreDeleter {
    pub fn new(object_store: Arc<dyn ObjectStore>) -> Self {
        Self { object_store }
    }
}

#[async_trait]
impl ArtifactDeleter for ObjectStoreDeleter {
    async fn delete(&self, removal: &Removal) -> Result<(), ScanError> {
        let path = ObjectPath::from(removal.path());
        if !removal.is_dir {
            self.object_store.delete(&path).await?;
            return Ok(());
        }

        let mut list_stream = self.object_store.list(Some(&path));
        while let Some(meta_result) = list_stream.next().await {
            let meta = meta_result?;
            self.object_store.delete(&meta.location).await?;
        }
        Ok(())
    }
}

/// Applies a report's removals through a deleter.
pub struct DeletionRunner {
    deleter: Arc<dyn ArtifactDeleter>,
    dry_run: bool,
}

impl DeletionRunner {
    pub fn new(deleter: Arc<dyn ArtifactDeleter>, dry_run: bool) -> Self {
        Self { deleter, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Delete `removals` in order.
    pub async fn run(&self, removals: Vec<Removal>) -> DeletionResult {
        if removals.is_empty() {
            tracing::info!("No backups to remove");
            return DeletionResult::default();
        }

        tracing::info!(
            removals = removals.len(),
            dry_run = self.dry_run,
            "Starting removal of over-limit backups"
        );

        let mut result = DeletionResult::default();
        for removal in &removals {
            if self.dry_run {
                tracing::info!(
                    path = %removal.path(),
                    size = %format_bytes(removal.size_bytes),
                    directory = removal.is_dir,
                    "[DRY-RUN] Would delete backup"
                );
                result.deleted_count += 1;
                result.total_bytes_freed += removal.size_bytes;
                continue;
            }

            match self.deleter.delete(removal).await {
                Ok(()) => {
                    tracing::info!(
                        path = %removal.path(),
                        size = %format_bytes(removal.size_bytes),
                        source = %removal.source_kind,
                        "Deleted backup"
                    );
                    result.deleted_count += 1;
                    result.total_bytes_freed += removal.size_bytes;
                }
                Err(e) => {
                    tracing::error!(
                        path = %removal.path(),
                        error = %e,
                        "Failed to delete backup"
                    );
                    result.failed_deletions.push((removal.path(), e.to_string()));
                }
            }
        }
        result.failed_count = result.failed_deletions.len();

        tracing::info!(
            deleted = result.deleted_count,
            failed = result.failed_count,
            bytes_freed = %format_bytes(result.total_bytes_freed),
            dry_run = self.dry_run,
            "Removal complete"
        );

        result
    }
}
