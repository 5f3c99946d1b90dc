//! Collaborators around the rotation core: listing candidates, deleting
//! removals and checking staleness.

pub mod delete;
pub mod local;
pub mod object;
pub mod staleness;
pub mod storage;

use async_trait::async_trait;
use rotation::{Candidate, SourceKind, Warden};
use thiserror::Error;

pub use delete::{
    ArtifactDeleter, DeletionResult, DeletionRunner, LocalDeleter, ObjectStoreDeleter,
};
pub use local::LocalScanner;
pub use object::ObjectStoreScanner;
pub use staleness::{StaleLocation, stale_locations};
pub use storage::{Backend, create_backend};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Location '{0}' does not exist or is not a directory")]
    MissingLocation(String),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk '{path}': {source}")]
    Walk {
        path: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Scan task failed: {0}")]
    Task(String),
}

/// Lists candidate artifacts for the warden's policies.
///
/// With a traversal root the whole tree below it is searched and every entry
/// the warden classifies as an artifact becomes a candidate. Without one,
/// the direct children of each configured location are listed.
#[async_trait]
pub trait ArtifactScanner: Send + Sync {
    fn source_kind(&self) -> SourceKind;

    async fn scan(&self, warden: &Warden) -> Result<Vec<Candidate>, ScanError>;
}
