use crate::{
    ArtifactDeleter, ArtifactScanner, LocalDeleter, LocalScanner, ObjectStoreDeleter,
    ObjectStoreScanner,
};
use anyhow::{Context, Result};
use common::config::{Configuration, S3Config};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use rotation::SourceKind;
use std::sync::Arc;

/// Scanner and deleter for the configured source.
pub struct Backend {
    pub scanner: Arc<dyn ArtifactScanner>,
    pub deleter: Arc<dyn ArtifactDeleter>,
}

/// Build the backend selected by `warden.source`.
pub fn create_backend(config: &Configuration) -> Result<Backend> {
    match config.warden.source {
        SourceKind::Local => Ok(Backend {
            scanner: Arc::new(LocalScanner::new()),
            deleter: Arc::new(LocalDeleter),
        }),
        SourceKind::S3 => {
            let object_store = create_s3_store(&config.s3)?;
            Ok(Backend {
                scanner: Arc::new(ObjectStoreScanner::new(object_store.clone())),
                deleter: Arc::new(ObjectStoreDeleter::new(object_store)),
            })
        }
    }
}

/// Create an S3 store. Settings not given fall back to the standard AWS
/// environment variables.
pub fn create_s3_store(s3: &S3Config) -> Result<Arc<dyn ObjectStore>> {
    let bucket = s3
        .bucket
        .as_deref()
        .context("An S3 bucket is required when the source is s3")?;

    let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
    if let Some(region) = &s3.region {
        builder = builder.with_region(region);
    }
    if let (Some(access_key), Some(secret_key)) = (&s3.access_key_id, &s3.secret_access_key) {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key);
    }
    if let Some(endpoint) = &s3.endpoint {
        // S3-compatible services generally require path-style requests
        builder = builder
            .with_endpoint(endpoint)
            .with_virtual_hosted_style_request(false);
    }
    builder = builder.with_allow_http(s3.allow_http);

    let store = builder
        .build()
        .with_context(|| format!("Failed to create S3 store for bucket '{bucket}'"))?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_backend() {
        let backend = create_backend(&Configuration::default()).unwrap();
        assert_eq!(backend.scanner.source_kind(), SourceKind::Local);
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        let mut config = Configuration::default();
        config.warden.source = SourceKind::S3;
        assert!(create_backend(&config).is_err());
    }

    #[test]
    fn test_s3_backend_with_endpoint() {
        let mut config = Configuration::default();
        config.warden.source = SourceKind::S3;
        config.s3 = S3Config {
            bucket: Some("dumps".to_string()),
            region: Some("us-east-1".to_string()),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: Some("minioadmin".to_string()),
            secret_access_key: Some("minioadmin".to_string()),
            allow_http: true,
        };
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.scanner.source_kind(), SourceKind::S3);
    }
}
