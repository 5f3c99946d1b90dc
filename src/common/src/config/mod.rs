use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use rotation::{
    PolicyConfig, PolicyResolver, RotationError, SchemeError, SourceKind, build_bindings,
};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "backup-warden.toml";
pub const ENV_PREFIX: &str = "BACKUP_WARDEN__";

/// Run-wide settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Backend that lists and deletes artifacts.
    ///
    /// Env: BACKUP_WARDEN__WARDEN__SOURCE
    pub source: SourceKind,

    /// Traversal root. Without it only the configured policy patterns are
    /// listed, literally.
    ///
    /// Env: BACKUP_WARDEN__WARDEN__PATH
    #[serde(default)]
    pub path: Option<String>,

    /// Commit removals. Dry run otherwise.
    ///
    /// Env: BACKUP_WARDEN__WARDEN__DELETE
    #[serde(default)]
    pub delete: bool,

    /// Warn about locations whose newest artifact is older than this.
    ///
    /// Env: BACKUP_WARDEN__WARDEN__STALE_AFTER
    #[serde(with = "humantime_serde")]
    pub stale_after: Duration,

    /// Write logs to this file instead of stderr.
    ///
    /// Env: BACKUP_WARDEN__WARDEN__LOG_FILE
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Free-form environment label added to log output.
    ///
    /// Env: BACKUP_WARDEN__WARDEN__ENVIRONMENT
    #[serde(default)]
    pub environment: Option<String>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Local,
            path: None,
            delete: false,
            stale_after: Duration::from_secs(24 * 3600),
            log_file: None,
            environment: None,
        }
    }
}

/// S3-compatible object storage connection.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct S3Config {
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for non-AWS services (MinIO, Ceph, ...).
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    #[serde(default)]
    pub warden: WardenConfig,
    #[serde(default)]
    pub s3: S3Config,
    /// Ordered policy bindings.
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Scheme(#[from] SchemeError),

    #[error(transparent)]
    Policy(#[from] RotationError),

    #[error("An S3 bucket is required when the source is s3")]
    MissingBucket,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(path))
    }

    fn figment(file: figment::providers::Data<Toml>) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Validate every policy and build the resolver.
    ///
    /// Fails on the first malformed policy so no rotation ever runs with a
    /// partially understood configuration.
    pub fn resolver(&self) -> Result<PolicyResolver, ConfigError> {
        if self.warden.source == SourceKind::S3 && self.s3.bucket.is_none() {
            return Err(ConfigError::MissingBucket);
        }
        let bindings = build_bindings(&self.policies)?;
        Ok(PolicyResolver::new(bindings, self.warden.path.clone())?)
    }
}
