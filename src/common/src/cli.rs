use clap::{Parser, Subcommand};
use rotation::{CountSpec, PolicyConfig, SourceKind, TimezoneMode};
use std::path::PathBuf;

/// Retention defaults used when no policies are configured.
pub const DEFAULT_HOURLY: &str = "72";
pub const DEFAULT_DAILY: &str = "7";
pub const DEFAULT_WEEKLY: &str = "6";
pub const DEFAULT_MONTHLY: &str = "12";
pub const DEFAULT_YEARLY: &str = "always";

/// Command line of the backup-warden binary
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "backup-warden",
    version,
    about = "Rotate timestamped backups by minutely, hourly, daily, weekly, monthly and yearly retention"
)]
pub struct Args {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Artifact source: local or s3")]
    pub source: Option<SourceKind>,

    #[arg(long, help = "S3 bucket holding the backups")]
    pub bucket: Option<String>,

    #[arg(long, help = "Traversal root (and policy pattern when no policies are configured)")]
    pub path: Option<String>,

    #[arg(long, help = "Regex with year/month/day[/hour/minute/second] or unixtime groups")]
    pub timestamp_pattern: Option<String>,

    #[arg(long, value_delimiter = ',', help = "Comma-separated include globs")]
    pub include: Vec<String>,

    #[arg(long, value_delimiter = ',', help = "Comma-separated exclude globs")]
    pub exclude: Vec<String>,

    #[arg(long, help = "Use modification times instead of names")]
    pub filestat: bool,

    #[arg(long, help = "Keep the newest backup of each bucket instead of the oldest")]
    pub prefer_recent: bool,

    #[arg(long, help = "Group backups by proximity instead of calendar boundaries")]
    pub relaxed: bool,

    #[arg(long, help = "Bucket in local time instead of UTC")]
    pub local_time: bool,

    #[arg(long, help = "Minutely backups to keep [default: 0]")]
    pub minutely: Option<String>,

    #[arg(long, help = "Hourly backups to keep [default: 72]")]
    pub hourly: Option<String>,

    #[arg(long, help = "Daily backups to keep [default: 7]")]
    pub daily: Option<String>,

    #[arg(long, help = "Weekly backups to keep [default: 6]")]
    pub weekly: Option<String>,

    #[arg(long, help = "Monthly backups to keep [default: 12]")]
    pub monthly: Option<String>,

    #[arg(long, help = "Yearly backups to keep [default: always]")]
    pub yearly: Option<String>,

    #[arg(long, help = "Delete backups marked for removal (dry run otherwise)")]
    pub delete: bool,

    #[arg(long, help = "Enable debug logging")]
    pub debug: bool,

    #[arg(long, help = "Print the rotation report as JSON")]
    pub json: bool,

    #[arg(long, help = "Write logs to this file")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands besides the default rotation run
#[derive(Subcommand, Debug, Clone, Default)]
pub enum Commands {
    /// Scan, rotate and report (default behavior)
    #[default]
    Run,
    /// Show the effective configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
}

impl Args {
    /// Whether any per-policy flag was given.
    pub fn has_policy_flags(&self) -> bool {
        self.timestamp_pattern.is_some()
            || !self.include.is_empty()
            || !self.exclude.is_empty()
            || self.filestat
            || self.prefer_recent
            || self.relaxed
            || self.local_time
            || [
                &self.minutely,
                &self.hourly,
                &self.daily,
                &self.weekly,
                &self.monthly,
                &self.yearly,
            ]
            .iter()
            .any(|count| count.is_some())
    }

    /// The single policy used when none are configured.
    pub fn parameter_policy(&self, pattern: &str) -> PolicyConfig {
        let count = |value: &Option<String>, default: &str| {
            CountSpec::Expression(value.clone().unwrap_or_else(|| default.to_string()))
        };
        PolicyConfig {
            pattern: pattern.to_string(),
            minutely: count(&self.minutely, "0"),
            hourly: count(&self.hourly, DEFAULT_HOURLY),
            daily: count(&self.daily, DEFAULT_DAILY),
            weekly: count(&self.weekly, DEFAULT_WEEKLY),
            monthly: count(&self.monthly, DEFAULT_MONTHLY),
            yearly: count(&self.yearly, DEFAULT_YEARLY),
            relaxed: self.relaxed,
            prefer_recent: self.prefer_recent,
            timestamp_pattern: self.timestamp_pattern.clone(),
            filestat: self.filestat,
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            timezone: if self.local_time {
                TimezoneMode::Local
            } else {
                TimezoneMode::Utc
            },
            ..PolicyConfig::default()
        }
    }
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result, anyhow, bail};
    use rotation::PolicyResolver;
    use std::fs::OpenOptions;
    use std::path::Path;
    use std::sync::Mutex;
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    /// Initialize logging: `info` by default, `debug` with `--debug`,
    /// `RUST_LOG` wins over both.
    pub fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
        let level = if debug { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?;
                builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init()
            }
            None => builder.with_writer(std::io::stderr).try_init(),
        }
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))
    }

    /// Load configuration and apply command line overrides.
    ///
    /// Without configured policies a single policy is built from the flags
    /// with `--path` as both pattern and traversal root.
    pub fn load_config(args: &Args) -> Result<Configuration> {
        let mut config = match &args.config {
            Some(path) => {
                Configuration::load_from_path(path).context("Failed to load configuration")?
            }
            None => Configuration::load().context("Failed to load configuration")?,
        };
        apply_overrides(&mut config, args)?;
        Ok(config)
    }

    /// Apply flags on top of a loaded configuration.
    pub fn apply_overrides(config: &mut Configuration, args: &Args) -> Result<()> {
        if let Some(source) = args.source {
            config.warden.source = source;
        }
        if let Some(bucket) = &args.bucket {
            config.s3.bucket = Some(bucket.clone());
        }
        if let Some(path) = &args.path {
            config.warden.path = Some(path.clone());
        }
        if args.delete {
            config.warden.delete = true;
        }
        if let Some(log_file) = &args.log_file {
            config.warden.log_file = Some(log_file.clone());
        }

        if !config.policies.is_empty() {
            if args.has_policy_flags() {
                bail!("Retention and pattern flags cannot be combined with configured policies");
            }
            return Ok(());
        }

        let Some(path) = config.warden.path.clone() else {
            bail!("--path is required when no policies are configured");
        };
        config.policies.push(args.parameter_policy(&path));
        Ok(())
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("backup-warden configuration:");
            println!("============================");
            println!("Source: {}", config.warden.source);
            match &config.warden.path {
                Some(path) => println!("Traversal root: {path}"),
                None => println!("Traversal: disabled (literal locations)"),
            }
            if let Some(bucket) = &config.s3.bucket {
                println!("Bucket: {bucket}");
            }
            println!("Delete: {}", config.warden.delete);
            println!(
                "Stale after: {}",
                humantime::format_duration(config.warden.stale_after)
            );
            for policy in &config.policies {
                println!(
                    "Policy {}: minutely={} hourly={} daily={} weekly={} monthly={} yearly={}",
                    policy.pattern,
                    policy.minutely,
                    policy.hourly,
                    policy.daily,
                    policy.weekly,
                    policy.monthly,
                    policy.yearly
                );
            }
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<PolicyResolver> {
        info!("Validating configuration...");
        let resolver = config.resolver().context("Invalid configuration")?;
        info!(
            policies = resolver.bindings().len(),
            traversal = resolver.is_traversal(),
            "Configuration validation passed"
        );
        Ok(resolver)
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }

}
