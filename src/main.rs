//! backup-warden
//!
//! Scans backup locations, decides which backups to keep per retention policy
//! and removes the rest when the run is committed with `--delete`.

use anyhow::{Context, Result};
use clap::Parser;
use common::cli::utils::{
    display_config, init_logging, load_config, validate_config, version_info,
};
use common::cli::{Args, Commands};
use rotation::{RotationReport, Warden};
use scanner::{DeletionRunner, create_backend, stale_locations};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging(args.debug, config.warden.log_file.as_deref())?;

    match args.command.clone().unwrap_or_default() {
        Commands::Config { json } => return display_config(&config, json),
        Commands::Validate => {
            validate_config(&config)?;
            println!("Configuration is valid");
            return Ok(());
        }
        Commands::Run => {}
    }

    let started = Instant::now();
    tracing::info!(
        version = %version_info(),
        source = %config.warden.source,
        environment = config.warden.environment.as_deref().unwrap_or("-"),
        dry_run = !config.warden.delete,
        "Starting backup-warden"
    );

    let resolver = validate_config(&config)?;
    let warden = Warden::new(resolver);
    let backend = create_backend(&config).context("Failed to create storage backend")?;

    let candidates = backend
        .scanner
        .scan(&warden)
        .await
        .context("Failed to scan for backups")?;
    let report = warden.rotate(candidates);

    print_report(&report, args.json)?;

    let stale = stale_locations(&report, config.warden.stale_after);
    if !stale.is_empty() {
        tracing::warn!(
            stale_locations = stale.len(),
            stale_after_secs = config.warden.stale_after.as_secs(),
            "Some locations have no backup within the staleness window"
        );
    }

    let runner = DeletionRunner::new(backend.deleter.clone(), !config.warden.delete);
    let deletion = runner.run(report.removals()).await;

    let summary = report.summary();
    summary.log();

    let metrics = warden.metrics();
    tracing::info!(
        locations = metrics.locations_rotated(),
        evaluated = metrics.artifacts_evaluated(),
        removed = deletion.deleted_count,
        failed = deletion.failed_count,
        rotation_ms = metrics.total_duration_ms(),
        runtime_ms = started.elapsed().as_millis() as u64,
        dry_run = runner.is_dry_run(),
        "Run complete"
    );

    if deletion.failed_count > 0 {
        anyhow::bail!("{} backups could not be deleted", deletion.failed_count);
    }
    Ok(())
}

fn print_report(report: &RotationReport, json: bool) -> Result<()> {
    if json {
        let json =
            serde_json::to_string_pretty(report).context("Failed to serialize rotation report")?;
        println!("{json}");
        return Ok(());
    }

    for location in &report.locations {
        println!("{location}");
    }
    for unresolved in &report.unresolved {
        println!(
            "{} (no policy, {} entries skipped)",
            unresolved.location, unresolved.candidates
        );
    }
    println!("{}", report.summary());
    Ok(())
}
