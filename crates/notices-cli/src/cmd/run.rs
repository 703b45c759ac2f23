use crate::output::print_report;
use anyhow::Context;
use notices_core::adapters::Adapters;
use notices_core::config::Config;
use notices_core::orchestrator::Report;
use std::path::Path;

pub fn run(config_path: &Path, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let report = run_once(config_path, dry_run)?;
    print_report(&report, json)?;
    check_report(&report)
}

/// Turn a report with failures into a non-zero exit.
pub fn check_report(report: &Report) -> anyhow::Result<()> {
    if let Some(reason) = &report.aborted {
        anyhow::bail!("run aborted: {reason}");
    }
    if report.has_failures() {
        anyhow::bail!("{} row(s) failed", report.failed);
    }
    Ok(())
}

/// Load the configuration fresh and process the sheet once.
pub fn run_once(config_path: &Path, dry_run: bool) -> anyhow::Result<Report> {
    let config = Config::load_validated(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let adapters = if dry_run {
        Adapters::for_planning(&config)?
    } else {
        Adapters::from_config(&config)?
    };
    tracing::info!(source = %adapters.source.describe(), dry_run, "starting run");
    let report = adapters
        .run(&config, super::today(), dry_run)
        .with_context(|| format!("run against {} aborted", adapters.source.describe()))?;
    tracing::info!(
        generated = report.generated,
        skipped = report.skipped,
        failed = report.failed,
        "run finished"
    );
    Ok(report)
}
