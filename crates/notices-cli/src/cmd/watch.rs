use crate::output::print_report;
use anyhow::Context;
use notices_core::config::Config;
use std::path::Path;
use std::time::Duration;

pub fn run(
    config_path: &Path,
    interval: Option<u64>,
    once: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let secs = interval.unwrap_or(config.thresholds.watch_interval_secs);
    if secs == 0 && !once {
        anyhow::bail!("watch interval must be greater than zero");
    }

    let mut cycle: u64 = 0;
    loop {
        cycle += 1;
        tracing::info!(cycle, "watch cycle starting");
        match super::run::run_once(config_path, false) {
            Ok(report) => {
                print_report(&report, json)?;
                if once {
                    return super::run::check_report(&report);
                }
                if let Some(reason) = &report.aborted {
                    tracing::error!(cycle, %reason, "watch cycle aborted");
                }
            }
            Err(e) if once => return Err(e),
            Err(e) => tracing::error!(cycle, error = %format!("{e:#}"), "watch cycle failed"),
        }
        tracing::info!(next_in_secs = secs, "sleeping");
        std::thread::sleep(Duration::from_secs(secs));
    }
}
