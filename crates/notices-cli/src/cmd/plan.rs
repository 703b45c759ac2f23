use crate::output::{next_label, print_json, print_table};
use anyhow::Context;
use notices_core::adapters::Adapters;
use notices_core::config::Config;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load_validated(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let adapters = Adapters::for_planning(&config)?;
    let report = adapters
        .run(&config, super::today(), true)
        .with_context(|| format!("failed to read {}", adapters.source.describe()))?;

    if json {
        return print_json(&report.rows);
    }

    if report.rows.is_empty() {
        println!("No rows selected.");
        return Ok(());
    }

    let rows = report
        .rows
        .iter()
        .map(|r| {
            vec![
                r.key.clone(),
                r.row.to_string(),
                next_label(r),
                r.template.as_ref().map(|t| t.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["KEY", "ROW", "NEXT", "TEMPLATE"], rows);
    Ok(())
}
