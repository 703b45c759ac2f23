use crate::output::print_json;
use anyhow::Context;
use notices_core::scaffold;
use std::path::Path;

pub fn run(dir: &Path, sample: bool, json: bool) -> anyhow::Result<()> {
    let report = scaffold::init(dir, sample)
        .with_context(|| format!("failed to initialize {}", dir.display()))?;

    if json {
        return print_json(&report);
    }

    println!("Initializing notices in: {}", dir.display());
    let shown = |p: &Path| p.strip_prefix(dir).unwrap_or(p).display().to_string();
    for p in &report.created {
        println!("  created: {}", shown(p));
    }
    for p in &report.existing {
        println!("  exists:  {}", shown(p));
    }
    println!();
    println!("Next: edit notices.yaml to match your tracker, then run 'notices plan'.");
    Ok(())
}
