use crate::output::print_json;
use anyhow::Context;
use notices_core::adapters::Adapters;
use notices_core::config::Config;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let adapters = Adapters::for_planning(&config)?;
    let names = adapters
        .source
        .sheet_names()
        .with_context(|| format!("failed to list sheets in {}", adapters.source.describe()))?;

    if json {
        return print_json(&serde_json::json!({
            "source": adapters.source.describe(),
            "configured": config.source.sheet,
            "sheets": names,
        }));
    }

    for name in &names {
        let marker = if *name == config.source.sheet { "*" } else { " " };
        // quoted so trailing spaces in sheet names stay visible
        println!("{marker} {name:?}");
    }
    if !names.contains(&config.source.sheet) {
        println!();
        println!("configured sheet {:?} not found", config.source.sheet);
    }
    Ok(())
}
