mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "notices",
    about = "Generate resident access letters from a tracker workbook and record what was sent",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to notices.yaml (default: search upward from the current directory)
    #[arg(long, global = true, env = "NOTICES_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create notices.yaml, starter templates and a tracker workbook
    Init {
        /// Fill the new workbook with example residents
        #[arg(long)]
        sample: bool,
    },

    /// Show which letter each selected row would get today
    Plan,

    /// Generate, print and record the next letter for every due row
    Run {
        /// Decide only; write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Repeat `run` on an interval
    Watch {
        /// Seconds between runs (default: thresholds.watch_interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// List worksheet names in the configured workbook
    Sheets,

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Watch { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let explicit = cli.config.as_deref();

    let result = match cli.command {
        Commands::Init { sample } => cmd::init::run(&root::init_dir(explicit), sample, cli.json),
        Commands::Plan => root::resolve_config(explicit).and_then(|p| cmd::plan::run(&p, cli.json)),
        Commands::Run { dry_run } => {
            root::resolve_config(explicit).and_then(|p| cmd::run::run(&p, dry_run, cli.json))
        }
        Commands::Watch { interval, once } => root::resolve_config(explicit)
            .and_then(|p| cmd::watch::run(&p, interval, once, cli.json)),
        Commands::Sheets => {
            root::resolve_config(explicit).and_then(|p| cmd::sheets::run(&p, cli.json))
        }
        Commands::Config { subcommand } => {
            root::resolve_config(explicit).and_then(|p| cmd::config::run(&p, subcommand, cli.json))
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
