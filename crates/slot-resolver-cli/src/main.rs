//! `freebusy` CLI: find common free meeting slots for a scenario file.
//!
//! ## Usage
//!
//! ```sh
//! # Free slots for a scenario (stdin → stdout)
//! cat scenario.json | freebusy slots
//!
//! # With a resolver config and JSON output
//! freebusy slots -i scenario.json -c resolver.toml --format json
//!
//! # Number of mandatory attendees busy at the start of the timeframe
//! freebusy conflicts -i scenario.json
//!
//! # Log resolver activity to stderr
//! freebusy -vv slots -i scenario.json
//! ```

mod scenario;

use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use slot_resolver::{
    ChannelObserver, ConflictResolver, Period, ResolverConfig, ResolverEvent, ResolverService,
    ResolverStatus,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::scenario::Scenario;

#[derive(Parser)]
#[command(
    name = "freebusy",
    version,
    about = "Find free meeting slots from attendee free/busy data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every free slot in the timeframe
    Slots {
        /// Scenario JSON file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Resolver config TOML file
        #[arg(short, long)]
        config: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Print the number of mandatory attendees busy at the timeframe start
    Conflicts {
        /// Scenario JSON file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Resolver config TOML file
        #[arg(short, long)]
        config: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
struct Resolution {
    slots: Vec<Period>,
    conflicts: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Slots {
            input,
            config,
            format,
        } => {
            let resolution = resolve(input.as_deref(), config.as_deref()).await?;
            match format {
                Format::Text => {
                    if resolution.slots.is_empty() {
                        println!("No free slots");
                    }
                    for slot in &resolution.slots {
                        println!(
                            "{}  {}  ({} min)",
                            slot.start().to_rfc3339(),
                            slot.end().to_rfc3339(),
                            slot.duration().num_minutes()
                        );
                    }
                }
                Format::Json => println!("{}", serde_json::to_string_pretty(&resolution)?),
            }
        }
        Commands::Conflicts {
            input,
            config,
            format,
        } => {
            let resolution = resolve(input.as_deref(), config.as_deref()).await?;
            match format {
                Format::Text => println!("{}", resolution.conflicts),
                Format::Json => println!(
                    "{}",
                    serde_json::json!({ "conflicts": resolution.conflicts })
                ),
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Run the scenario through a resolver service and wait for a settled result.
async fn resolve(input: Option<&str>, config: Option<&str>) -> Result<Resolution> {
    let scenario = Scenario::from_json(&read_input(input)?)?;
    let mut config = match config {
        Some(path) => ResolverConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path))?,
        None => ResolverConfig::default(),
    };
    scenario.apply_to(&mut config);

    let resolver =
        ConflictResolver::from_config(&config, scenario.timeframe, scenario.meeting_duration()?)
            .context("Invalid scenario policy")?;
    let (handle, task) = ResolverService::spawn(resolver, Arc::new(scenario.fetcher()));
    let (observer, mut events) = ChannelObserver::new();
    handle.subscribe(observer)?;

    for attendee in &scenario.attendees {
        handle.insert_attendee(attendee.id.clone(), attendee.role)?;
    }
    info!(attendees = scenario.attendees.len(), "scenario loaded");

    // Status events arrive in order, so the last one seen is current.
    let mut status = handle.status().await?;
    while matches!(status, ResolverStatus::Loading | ResolverStatus::Recomputing) {
        match events.recv().await {
            Some(ResolverEvent::StatusChanged(next)) => status = next,
            Some(_) => {}
            None => bail!("resolver service stopped"),
        }
    }
    debug!(?status, "all attendees loaded");

    let slots = handle.find_all_free_slots().await?;
    let conflicts = handle.conflicts().await?;

    handle.shutdown()?;
    task.await.context("resolver service panicked")?;

    Ok(Resolution { slots, conflicts })
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}
