#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `upzone`: parcel redevelopment feasibility from the command line.
//!
//! Uses `indicatif-log-bridge` (via [`upzone_cli_utils::init_logger`]) so
//! log lines and the evaluation progress bar share the terminal.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use upzone_cli_utils::IndicatifProgress;
use upzone_config::{AssemblyMode, EngineConfig};
use upzone_parcel_models::Scenario;
use upzone_pipeline::RunSummary;

#[derive(Parser)]
#[command(name = "upzone", about = "Parcel redevelopment feasibility engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every parcel under every zoning scenario and write results
    Run {
        /// Directory holding the input layers and tables
        #[arg(long)]
        data_dir: PathBuf,
        /// Engine configuration (TOML). Built-in defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory the result tables are written to
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Lot assembly mode, overriding the config: none, block, or owner
        #[arg(long, value_parser = parse_assembly)]
        assembly: Option<AssemblyMode>,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Engine configuration (TOML) to merge over the defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn parse_assembly(raw: &str) -> Result<AssemblyMode, String> {
    raw.parse()
        .map_err(|_| format!("expected none, block, or owner; got '{raw}'"))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, upzone_config::ConfigError> {
    path.map_or_else(|| Ok(EngineConfig::default()), EngineConfig::load)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            data_dir,
            config,
            output_dir,
            assembly,
        } => {
            let multi = upzone_cli_utils::init_logger();
            let start = Instant::now();

            let mut config = load_config(config.as_deref())?;
            if let Some(mode) = assembly {
                config.assembly.mode = mode;
            }

            let progress = IndicatifProgress::lots_bar(&multi, "Building reference tables");
            let output = upzone_pipeline::run(&data_dir, &config, &progress)?;
            let written = upzone_pipeline::output::write_outputs(&output_dir, &output)?;

            for path in &written {
                log::info!("Wrote {}", path.display());
            }
            print_summary(&output.summary);
            log::info!("Finished in {:.1}s", start.elapsed().as_secs_f64());
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Snapshot {}", summary.snapshot_date);
    if summary.degraded_market {
        println!("Market calibration ran on static fallbacks (no sales table)");
    }
    println!(
        "{} parcels loaded, {} eligible, {} lots evaluated ({} assembled)",
        summary.parcels_loaded,
        summary.parcels_eligible,
        summary.lots_evaluated,
        summary.lots_assembled,
    );
    println!(
        "{} lots buildable at highest and best use, {} new units across {} neighborhoods",
        summary.buildable_lots, summary.hbu_units, summary.neighborhoods,
    );
    println!();
    println!("{:<30} {:>10}", "Scenario", "Units");
    for scenario in Scenario::ALL {
        let units = summary.scenario_units.get(&scenario).copied().unwrap_or(0);
        println!("{:<30} {units:>10}", scenario.as_ref());
    }
}
