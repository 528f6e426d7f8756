//! ndvicube CLI - command-line interface
//!
//! Builds gap-free dekadal NDVI composites for an area of interest.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::run::RunArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "ndvicube", version, about, long_about = None)]
struct Cli {
    /// Log progress details (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the dekadal NDVI cube for an AOI and write it out
    Run {
        /// GeoJSON file with the area of interest
        #[arg(long, default_value = "data/input/AOI_for_test.geojson")]
        aoi: PathBuf,

        /// First day of the interval (YYYY-MM-DD or RFC 3339)
        #[arg(long, default_value = "2025-08-01")]
        start: String,

        /// Last day of the interval (YYYY-MM-DD or RFC 3339)
        #[arg(long, default_value = "2025-08-31")]
        end: String,

        /// Output directory (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Leave gaps missing instead of filling them from CLMS
        #[arg(long)]
        no_gap_fill: bool,

        /// Maximum cloud cover in percent (exclusive)
        #[arg(long)]
        max_cloud_cover: Option<f64>,

        /// Concurrent raster downloads
        #[arg(long)]
        threads: Option<usize>,
    },

    /// List the dekadal target dates of an interval
    Targets {
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,
    },

    /// Show how an AOI is split into raster requests
    Tiles {
        #[arg(long)]
        aoi: PathBuf,

        /// Metres per pixel (default: from config)
        #[arg(long)]
        resolution: Option<f64>,
    },

    /// Create or update ~/.ndvicube/config.ini
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Targets { start, end } => commands::targets::run(&start, &end),
        Commands::Init => commands::init::run(),
        Commands::Tiles { aoi, resolution } => {
            let runner = CliRunner::new(cli.verbose, cli.log_file.as_deref())?;
            runner.log_startup("tiles");
            commands::tiles::run(&aoi, resolution, runner.config())
        }
        Commands::Run {
            aoi,
            start,
            end,
            output,
            no_gap_fill,
            max_cloud_cover,
            threads,
        } => {
            let runner = CliRunner::new(cli.verbose, cli.log_file.as_deref())?;
            commands::run::run(
                RunArgs {
                    aoi,
                    start,
                    end,
                    output,
                    no_gap_fill,
                    max_cloud_cover,
                    threads,
                },
                &runner,
            )
        }
    }
}
