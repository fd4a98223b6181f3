use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use kinetrack::emit::{self, EmitPlan};
use kinetrack::model::{parse_params_path, ModelSearchConfig};
use kinetrack::{MeasurementTable, ReferenceWindow, StrandOrder};

/// kinetrack CLI
#[derive(Parser)]
#[command(name = "kinetrack")]
#[command(version)]
#[command(about = "Kinetics model resolution and cross-format IPD ratio emission", long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the kinetics model file chosen for a chemistry
    ResolveModel {
        /// Detected chemistry label (e.g. "P6-C4", "S/P2-C2/5.0")
        #[arg(long)]
        chemistry: String,
        /// Colon-separated model directories, scanned in order
        #[arg(long, default_value = "")]
        params_path: String,
        /// Explicit model file; wins over any search
        #[arg(long)]
        ipd_model: Option<PathBuf>,
    },

    /// Emit tabular, columnar and packed-track outputs from a measurement table
    Emit {
        /// Materialized per-strand measurements (tabular layout)
        input: PathBuf,
        /// Windows as refName:start-end (0-based, half-open); default is every reference
        #[arg(long, value_delimiter = ',')]
        reference_windows: Vec<String>,
        /// Split windows into chunks of at most this many positions
        #[arg(long)]
        reference_stride: Option<u32>,
        /// forward-first or reverse-first
        #[arg(long, default_value = "forward-first")]
        strand_order: String,
        /// Tabular output path
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Columnar (Arrow IPC) output path
        #[arg(long)]
        columnar: Option<PathBuf>,
        /// Packed-track bedGraph output path
        #[arg(long)]
        track: Option<PathBuf>,
        /// Include frac/fracLow/fracUp columns
        #[arg(long)]
        methyl_fraction: bool,
        /// Leave overflowing coordinates out of the track instead of failing
        #[arg(long)]
        skip_overflow: bool,
        /// Threads (0/None = all)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Check that tabular, columnar and packed-track outputs agree
    Verify {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        columnar: PathBuf,
        #[arg(long)]
        track: PathBuf,
        /// Write the report as JSON to this file
        #[arg(long)]
        json: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level: log::LevelFilter = cli
        .log_level
        .parse()
        .with_context(|| format!("invalid log level {:?}", cli.log_level))?;
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    match cli.command {
        Commands::ResolveModel { chemistry, params_path, ipd_model } => {
            let cfg = ModelSearchConfig::from_env(parse_params_path(&params_path), ipd_model);
            let path = cfg.resolve(&chemistry)?;
            println!("{}", path.display());
        }

        Commands::Emit {
            input,
            reference_windows,
            reference_stride,
            strand_order,
            csv,
            columnar,
            track,
            methyl_fraction,
            skip_overflow,
            threads,
        } => {
            let order: StrandOrder = strand_order.parse().map_err(anyhow::Error::msg)?;
            let table = MeasurementTable::load_csv(&input)?;
            log::info!("loaded {} measurements from {}", table.len(), input.display());

            let mut windows = if reference_windows.is_empty() {
                table.references()
            } else {
                reference_windows
                    .iter()
                    .map(|w| ReferenceWindow::parse(w))
                    .collect::<Result<Vec<_>>>()?
            };
            if let Some(stride) = reference_stride {
                let mut chunked = Vec::new();
                for w in &windows {
                    chunked.extend(w.chunks(stride)?);
                }
                windows = chunked;
            }

            let plan = EmitPlan {
                windows,
                order,
                with_fractions: methyl_fraction,
                skip_overflow,
                csv,
                columnar,
                track,
                threads: threads.filter(|&t| t > 0),
            };
            let summary = emit::run(&table, &plan)?;
            println!("rows\t{}", summary.rows);
            println!("track_entries\t{}", summary.track_entries);
            for e in &summary.skipped {
                println!("skipped\t{}", e);
            }
        }

        Commands::Verify { csv, columnar, track, json } => {
            let report = kinetrack::verify::check_files(&csv, &columnar, &track)?;
            for m in &report.mismatches {
                let row = m.row.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
                println!("{}\t{}:{}\t{}", row, m.reference, m.position, m.detail);
            }
            println!(
                "checked {} rows, {} coordinates: {}",
                report.rows_checked,
                report.coordinates_checked,
                if report.is_consistent() { "consistent" } else { "INCONSISTENT" }
            );
            if let Some(path) = &json {
                let mut f = std::fs::File::create(path).with_context(|| format!("creating {}", path))?;
                serde_json::to_writer_pretty(&mut f, &report.to_json())?;
            }
            if !report.is_consistent() {
                anyhow::bail!("{} mismatches between outputs", report.mismatches.len());
            }
        }
    }

    Ok(())
}
