//! CLI Entry Point for ivqc
//!
//! Provides command-line interface for:
//! - Analysing stored IV test-run records
//! - Converting raw scan CSV files into test-run records
//! - Running an IV scan against the mock instruments
//!
//! # Usage
//!
//! Analyse a record and store the result in it:
//! ```bash
//! ivqc analyse 20UPGS81100001_IV.json --depletion-voltage 20 --write
//! ```
//!
//! Convert a raw scan:
//! ```bash
//! ivqc convert scan.csv --serial 20UPGS81100001
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ivqc::acquisition::IvScan;
use ivqc::config::{IvConfig, DEFAULT_CONFIG_PATH};
use ivqc::convert::{convert_scan_file, write_scan_csv};
use ivqc::hardware::{DiodeModel, MockHygrometer, MockSourceMeter};
use ivqc::record::TestRunRecord;
use ivqc::report::Report;
use ivqc::{analyze, IvError};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ivqc")]
#[command(about = "IV curve quality control for pixel sensor tiles", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse test-run records and print a report for each
    Analyse {
        /// Test-run JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Depletion voltage in V, overrides the value stored in the record
        #[arg(long)]
        depletion_voltage: Option<f64>,

        /// Sensor area in cm², overrides the serial-number lookup
        #[arg(long)]
        area: Option<f64>,

        /// Merge the result back into each file
        #[arg(long)]
        write: bool,
    },

    /// Convert a raw scan CSV into a test-run record
    Convert {
        /// Raw scan CSV
        input: PathBuf,

        /// Sensor serial number
        #[arg(long)]
        serial: String,

        /// Depletion voltage in V to store with the record
        #[arg(long)]
        depletion_voltage: Option<f64>,

        /// Output path (default: input with .json extension)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run an IV scan on the mock instruments
    Measure {
        /// Sensor serial number
        #[arg(long)]
        serial: String,

        /// Directory for the raw CSV and the record
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Depletion voltage in V; when given the scan is analysed right away
        #[arg(long)]
        depletion_voltage: Option<f64>,

        /// Breakdown voltage magnitude of the simulated sensor
        #[arg(long)]
        mock_breakdown: Option<f64>,

        /// Skip all settle and measurement waits
        #[arg(long)]
        no_wait: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = IvConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    ivqc::logging::init_from_config(&config)?;

    match cli.command {
        Commands::Analyse {
            files,
            depletion_voltage,
            area,
            write,
        } => analyse_files(&config, &files, depletion_voltage, area, write),
        Commands::Convert {
            input,
            serial,
            depletion_voltage,
            output,
        } => {
            let path = convert_scan_file(
                &input,
                output.as_deref(),
                &serial,
                depletion_voltage,
                &config.conversion,
            )?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Commands::Measure {
            serial,
            output_dir,
            depletion_voltage,
            mock_breakdown,
            no_wait,
        } => {
            measure(
                config,
                &serial,
                &output_dir,
                depletion_voltage,
                mock_breakdown,
                no_wait,
            )
            .await
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn analyse_files(
    config: &IvConfig,
    files: &[PathBuf],
    depletion_voltage: Option<f64>,
    area: Option<f64>,
    write: bool,
) -> Result<()> {
    let mut failures = 0usize;
    for path in files {
        if let Err(e) = analyse_file(config, path, depletion_voltage, area, write) {
            error!(path = %path.display(), error = %e, "Analysis failed");
            eprintln!("{}: {:#}", path.display(), e);
            failures += 1;
        }
    }
    if failures > 0 {
        bail!("{} of {} files could not be analysed", failures, files.len());
    }
    Ok(())
}

fn analyse_file(
    config: &IvConfig,
    path: &Path,
    depletion_voltage: Option<f64>,
    area: Option<f64>,
    write: bool,
) -> Result<()> {
    let mut record = TestRunRecord::load(path)?;
    record.validate()?;

    let area = area.or_else(|| config.analysis.area_for(&record.component));
    let request = record.analysis_request(depletion_voltage, area);
    let sweep = record.sweep()?;
    let result = match analyze(&sweep, &request) {
        Err(IvError::MissingDepletionVoltage(serial)) => {
            bail!("No depletion voltage stored for {serial}; pass --depletion-voltage")
        }
        other => other?,
    };

    println!("{}", path.display());
    println!("{}", Report::new(&result));
    println!();

    if write {
        record.apply_result(&result);
        record.save(path)?;
    }
    Ok(())
}

async fn measure(
    mut config: IvConfig,
    serial: &str,
    output_dir: &Path,
    depletion_voltage: Option<f64>,
    mock_breakdown: Option<f64>,
    no_wait: bool,
) -> Result<()> {
    if no_wait {
        config.scan.wait_settle_secs = 0.0;
        config.scan.wait_meas_secs = 0.0;
        config.scan.ramp_wait_secs = 0.0;
    }

    let smu = MockSourceMeter::new(DiodeModel {
        breakdown_voltage: mock_breakdown,
        ..Default::default()
    });
    let hygrometer = MockHygrometer::default();

    let scan = IvScan::new(config.scan.clone())?;
    let outcome = scan.run(&smu, &hygrometer).await?;
    if outcome.aborted_on_compliance {
        info!(voltage = outcome.last_voltage, "Scan stopped at the leakage limit");
    }

    std::fs::create_dir_all(output_dir)?;
    let csv_path = output_dir.join(format!("{}_IV.csv", serial.trim()));
    write_scan_csv(&csv_path, &outcome.points)?;
    let json_path = convert_scan_file(
        &csv_path,
        None,
        serial,
        depletion_voltage,
        &config.conversion,
    )?;
    println!("Wrote {} and {}", csv_path.display(), json_path.display());

    if depletion_voltage.is_some() {
        analyse_file(&config, &json_path, None, None, true)?;
    }
    Ok(())
}
