//! cricket-analytics command-line entry point
//!
//! ```bash
//! # Run with the built-in defaults (data/sample → reports)
//! cricket-analytics run
//!
//! # Use a config file, override the output and print the first rows of each report
//! cricket-analytics run --config pipeline.toml --output /tmp/reports --preview 5
//!
//! # Print the default configuration as TOML
//! cricket-analytics init-config > pipeline.toml
//! ```
//!
//! Logs go to stderr (`RUST_LOG` or `-v`); the run summary is printed to
//! stdout as JSON, on failure as well.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cricket_analytics::format::format_report;
use cricket_analytics::{Pipeline, PipelineConfig, RowPolicy};

#[derive(Parser)]
#[command(name = "cricket-analytics")]
#[command(about = "Batch cricket analytics over ball-by-ball CSV data", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, transform and report, then commit outputs
    Run {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory holding the CSV sources
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Directory the outputs replace
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Row policy for schema violations: reject or null_on_error
        #[arg(long)]
        policy: Option<RowPolicy>,

        /// Print the first N rows of every report
        #[arg(long, value_name = "N")]
        preview: Option<usize>,
    },
    /// Print the default configuration
    InitConfig,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            source,
            output,
            policy,
            preview,
        } => {
            let mut pipeline_config = match &config {
                Some(path) => PipelineConfig::load(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if let Some(source) = source {
                pipeline_config.source_dir = source;
            }
            if let Some(output) = output {
                pipeline_config.output_dir = output;
            }
            if let Some(policy) = policy {
                pipeline_config.row_policy = policy;
            }

            let pipeline = Pipeline::new(pipeline_config).context("Invalid configuration")?;
            let (summary, result) = pipeline.run();

            if let (Some(limit), Ok(tables)) = (preview, &result) {
                for table in tables {
                    println!("{}", format_report(table, limit));
                }
            }
            println!("{}", summary.to_json()?);

            if let Err(e) = result {
                bail!("Pipeline run failed: {}", e);
            }
        }
        Commands::InitConfig => {
            print!("{}", PipelineConfig::default().to_toml()?);
        }
    }
    Ok(())
}
