//! Hourly weather map plotter.
//!
//! `observations` fetches station observations for each requested date and
//! renders one map per hour and variable:
//! - Resumes after the latest map already on disk
//! - Fetches once per observation source
//! - Skips dates that are invalid, complete or whose fetch fails
//!
//! `fields` colours the pre-parsed forecast grids of one model run.

mod config;
mod fields;
mod output;
mod pipeline;
mod source;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use observations::{PlotConfig, ProcessingDate, ResumeTracker};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::PlotterConfig;
use fields::{FieldRenderer, FieldRun, ForecastProduct};
use output::PointMapRenderer;
use pipeline::{Pipeline, SessionSummary, VariablePlot};

#[derive(Parser, Debug)]
#[command(name = "obs-plotter")]
#[command(about = "Render hourly weather maps from station observations and forecast grids")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Run configuration file
    #[arg(long, global = true, env = "OBS_PLOTTER_CONFIG", default_value = "config/plotter.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render station observation maps, resuming where the last run stopped
    Observations {
        /// Dates to process as YYYYMMDD (default: today, UTC)
        dates: Vec<String>,
    },

    /// Render forecast field maps for one model run
    Fields {
        /// Directory holding the forecast grids
        #[arg(long)]
        data_dir: PathBuf,

        /// Directory to write the maps into
        #[arg(long)]
        plot_dir: PathBuf,

        /// Field to plot
        #[arg(long, value_enum)]
        product: ForecastProduct,

        /// Run date as YYYYMMDD
        date: String,

        /// Model run hour (e.g. 00, 12)
        model_run: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Observations { dates } => run_observations(&args.config, dates).await,
        Command::Fields {
            data_dir,
            plot_dir,
            product,
            date,
            model_run,
        } => {
            info!(product = product.name(), date = %date, run = %model_run, "Starting forecast plotter");
            let date = ProcessingDate::parse(&date).context("Invalid run date")?;
            let run = FieldRun::new(data_dir, plot_dir, product, date, &model_run)?;
            let renderer = FieldRenderer::new(product).context("Failed to build field colour maps")?;
            let report = fields::render_fields(&run, &renderer).await?;
            info!(rendered = report.rendered, failed = report.failed, "Forecast session complete");
            Ok(())
        }
    }
}

async fn run_observations(config_path: &Path, dates: Vec<String>) -> Result<()> {
    info!("Starting observation plotter");

    let config = PlotterConfig::load(config_path)?;

    // Every plot configuration is built before any date is touched.
    let plots = config
        .enabled_variables()
        .map(|output| -> Result<VariablePlot> {
            let plot = PlotConfig::new(output.variable)
                .with_context(|| format!("Invalid plot configuration for {}", output.variable))?;
            Ok(VariablePlot {
                config: plot,
                output_dir: output.output_dir.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if plots.is_empty() {
        warn!("No variables enabled, nothing to do");
        return Ok(());
    }
    info!(
        variables = ?plots.iter().map(|p| p.variable().name()).collect::<Vec<_>>(),
        "Configured variables"
    );

    let source = source::from_config(&config.source).context("Failed to create observation source")?;
    let renderer = PointMapRenderer::new(config.image.clone());
    let pipeline = Pipeline::new(
        source,
        Box::new(renderer),
        plots,
        ResumeTracker::new(config.default_start),
        config.contact.clone(),
        config.platform.clone(),
    );

    let now = Utc::now();
    let dates = if dates.is_empty() {
        vec![now.format("%Y%m%d").to_string()]
    } else {
        dates
    };

    let reports = pipeline.run(&dates, now).await;

    let summary = SessionSummary::from_reports(&reports);
    info!(
        dates = reports.len(),
        invalid = summary.invalid,
        complete = summary.complete,
        fetch_failed = summary.fetch_failed,
        rendered = summary.rendered,
        "Plotting session complete"
    );

    Ok(())
}
