use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geoharvest_core::config::Config;
use geoharvest_core::fetch::BrowserFetcher;
use geoharvest_core::pipeline::{CycleReport, CycleStatus, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about = "Scheduled country-population harvester", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest on a fixed interval until interrupted
    Run,
    /// Run a single harvest cycle and exit
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run => run_scheduler().await,
        Command::Once => run_once().await,
    }
}

async fn run_scheduler() -> Result<()> {
    let config = load_config()?;
    announce(&config);
    let pipeline = build_pipeline(&config)?;

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // The first tick fires immediately; cycles run back to back on the
    // ticker and never overlap. A shutdown request is only honoured between
    // cycles, so an in-flight cycle always completes.
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = pipeline.run_cycle().await;
                log_report(&report);
            }
            result = &mut shutdown => {
                if let Err(err) = result {
                    warn!("ctrl-c handler failed: {err}");
                }
                info!("Shutdown requested, exiting between cycles");
                return Ok(());
            }
        }
    }
}

async fn run_once() -> Result<()> {
    let config = load_config()?;
    announce(&config);
    let pipeline = build_pipeline(&config)?;

    let report = pipeline.run_cycle().await;
    log_report(&report);

    if report.status == CycleStatus::Failed {
        bail!(
            "harvest cycle failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn load_config() -> Result<Config> {
    dotenvy::dotenv().ok();
    Config::from_env().context("invalid harvester configuration")
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let fetcher = BrowserFetcher::new(config.settle_delay);
    Pipeline::new(config, Box::new(fetcher)).context("failed to build the harvest pipeline")
}

fn announce(config: &Config) {
    info!(
        source = %config.source_url,
        endpoint = %config.supabase_url,
        bucket = %config.supabase_bucket,
        max_files = config.max_bucket_files,
        interval_secs = config.interval.as_secs(),
        "Harvester configured"
    );
}

fn log_report(report: &CycleReport) {
    match report.status {
        CycleStatus::Uploaded => info!(
            artifact = report.artifact.as_deref().unwrap_or("-"),
            records = report.records,
            dropped = report.dropped_rows,
            evicted = report.evicted.len(),
            "Cycle uploaded a snapshot"
        ),
        CycleStatus::Skipped => info!(
            dropped = report.dropped_rows,
            reason = report.error.as_deref().unwrap_or("no records extracted"),
            "Cycle skipped"
        ),
        CycleStatus::Failed => warn!(
            error = report.error.as_deref().unwrap_or("unknown"),
            "Cycle failed"
        ),
    }
}
