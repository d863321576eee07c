// t0match - Main Entry Point
// Copyright (C) 2026 - t0match contributors
// Licensed under GPL v3

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use t0match::config::Config;
use t0match::evtime::MomentumFilter;
use t0match::output::{CsvOutput, JsonOutput, ResultSink, SummaryOutput};
use t0match::pipeline::Pipeline;
use t0match::runner::{self, TimeframeSource};
use t0match::simulate::{self, SimulationParams};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    init_logging(config.verbose);

    info!("Starting t0match");

    let pipeline = Pipeline::new(config.pipeline_config()?).with_filter(MomentumFilter {
        max_p: config.momentum_limit()?,
    });

    // Inputs
    let mut sources: Vec<TimeframeSource> = config
        .inputs
        .iter()
        .cloned()
        .map(TimeframeSource::File)
        .collect();
    if config.simulate > 0 {
        let params = SimulationParams {
            axis: pipeline.config().axis,
            interactions: config.interactions,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(config.seed);
        for i in 0..config.simulate {
            let first_orbit = params.first_orbit(i as u64)?;
            let tf = simulate::generate(i as u64, first_orbit, &params, &mut rng);
            sources.push(TimeframeSource::Generated(tf));
        }
        info!("Generated {} synthetic timeframes (seed {})", config.simulate, config.seed);
    }
    if sources.is_empty() {
        warn!("No input timeframes! Pass timeframe files or --simulate N");
    }

    // Outputs
    let mut sinks: Vec<Box<dyn ResultSink>> = Vec::new();
    for path in &config.write_csv {
        info!("Writing CSV results to {}", path.display());
        match CsvOutput::create(path) {
            Ok(out) => sinks.push(Box::new(out)),
            Err(e) => error!("Failed to open CSV output file {}: {}", path.display(), e),
        }
    }
    for path in &config.write_json {
        info!("Writing JSON results to {}", path.display());
        match JsonOutput::create(path) {
            Ok(out) => sinks.push(Box::new(out)),
            Err(e) => error!("Failed to open JSON output file {}: {}", path.display(), e),
        }
    }
    sinks.push(Box::new(SummaryOutput::new(config.work_dir.clone())));

    // Ctrl+C stops every timeframe at its next cluster
    let abort = Arc::new(AtomicBool::new(false));
    let abort_on_signal = abort.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal (Ctrl+C)");
                abort_on_signal.store(true, Ordering::Relaxed);
            }
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    });

    let report = runner::run(
        Arc::new(pipeline),
        sources,
        sinks,
        config.max_parallel,
        abort,
    )
    .await;

    let clusters: usize = report.summaries.iter().map(|s| s.clusters).sum();
    let same_bc: usize = report.summaries.iter().map(|s| s.same_bc_matches).sum();
    info!(
        "Stopped. {} timeframes, {} failed, {} clusters, {} same-BC matches",
        report.processed, report.failed, clusters, same_bc
    );

    if report.failed > 0 {
        return Err(format!("{} timeframes failed", report.failed).into());
    }
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_span_events(if verbose {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    if verbose {
        subscriber.with_max_level(tracing::Level::DEBUG).init();
        info!("Verbose logging enabled (DEBUG level)");
    } else {
        subscriber.with_max_level(tracing::Level::INFO).init();
    }
}
