use anyhow::Context;
use causal_join::cli::{self, Args};
use causal_join::{JoinPipeline, PipelineError, PipelineStats};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::process;
use std::time::Duration;

fn main() {
    let args = Args::parse();
    cli::setup_logging(&args);

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    match runtime.block_on(run(args)) {
        Ok(_) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<PipelineStats> {
    let config = args.to_config();
    config
        .validate()
        .with_context(|| format!("Invalid configuration for {}", config.data_dir.display()))?;

    if args.show_progress() {
        cli::print_banner(&config);
    }

    let progress = if args.show_progress() {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?,
        );
        pb.set_message(format!("Joining {} readings with weather data...", config.sensor_type));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let pipeline = JoinPipeline::with_polars(config);
    let task = tokio::task::spawn_blocking(move || pipeline.run());

    let result = tokio::select! {
        joined = task => joined.context("Pipeline task panicked")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to install CTRL+C signal handler")?;
            eprintln!("\nReceived CTRL+C, shutting down...");
            Err(PipelineError::ProcessingInterrupted {
                reason: "Processing interrupted by user; output file is incomplete".to_string(),
            })
        }
    };

    if let Some(pb) = &progress {
        match &result {
            Ok(_) => pb.finish_with_message("Join completed"),
            Err(_) => pb.abandon_with_message("Join failed"),
        }
    }

    let stats = result.context("Pipeline run failed")?;
    if args.show_progress() {
        cli::print_summary(&stats);
    }
    Ok(stats)
}
