//! Command-line interface components.

use crate::config::PipelineConfig;
use crate::constants::DEFAULT_DATA_DIR;
use crate::models::{PipelineStats, SensorType};
use colored::*;
use std::path::PathBuf;
use tracing::debug;

#[derive(clap::Parser, Debug)]
#[command(name = "causal-join")]
#[command(about = "Join air-quality sensor readings with weather observations for causal discovery")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Base data directory containing raw/, intermediate/ and processed/
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Sensor type to join (bme280, sds011, pms)
    #[arg(short, long, default_value = "bme280")]
    pub sensor_type: SensorType,

    /// Sensor aggregation window in minutes
    #[arg(short, long, default_value_t = crate::constants::DEFAULT_GRANULARITY_MINUTES)]
    pub granularity: u32,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet
    }

    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig::new(&self.data_dir)
            .with_sensor_type(self.sensor_type)
            .with_granularity_minutes(self.granularity)
    }
}

/// Install the tracing subscriber; `RUST_LOG` takes precedence over the flags
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("causal_join={}", log_level)));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
}

pub fn print_banner(config: &PipelineConfig) {
    println!("{}", "Starting causal-join pipeline".bright_green().bold());
    println!("  {} {}", "Data:".bright_cyan(), config.data_dir.display());
    println!("  {} {}", "Sensor type:".bright_cyan(), config.sensor_type);
    println!(
        "  {} {} minutes",
        "Granularity:".bright_cyan(),
        config.granularity_minutes
    );
}

pub fn print_summary(stats: &PipelineStats) {
    println!("\n{}", "Join Summary".bright_green().bold());
    println!(
        "  {} {} rows from {} files",
        "Sensor:".bright_cyan(),
        stats.sensor_rows.to_string().bright_white().bold(),
        stats.sensor_files
    );
    println!(
        "  {} {} rows",
        "Mapping:".bright_cyan(),
        stats.mapping_rows.to_string().bright_white().bold()
    );
    println!(
        "  {} {} rows",
        "Weather:".bright_cyan(),
        stats.weather_rows.to_string().bright_white().bold()
    );
    let output_rows = if stats.output_rows == 0 {
        stats.output_rows.to_string().bright_red().bold()
    } else {
        stats.output_rows.to_string().bright_white().bold()
    };
    println!("  {} {} rows", "Output:".bright_cyan(), output_rows);
    println!("  {} {}", "Written to:".bright_cyan(), stats.output_path.display());
    println!(
        "  {} {:.2}s",
        "Elapsed:".bright_cyan(),
        stats.processing_time_ms as f64 / 1000.0
    );
}
