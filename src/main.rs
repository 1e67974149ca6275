use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use conductor::{
    config::Config, core::ErrorContext, logging::Logger, orchestration::ScenarioRunner,
    ScreenResult,
};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Drive a conductor tree through a scripted scenario")]
struct Cli {
    /// Path to the scenario file
    #[arg(short, long)]
    conf: PathBuf,

    /// Output format of the final report
    #[arg(short, long, value_enum, default_value_t = Format::Yaml)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

#[tokio::main]
async fn main() -> ScreenResult<()> {
    // Read command-line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load_from_yaml(&cli.conf)?;

    // Initialize logging
    let logger = Logger::new(config.log.clone());
    logger.init_env_logger()?;
    let log_writer = logger.spawn();

    let outcome = run_scenario(&config, cli.format).await;
    match &outcome {
        Ok(()) => log::info!("Scenario finished, flushing logs"),
        Err(e) => log::error!("Scenario failed: {e}"),
    }
    let flushed = log_writer.finish().await;
    outcome.and(flushed)
}

async fn run_scenario(config: &Config, format: Format) -> ScreenResult<()> {
    let token = CancellationToken::new();
    let runner = ScenarioRunner::build(config, &token).await?;
    let report = runner.run(&token).await?;

    let rendered = match format {
        Format::Yaml => serde_yaml::to_string(&report)?,
        Format::Json => serde_json::to_string_pretty(&report).with_context("render report")?,
    };
    println!("{rendered}");
    Ok(())
}
