use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use phishguard_learning::{
    config::DEFAULT_DATASET_PATH, PipelineConfig, TrainingOutcome, TrainingPipeline,
    TrainingReport, TrainingTelemetry,
};
use phishguard_logging::{ConsoleLogger, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "phishguard-train",
    version,
    about = "Trains, scores and persists the PhishGuard phishing classifier"
)]
struct Cli {
    /// CSV dataset with a `class` column.
    #[arg(long, default_value = DEFAULT_DATASET_PATH)]
    dataset: PathBuf,
    /// Directory receiving the model, scaler, feature names and metadata.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// Optional JSON-lines log file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Minimum level echoed to stderr (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: LogLevel,
    /// Suppresses the report on stdout; log lines still go to stderr.
    #[arg(long)]
    quiet: bool,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_dataset(&self.dataset)
            .with_output_dir(&self.output_dir)
    }

    fn telemetry(&self) -> Result<TrainingTelemetry> {
        let mut builder = TrainingTelemetry::builder("phishguard.train")
            .console(ConsoleLogger::stderr(self.log_level));
        if let Some(path) = &self.log_file {
            builder = builder.log_path(path);
        }
        builder.build().context("opening log sinks")
    }
}

fn run(cli: &Cli) -> Result<TrainingOutcome> {
    let telemetry = cli.telemetry()?;
    let run_id = telemetry.run_id();
    TrainingPipeline::new(cli.pipeline_config())
        .with_telemetry(telemetry)
        .run()
        .with_context(|| format!("training run {run_id} failed"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let outcome = run(&cli)?;
    if !cli.quiet {
        print!("{}", TrainingReport::new(&outcome).render());
    }
    Ok(())
}
