use std::path::PathBuf;

use accessmetrics_core::config::{DecodeErrorPolicy, EndOfInput, Partitioning, SinkType};
use accessmetrics_core::state::MissingValuePolicy;
use accessmetrics_core::{run_job, JobConfig, ShutdownSignal};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "accessmetrics")]
#[command(about = "Weekly per-school accessibility metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Aggregate an event stream and write weekly metrics to the sink.
    Run {
        #[command(flatten)]
        job: JobArgs,
        /// Print the final summary as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and print the effective settings.
    CheckConfig {
        #[command(flatten)]
        job: JobArgs,
    },
}

/// A TOML config file plus per-option overrides.
#[derive(Args, Debug)]
struct JobArgs {
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Input file, or `-` for stdin.
    #[arg(long)]
    input: Option<String>,
    #[arg(long)]
    window_length_ms: Option<i64>,
    #[arg(long)]
    epoch_offset_ms: Option<i64>,
    /// Weekday windows start on, e.g. `monday`.
    #[arg(long)]
    week_start: Option<String>,
    #[arg(long)]
    out_of_orderness_ms: Option<i64>,
    /// `file` or `upsert-db`.
    #[arg(long)]
    sink_type: Option<SinkType>,
    #[arg(long)]
    sink_target: Option<String>,
    #[arg(long)]
    sink_batch_size: Option<usize>,
    #[arg(long)]
    parallelism: Option<usize>,
    /// `round-robin` or `hash`.
    #[arg(long)]
    partitioning: Option<Partitioning>,
    /// `skip` or `fail`.
    #[arg(long)]
    on_decode_error: Option<DecodeErrorPolicy>,
    /// `zero` or `exclude`.
    #[arg(long)]
    missing_value: Option<MissingValuePolicy>,
    /// `flush` or `hold`.
    #[arg(long)]
    end_of_input: Option<EndOfInput>,
    #[arg(long)]
    checkpoint_path: Option<PathBuf>,
}

macro_rules! apply {
    ($config:ident, $args:ident, $($field:ident),+ $(,)?) => {
        $(if let Some(value) = $args.$field {
            $config.$field = value;
        })+
    };
}

impl JobArgs {
    fn into_config(self) -> anyhow::Result<JobConfig> {
        let mut config = match &self.config {
            Some(path) => JobConfig::load(path)?,
            None => JobConfig::default(),
        };
        let args = self;
        apply!(
            config,
            args,
            input,
            window_length_ms,
            epoch_offset_ms,
            out_of_orderness_ms,
            sink_type,
            sink_target,
            sink_batch_size,
            parallelism,
            partitioning,
            on_decode_error,
            missing_value,
            end_of_input,
        );
        if args.week_start.is_some() {
            config.week_start = args.week_start;
        }
        if args.checkpoint_path.is_some() {
            config.checkpoint_path = args.checkpoint_path;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { job, json } => {
            let config = job.into_config()?;
            let shutdown = ShutdownSignal::new();
            tokio::spawn({
                let shutdown = shutdown.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupt received, stopping after the current record");
                        shutdown.trigger();
                    }
                }
            });

            let summary = tokio::task::spawn_blocking(move || run_job(config, shutdown))
                .await
                .context("job thread panicked")??;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary);
            }
        }
        Commands::CheckConfig { job } => {
            let config = job.into_config()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
