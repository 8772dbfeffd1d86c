pub mod commands;
pub mod prompt;

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use mediaqueue_core::{
    load_queue_config, prompt_for_policy, EntryOutcome, OperatorPrompt, QueueConfig, QueueRunner,
    RunReport,
};
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::commands::RunArgs;
use crate::prompt::TerminalPrompt;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] mediaqueue_core::ConfigError),
    #[error("{0}")]
    Queue(#[from] mediaqueue_core::QueueError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("interrupted")]
    Interrupted,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Download and mux a queue of video links", long_about = None)]
pub struct Cli {
    /// Path to mediaqueue.toml; built-in defaults are used when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output format of the final report
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a link list
    Run(RunArgs),
}

pub fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => {
            init_tracing(args.verbose);
            let config = resolve_config(cli.config.as_deref(), args)?;
            let prompt = match prompt_for_policy(config.identity.missing_number) {
                Some(prompt) => prompt,
                None => Arc::new(TerminalPrompt::stdin()) as Arc<dyn OperatorPrompt>,
            };
            let runner = QueueRunner::new(Arc::new(config), prompt)?
                .with_refresh_metadata(args.refresh_metadata);
            let report = execute(&runner, &args.file)?;
            render(&report, cli.format)?;
        }
    }
    Ok(())
}

/// Runs the queue until it finishes or the operator interrupts it. Dropping
/// the queue future kills the running tool and restores renamed files.
fn execute(runner: &QueueRunner, link_list: &std::path::Path) -> Result<RunReport> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async {
        tokio::select! {
            report = runner.run(link_list) => report.map_err(AppError::from),
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, pending entries stay in the queue");
                Err(AppError::Interrupted)
            }
        }
    });
    // A terminal read may still be parked on stdin; do not wait for it.
    runtime.shutdown_background();
    result
}

pub fn resolve_config(path: Option<&std::path::Path>, args: &RunArgs) -> Result<QueueConfig> {
    let mut config = match path {
        Some(path) => load_queue_config(path)?,
        None => QueueConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// `RUST_LOG` wins; otherwise `--verbose` switches the core crate to debug.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "info,mediaqueue_core=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let detail = match &entry.outcome {
                EntryOutcome::Completed { output, .. } => output.display().to_string(),
                EntryOutcome::Skipped { reason } => reason.to_string(),
                EntryOutcome::Failed { reason } | EntryOutcome::Abandoned { reason } => {
                    reason.clone()
                }
            };
            let _ = writeln!(
                out,
                "#{:<4} {:<10} {}",
                entry.index,
                entry.outcome.label(),
                detail
            );
        }
        let _ = write!(
            out,
            "completed: {} | skipped: {} | failed: {} | abandoned: {}",
            self.completed(),
            self.skipped(),
            self.failed(),
            self.abandoned()
        );
        out
    }
}
