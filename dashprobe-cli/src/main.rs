//! dashprobe binary.
//!
//! Provides two subcommands:
//! - `run` (default): execute the configured tasks and print one JSON
//!   record per task
//! - `merge`: re-merge an existing directory of CSV exports into one
//!   spreadsheet

mod config;

use clap::{Parser, Subcommand};
use config::ConfigFile;
use dashprobe_core::Runner;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "dashprobe", about = "Declarative dashboard data checks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Execute the configured tasks (default when no subcommand given)
    Run(RunArgs),

    /// Merge a directory of CSV exports into one spreadsheet
    Merge(MergeArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Path to the TOML configuration file
    #[clap(long, default_value = "dashprobe.toml")]
    config: PathBuf,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from("dashprobe.toml"),
        }
    }
}

#[derive(Parser)]
struct MergeArgs {
    /// Directory containing per-tab CSV exports
    #[clap(long)]
    dir: PathBuf,

    /// Destination spreadsheet path
    #[clap(long)]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        None => run_tasks(RunArgs::default()).await,
        Some(Command::Run(args)) => run_tasks(args).await,
        Some(Command::Merge(args)) => run_merge(args),
    }
}

async fn run_tasks(args: RunArgs) -> anyhow::Result<()> {
    let config = ConfigFile::load(&args.config)?;
    let tasks = config.tasks()?;
    let runner = Runner::new(config.runner_config())?;

    // Tasks run strictly one after another; a shared browser profile and the
    // export directory are not safe under concurrent sessions.
    let mut any_failed = false;
    for task in &tasks {
        match runner.run_task(task).await {
            Ok(record) => {
                if !record.ok {
                    any_failed = true;
                }
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            Err(err) => {
                any_failed = true;
                tracing::error!(task = %task.id, %err, "task failed to run");
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "task_id": task.id,
                        "ok": false,
                        "error": err.to_string(),
                    }))?
                );
            }
        }
    }

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}

fn run_merge(args: MergeArgs) -> anyhow::Result<()> {
    let path = dashprobe_core::export::merge_exports(&args.dir, &args.out)?;
    println!("{}", path.display());
    Ok(())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_parses_and_defaults_to_run() {
        let cli = Cli::try_parse_from(["dashprobe"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(RunArgs::default().config, PathBuf::from("dashprobe.toml"));
    }

    #[test]
    fn run_subcommand_accepts_config_flag() {
        let cli = Cli::try_parse_from(["dashprobe", "run", "--config", "custom.toml"]).unwrap();
        match cli.command {
            Some(Command::Run(args)) => {
                assert_eq!(args.config, PathBuf::from("custom.toml"));
            }
            _ => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn merge_subcommand_requires_both_paths() {
        assert!(Cli::try_parse_from(["dashprobe", "merge", "--dir", "exports"]).is_err());
        let cli =
            Cli::try_parse_from(["dashprobe", "merge", "--dir", "exports", "--out", "o.xlsx"])
                .unwrap();
        assert!(matches!(cli.command, Some(Command::Merge(_))));
    }
}
