//! Runnel CLI - task runner for static-site asset builds.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use runnel_graph::{Completion, TaskGraph};
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod env;
mod settings;
mod tasks;

use config::Config;
use env::{Env, EnvPolicy};
use settings::{BuildMode, Settings};

#[derive(Parser)]
#[command(name = "runnel")]
#[command(about = "Task runner for static-site asset builds with a live-reloading dev server")]
#[command(version)]
pub struct Cli {
    /// Task to run
    #[arg(default_value = "default")]
    task: String,

    /// Path to runnel.toml config file
    #[arg(short, long, default_value = "runnel.toml")]
    config: PathBuf,

    /// Path to the environment file
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Build for production regardless of the environment file
    #[arg(long)]
    production: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// List tasks and their prerequisites instead of running one
    #[arg(short, long)]
    list: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt().with_env_filter(filter).with_target(false).init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let root = std::env::current_dir().context("Failed to read the working directory")?;
    let config = Config::load(&cli.config)?;

    let policy = if cli.list {
        EnvPolicy::Skip
    } else {
        EnvPolicy::for_task(&cli.task)
    };
    let env = Env::load(&cli.env_file, policy)?.with_process_env();
    let mode = BuildMode::detect(cli.production, &env);

    let settings = Arc::new(Settings::new(root, config, env, mode, &cli.task));
    let graph = tasks::build_graph(&settings)?;
    graph.validate()?;

    if cli.list {
        print_tasks(&graph);
        return Ok(ExitCode::SUCCESS);
    }

    tracing::debug!("Running '{}' in {:?} mode", cli.task, mode);
    let report = Arc::new(graph).run(&cli.task).await?;

    Ok(match report.completion {
        Completion::Terminal(code) => ExitCode::from(code),
        Completion::Done => ExitCode::SUCCESS,
    })
}

fn print_tasks(graph: &TaskGraph) {
    let width = graph.names().map(str::len).max().unwrap_or(0);
    for task in graph.tasks() {
        if task.prerequisites().is_empty() {
            println!("{}", task.name());
        } else {
            println!(
                "{:width$}  <- {}",
                task.name(),
                task.prerequisites().join(", "),
                width = width
            );
        }
    }
}
