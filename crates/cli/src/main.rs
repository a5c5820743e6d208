use crate::{
    error::CliError,
    shutdown::{INTERRUPTED_EXIT_CODE, RunInterrupt},
};
use clap::Parser;
use commands::Commands;
use drover_core::{
    progress::{ProgressReport, ProgressService},
    store::{QueueStore, sled_store::SledQueueStore},
};
use drover_runtime::{lifecycle::MigrationService, processor::TaskProcessor};
use model::{migration::Migration, task::MigrationTask};
use schema_lock::SchemaLockCoordinator;
use serde::de::DeserializeOwned;
use std::{path::PathBuf, sync::Arc};
use tracing::{Level, info};

mod commands;
mod error;
mod shutdown;

#[derive(Parser)]
#[command(name = "drover", version = "0.1.0", about = "Task-queue migration orchestrator")]
struct Cli {
    /// Queue state directory; defaults to ~/.drover/state
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // Initialize logger
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Create { config } => {
            let migration: Migration = read_config(&config).await?;
            let service = open_service(cli.state_dir)?;
            service.create_migration(migration).await?;
        }
        Commands::Publish { queue, config } => {
            let tasks: Vec<MigrationTask> = read_config(&config).await?;
            let service = open_service(cli.state_dir)?;

            let count = tasks.len();
            for task in tasks {
                service.publish_task(&queue, task).await?;
            }
            info!(queue = %queue, count, "tasks published");
        }
        Commands::Run { name } => {
            let service = open_service(cli.state_dir)?;

            let interrupt = RunInterrupt::install();
            service.process_tasks(&name, interrupt.token()).await?;

            if interrupt.was_interrupted() {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
        Commands::Stop { name } => {
            let service = open_service(cli.state_dir)?;
            service.stop_migration(&name).await?;
        }
        Commands::Progress { name, json } => {
            let store = open_queue_store(cli.state_dir)?;
            show_progress(store, &name, json).await?;
        }
        Commands::Schema {
            db_url,
            lock_table,
            scripts_dir,
        } => {
            let opts = mysql_async::Opts::from_url(&db_url)
                .map_err(|e| CliError::MySql(mysql_async::Error::Url(e)))?;
            let coordinator =
                SchemaLockCoordinator::new(mysql_async::Pool::new(opts), lock_table, scripts_dir);
            coordinator.run().await?;
        }
    }

    Ok(())
}

async fn read_config<T: DeserializeOwned>(path: &str) -> Result<T, CliError> {
    let source = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&source)?)
}

fn open_queue_store(state_dir: Option<PathBuf>) -> Result<Arc<dyn QueueStore>, CliError> {
    let path = match state_dir {
        Some(dir) => dir,
        None => dirs::home_dir()
            .ok_or_else(|| CliError::Unexpected("Could not determine home directory".into()))?
            .join(".drover/state"),
    };
    let store = SledQueueStore::open(&path).map_err(|err| {
        CliError::Unexpected(format!(
            "Failed to open queue store at {}: {err}",
            path.display()
        ))
    })?;
    Ok(Arc::new(store))
}

fn open_service(state_dir: Option<PathBuf>) -> Result<MigrationService, CliError> {
    let store = open_queue_store(state_dir)?;
    let processor = TaskProcessor::new(store.clone());
    Ok(MigrationService::new(store, processor))
}

async fn show_progress(
    store: Arc<dyn QueueStore>,
    name: &str,
    as_json: bool,
) -> Result<(), CliError> {
    let service = ProgressService::new(store);
    let report = service.report(name).await?;

    if as_json {
        let json = serde_json::to_string_pretty(&report).map_err(CliError::JsonSerialize)?;
        println!("{json}");
    } else {
        print_progress_table(&report);
    }

    Ok(())
}

fn print_progress_table(report: &ProgressReport) {
    println!("Progress for migration '{}':", report.migration);
    println!("-----------------------------");
    println!("{:<16} {}", "Status", report.status);
    println!("{:<16} {}", "Total tasks", report.total_tasks);
    println!("{:<16} {}", "Tasks left", report.tasks_left);
    let eta = report
        .time_left_ms
        .map(|ms| format!("{ms} ms"))
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<16} {}", "Time left", eta);
}
