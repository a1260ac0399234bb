use crate::{scheduler, server};
use clap::{Args, Parser, Subcommand};
use flat_scout::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Flat Scout Monitor",
    about = "Match rental listings against saved searches and deliver new ones",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and the periodic monitor (default command)
    Serve(ServeArgs),
    /// Run a single monitoring cycle and print its report
    RunOnce(StoreArgs),
    /// Delete delivery records older than the retention window
    Prune(PruneArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct StoreArgs {
    /// Override MONITOR_DB_PATH
    #[arg(long)]
    pub(crate) db_path: Option<PathBuf>,
    /// JSON file of normalized listings served by the fixture sources
    #[arg(long)]
    pub(crate) listings: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

#[derive(Args, Debug)]
pub(crate) struct PruneArgs {
    /// Override MONITOR_DB_PATH
    #[arg(long)]
    pub(crate) db_path: Option<PathBuf>,
    /// Retention window in days (at least 30)
    #[arg(long, value_parser = clap::value_parser!(u32).range(30..))]
    pub(crate) retention_days: Option<u32>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::RunOnce(args) => scheduler::run_once_command(args).await,
        Command::Prune(args) => scheduler::prune_command(args),
    }
}
