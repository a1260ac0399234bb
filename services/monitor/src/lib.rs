mod cli;
mod infra;
mod routes;
mod scheduler;
mod server;

use flat_scout::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
