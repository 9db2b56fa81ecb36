mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use imagepress::config::Config;
use imagepress::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = Config::load_with(cli.config)?;
    observability::init_tracing(&config.telemetry);

    match cli.command {
        Commands::Worker => server::run_worker(config).await?,
        Commands::Enqueue(args) => server::enqueue(&config, args.task_id, args.urls)?,
        Commands::DeadLetters(args) => server::dead_letters(&config, args.from, args.limit)?,
        Commands::Record(args) => server::record(&config, &args.task_id)?,
    }

    Ok(())
}
