//! ragtune CLI entry point.

use clap::Parser;

use ragtune::cli::{commands, handle_error, Cli, Commands};
use ragtune::infrastructure::logging::LoggerImpl;
use ragtune::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load_with(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    // Held until exit so buffered file logs are flushed.
    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Eval(args) => commands::eval::execute(args, &config, cli.json).await,
        Commands::Loop(args) => commands::tune::execute(args, &config, cli.json).await,
        Commands::Bench(args) => commands::bench::execute(args, &config, cli.json).await,
        Commands::Compare(args) => commands::compare::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
