mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use topdf::config::Config;
use topdf::{observability, service};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = Config::load(args.config)?;
            service::run(config).await?
        }
    }

    Ok(())
}
