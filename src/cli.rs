use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "topdf")]
#[command(about = "Watch a folder and convert new office documents to PDF", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the watch-and-convert service until interrupted
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Configuration file (defaults to $TOPDF_CONFIG or config/topdf.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
