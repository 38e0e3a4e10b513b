//! CLI interface for the price feeder
//!
//! Provides subcommands for:
//! - `run`: Start the feeder against the configured chain
//! - `config`: Show the loaded configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "price-feeder")]
#[command(about = "Validator-side price oracle feeder")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the feeder
    Run(RunArgs),
    /// Show the loaded configuration
    Config,
}
