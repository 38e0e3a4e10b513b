use clap::Parser;
use price_feeder::cli::{Cli, Commands};
use price_feeder::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    price_feeder::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Provider timeout: {}ms", config.provider_timeout_ms);
            for pair in &config.currency_pairs {
                println!(
                    "  Pair: {}/{} -> {} via {}",
                    pair.base,
                    pair.quote,
                    pair.chain_denom,
                    pair.providers.join(", ")
                );
            }
            println!("  Validator: {}", config.account.validator_address);
            println!("  Feeder: {}", config.account.feeder_address);
        }
    }

    Ok(())
}
