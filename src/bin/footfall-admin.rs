use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use footfall::config::Config;
use footfall::models::Dimension;
use footfall::storage;

#[derive(Parser)]
#[command(name = "footfall-admin")]
#[command(about = "Footfall counter maintenance CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print current visit totals
    Totals,
    /// Delete a single counter
    Reset {
        /// Counter key: TOTAL, COUNTRY#<code> or DEVICE#<mobile|tablet|desktop>
        dimension_key: String,
    },
    /// Physically delete expired deduplication markers
    PruneLocks,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let stores = storage::open(&config.database).await?;

    match cli.command {
        Commands::Totals => {
            let totals = stores.counters.get_totals().await?;
            println!("{:<20} {}", "Total visits", totals.total);
            println!("{}", "-".repeat(40));
            println!("{:<20} {}", "mobile", totals.by_device.mobile);
            println!("{:<20} {}", "tablet", totals.by_device.tablet);
            println!("{:<20} {}", "desktop", totals.by_device.desktop);
            println!("{}", "-".repeat(40));
            if totals.by_country.is_empty() {
                println!("No country counters yet.");
            }
            for (country, count) in &totals.by_country {
                println!("{:<20} {}", country, count);
            }
        }
        Commands::Reset { dimension_key } => {
            let Some(dimension) = Dimension::parse_key(&dimension_key) else {
                bail!(
                    "unrecognised counter key '{}'; expected TOTAL, COUNTRY#<code> or DEVICE#<class>",
                    dimension_key
                );
            };
            if stores.counters.reset(&dimension).await? {
                println!("✓ Removed counter '{}'", dimension.key());
            } else {
                println!("⚠ Counter '{}' did not exist", dimension.key());
            }
        }
        Commands::PruneLocks => {
            let removed = stores.dedup.prune_expired().await?;
            println!("✓ Removed {} expired deduplication markers", removed);
        }
    }

    Ok(())
}
