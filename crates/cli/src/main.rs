use clap::Parser;

mod commands;
mod logging;

use commands::Commands;

#[derive(Parser)]
#[command(name = "blockttl")]
#[command(about = "Explore coalesced TTL expiry", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    logging::init()?;

    let cli = Cli::parse();
    cli.command.execute().await
}
