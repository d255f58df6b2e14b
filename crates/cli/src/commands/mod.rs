use clap::Subcommand;
use std::path::PathBuf;

pub mod config;
pub mod simulate;

use self::simulate::SimulateArgs;

#[derive(Subcommand)]
pub enum Commands {
    /// Insert keys under virtual time and report task and memory pressure
    #[command(visible_alias = "sim")]
    Simulate(SimulateArgs),

    /// Print the effective cache settings as JSON
    Config {
        /// JSON settings file; `BLOCKTTL_*` variables still take precedence
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl Commands {
    pub async fn execute(self) -> eyre::Result<()> {
        match self {
            Commands::Simulate(args) => simulate::execute(args),
            Commands::Config { file } => config::execute(file.as_deref()).await,
        }
    }
}
