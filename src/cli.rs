// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "av2-bridge")]
#[command(author, version)]
#[command(about = "Keeps an AV2 amplifier in step with the television and the local player")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "/etc/av2-bridge.toml")]
    pub config: PathBuf,

    /// Serial control port (overrides the config file)
    #[arg(short, long)]
    pub device: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge daemon (default)
    Run,

    /// Decode and print every status frame the device sends
    #[command(visible_aliases = ["mon", "m"])]
    Monitor {
        /// Print parsed frames as JSON
        #[arg(long)]
        json: bool,
    },
}
