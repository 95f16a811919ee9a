use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Personal-site backend: photography gallery management and request logging.
#[derive(Debug, Parser)]
#[command(name = "shutter", version, about)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON, by extension).
    #[arg(long, short, global = true, env = "SHUTTER_CONFIG")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP server.
    Serve,
    /// Rebuild the photo collections from the sidecars once, then exit.
    Reload {
        /// Upsert over the existing collections instead of recreating them.
        #[arg(long)]
        incremental: bool,
    },
}
