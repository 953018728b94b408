use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tarpot",
    version,
    about = "SSH + Telnet deception server"
)]
pub struct Cli {
    /// Path to configuration file (also settable via TARPOT_CONFIG env var)
    #[arg(short, long, default_value = "config.toml", env = "TARPOT_CONFIG")]
    pub config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate configuration file and print a summary
    CheckConfig,
    /// Write a default configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}
