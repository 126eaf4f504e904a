// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: The config file itself drives everything; flags only override discovery.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fantail")]
#[command(about = "Fan out commands across remote hosts over SSH and tail their output locally")]
#[command(version)]
pub struct Cli {
    /// Path to the JSON invocation config (overrides $FANTAIL_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
