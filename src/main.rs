// ABOUTME: Entry point for the fantail CLI application.
// ABOUTME: Wires config and credentials into the transport and the execution batch.

mod cli;

use clap::Parser;
use cli::Cli;
use fantail::config::InvocationConfig;
use fantail::credentials;
use fantail::error::{Error, Result};
use fantail::exec::{self, SessionOutcome, shutdown};
use fantail::ssh::Transport;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Log lines go to stderr; stdout belongs to the commands' output.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = InvocationConfig::resolve_path(cli.config)?;
    let config = InvocationConfig::load(&config_path)?;

    let ssh_dir = credentials::ssh_dir()?;
    let identity = credentials::load_identity(&ssh_dir, config.key_passphrase())?;

    let transport = Transport::connect(config.hops(), &identity).await?;

    let (trigger, signal) = shutdown::channel();
    shutdown::listen_for_termination(trigger);

    let transport = Arc::new(transport);
    let report = exec::run_batch(
        Arc::clone(&transport),
        &config.commands,
        config.unique_outputs,
        signal,
    )
    .await;

    // All session tasks have joined; this is the only clone left.
    if let Ok(transport) = Arc::try_unwrap(transport) {
        if let Err(e) = transport.disconnect().await {
            tracing::warn!(error = %e, "failed to disconnect cleanly");
        }
    }

    for result in &report.results {
        match &result.outcome {
            SessionOutcome::Completed => {
                tracing::info!(command = %result.command_line, "completed");
            }
            SessionOutcome::Interrupted => {
                tracing::info!(command = %result.command_line, "interrupted");
            }
            SessionOutcome::Failed(e) => {
                tracing::error!(command = %result.command_line, error = %e, "failed");
            }
        }
    }

    let failed = report.failure_count();
    if failed > 0 {
        return Err(Error::CommandsFailed {
            failed,
            total: report.len(),
        });
    }
    Ok(())
}
