// ABOUTME: Execution coordinator: fans a command batch out over the shared transport.
// ABOUTME: Computes the run prefix once, spawns one task per command, and joins them all.

mod session;
pub mod shutdown;

pub use session::SessionError;
pub use shutdown::{ShutdownSignal, ShutdownTrigger};

use crate::config::CommandSpec;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use std::sync::Arc;

/// How one command session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Remote command ran to completion with exit status 0.
    Completed,
    /// The session failed; siblings are unaffected.
    Failed(SessionError),
    /// The session was closed early by the shutdown signal.
    Interrupted,
}

/// Runs a single command session. The transport implements this; tests
/// substitute their own runner.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    async fn run_command(
        &self,
        spec: &CommandSpec,
        prefix: &str,
        shutdown: ShutdownSignal,
    ) -> SessionOutcome;
}

/// One command's result within a batch.
#[derive(Debug)]
pub struct CommandResult {
    pub command_line: String,
    pub outcome: SessionOutcome,
}

/// Per-command results for one batch, in config order, exactly one entry
/// per configured command.
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<CommandResult>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, SessionOutcome::Failed(_)))
            .count()
    }

    pub fn interrupted(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.outcome, SessionOutcome::Interrupted))
    }
}

/// The shared filename prefix for one batch: sortable UTC wall-clock time,
/// second precision, `Z`-qualified.
fn run_prefix(unique_outputs: bool) -> String {
    if unique_outputs {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    } else {
        String::new()
    }
}

/// Run every command concurrently over `runner` and wait for all of them.
///
/// Sessions start, run, and finish independently; the only barrier is the
/// final join. A panicked task is folded into a failed outcome so the
/// report always carries one entry per command.
pub async fn run_batch<R>(
    runner: Arc<R>,
    commands: &[CommandSpec],
    unique_outputs: bool,
    shutdown: ShutdownSignal,
) -> BatchReport
where
    R: SessionRunner + 'static,
{
    let prefix = run_prefix(unique_outputs);
    if !prefix.is_empty() {
        tracing::debug!(prefix = %prefix, "applying unique output prefix");
    }

    let handles: Vec<_> = commands
        .iter()
        .map(|spec| {
            let runner = Arc::clone(&runner);
            let spec = spec.clone();
            let prefix = prefix.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { runner.run_command(&spec, &prefix, shutdown).await })
        })
        .collect();

    let outcomes = join_all(handles).await;

    let results = commands
        .iter()
        .zip(outcomes)
        .map(|(spec, joined)| CommandResult {
            command_line: spec.command_line.clone(),
            outcome: joined
                .unwrap_or_else(|e| SessionOutcome::Failed(SessionError::Aborted(e.to_string()))),
        })
        .collect();

    BatchReport { results }
}
