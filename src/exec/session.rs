// ABOUTME: One command session: a single channel on the shared transport.
// ABOUTME: Streams remote stdout to the resolved sink, racing against shutdown.

use super::shutdown::ShutdownSignal;
use super::{SessionOutcome, SessionRunner};
use crate::config::CommandSpec;
use crate::sink;
use crate::ssh::Transport;
use async_trait::async_trait;
use russh::ChannelMsg;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    ChannelOpen(crate::ssh::Error),

    #[error(transparent)]
    Sink(#[from] sink::Error),

    #[error("failed to start remote command: {0}")]
    Exec(russh::Error),

    #[error("write to output sink failed: {0}")]
    SinkWrite(std::io::Error),

    #[error("remote command exited with status {exit_code}{}", stderr_excerpt(.stderr))]
    CommandFailed { exit_code: u32, stderr: String },

    #[error("session channel closed before reporting an exit status")]
    ChannelClosed,

    #[error("session task aborted: {0}")]
    Aborted(String),
}

fn stderr_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

#[async_trait]
impl SessionRunner for Transport {
    async fn run_command(
        &self,
        spec: &CommandSpec,
        prefix: &str,
        shutdown: ShutdownSignal,
    ) -> SessionOutcome {
        run(self, spec, prefix, shutdown).await
    }
}

/// Execute one command over a fresh channel, binding its sink before any
/// bytes flow and reporting exactly one outcome on every path.
pub(crate) async fn run(
    transport: &Transport,
    spec: &CommandSpec,
    prefix: &str,
    shutdown: ShutdownSignal,
) -> SessionOutcome {
    let mut channel = match transport.open_channel().await {
        Ok(channel) => channel,
        Err(e) => return SessionOutcome::Failed(SessionError::ChannelOpen(e)),
    };

    let mut sink = match sink::resolve(spec.output_file(), prefix).await {
        Ok(sink) => sink,
        Err(e) => return SessionOutcome::Failed(e.into()),
    };

    if let Err(e) = channel.exec(true, spec.command_line.as_str()).await {
        return SessionOutcome::Failed(SessionError::Exec(e));
    }
    tracing::debug!(command = %spec.command_line, "command started");

    let mut shutdown_watch = shutdown.clone();
    let interrupted = shutdown_watch.triggered();
    tokio::pin!(interrupted);

    let mut stderr = Vec::new();
    let mut exit_code = None;
    let mut got_eof = false;

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                let _ = channel.close().await;
                let _ = sink.flush().await;
                tracing::debug!(command = %spec.command_line, "session closed by interrupt");
                return SessionOutcome::Interrupted;
            }
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    if let Err(e) = sink.write_all(&data).await {
                        return SessionOutcome::Failed(SessionError::SinkWrite(e));
                    }
                    // Tail semantics: bytes must be visible as they arrive.
                    let _ = sink.flush().await;
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = Some(exit_status);
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelMsg::Eof) => {
                    got_eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                Some(ChannelMsg::Close) => break,
                Some(_) => {}
                None => break,
            }
        }
    }

    let _ = sink.flush().await;

    match exit_code {
        Some(0) => SessionOutcome::Completed,
        Some(code) => SessionOutcome::Failed(SessionError::CommandFailed {
            exit_code: code,
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        }),
        // No exit status: either the interrupt closed the channel under us,
        // or the connection dropped abnormally.
        None if shutdown.is_triggered() => SessionOutcome::Interrupted,
        None => SessionOutcome::Failed(SessionError::ChannelClosed),
    }
}
