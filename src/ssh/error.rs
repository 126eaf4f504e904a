// ABOUTME: SSH transport error types.
// ABOUTME: Covers dial, tunnel, host key, and authentication failures per hop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("failed to open tunnel to {host} through {proxy}: {reason}")]
    TunnelOpen {
        host: String,
        proxy: String,
        reason: String,
    },

    #[error("handshake with {host} over tunnel failed: {reason}")]
    TunneledHandshake { host: String, reason: String },

    #[error("host key for {host} rejected by known_hosts")]
    HostKeyRejected { host: String },

    #[error("authentication failed for {user}@{host}: no offered credential was accepted")]
    AuthenticationFailed { host: String, user: String },

    #[error("SSH agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("failed to open session channel: {0}")]
    ChannelOpen(String),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
