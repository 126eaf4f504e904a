// ABOUTME: SSH transport module for remote hop connections.
// ABOUTME: Supports SSH agent and key-based authentication with known_hosts verification.

mod client;
mod error;

pub use client::Transport;
pub use error::{Error, Result};
