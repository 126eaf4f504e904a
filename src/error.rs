// ABOUTME: Application-wide error types for fantail.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("environment variable {0} is not set and no --config was given")]
    MissingEnvVar(&'static str),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("credential resolution failed: {0}")]
    Credentials(String),

    #[error(transparent)]
    Ssh(#[from] crate::ssh::Error),

    #[error("{failed} of {total} command(s) failed")]
    CommandsFailed { failed: usize, total: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
