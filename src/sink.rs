// ABOUTME: Output sink resolution for command sessions.
// ABOUTME: Routes a session's stdout to the terminal or a freshly created local file.

use thiserror::Error;
use tokio::io::AsyncWrite;

/// A byte-stream destination bound to one session for its whole lifetime.
pub type Sink = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create output file {path}: {source}")]
    Create {
        path: String,
        source: std::io::Error,
    },
}

/// The local filename for a file-bound command: the batch prefix joined
/// with a dash when present, the bare name otherwise.
pub fn composed_file_name(output_file: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        output_file.to_string()
    } else {
        format!("{prefix}-{output_file}")
    }
}

/// Resolve the sink for a command. No file configured means the shared
/// process stdout; concurrent sessions may interleave there. A configured
/// file is created (or truncated) up front, before any bytes arrive.
pub async fn resolve(output_file: Option<&str>, prefix: &str) -> Result<Sink, Error> {
    match output_file {
        None => Ok(Box::new(tokio::io::stdout())),
        Some(name) => {
            let path = composed_file_name(name, prefix);
            let file = tokio::fs::File::create(&path)
                .await
                .map_err(|source| Error::Create {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(path = %path, "routing output to file");
            Ok(Box::new(file))
        }
    }
}
