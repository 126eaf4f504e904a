// ABOUTME: Resolves the signing identity used to authenticate SSH hops.
// ABOUTME: Loads the private key and locates the known_hosts database under ~/.ssh.

use crate::error::{Error, Result};
use russh::keys::{load_secret_key, ssh_key};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key file names probed under the SSH directory, in preference order.
const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// Signing key material plus the host-verification database, resolved once
/// and offered at every hop.
#[derive(Clone)]
pub struct Identity {
    key: Arc<ssh_key::PrivateKey>,
    known_hosts: PathBuf,
    agent_available: bool,
}

impl Identity {
    pub fn key(&self) -> Arc<ssh_key::PrivateKey> {
        Arc::clone(&self.key)
    }

    pub fn known_hosts(&self) -> &Path {
        &self.known_hosts
    }

    pub fn agent_available(&self) -> bool {
        self.agent_available
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("key", &"<private key>")
            .field("known_hosts", &self.known_hosts)
            .field("agent_available", &self.agent_available)
            .finish()
    }
}

/// The user's SSH directory, `$HOME/.ssh`.
pub fn ssh_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::Credentials("HOME is not set".to_string()))?;
    Ok(PathBuf::from(home).join(".ssh"))
}

/// Resolve the identity from an SSH directory: the first default key file
/// found (decrypted with `passphrase` if given) and the known_hosts file.
pub fn load_identity(ssh_dir: &Path, passphrase: Option<&str>) -> Result<Identity> {
    let key_path = DEFAULT_KEY_NAMES
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.exists())
        .ok_or_else(|| {
            Error::Credentials(format!(
                "no private key found in {} (tried {})",
                ssh_dir.display(),
                DEFAULT_KEY_NAMES.join(", ")
            ))
        })?;

    let key = load_secret_key(&key_path, passphrase).map_err(|e| {
        Error::Credentials(format!("unable to load key {}: {}", key_path.display(), e))
    })?;
    tracing::debug!(key = %key_path.display(), "loaded private key");

    let known_hosts = ssh_dir.join("known_hosts");
    if !known_hosts.exists() {
        return Err(Error::Credentials(format!(
            "known_hosts file not found at {}",
            known_hosts.display()
        )));
    }

    Ok(Identity {
        key: Arc::new(key),
        known_hosts,
        agent_available: agent_available(),
    })
}

/// Whether an SSH agent socket is advertised in the environment.
fn agent_available() -> bool {
    std::env::var_os("SSH_AUTH_SOCK").is_some_and(|v| !v.is_empty())
}
