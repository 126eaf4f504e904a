// ABOUTME: Transport establishment using russh.
// ABOUTME: Dials the hop chain, verifying host keys and authenticating at every hop.

use super::error::{Error, Result};
use crate::config::HopSpec;
use crate::credentials::Identity;
use russh::client::{self, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::check_known_hosts_path;
use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh::{Channel, Disconnect};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Order in which credentials are offered to a hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthSource {
    PrivateKey,
    Agent,
}

/// The credentials offered to a server, in order. The explicit key identity
/// always comes first; agent-held keys are appended when a socket is
/// advertised so the server may pick whichever it accepts.
pub(crate) fn auth_candidates(agent_available: bool) -> Vec<AuthSource> {
    let mut candidates = vec![AuthSource::PrivateKey];
    if agent_available {
        candidates.push(AuthSource::Agent);
    }
    candidates
}

/// Host key verification against the known_hosts database.
///
/// Strict: unknown and changed keys are both rejected, which aborts the
/// handshake before authentication.
pub(crate) struct HostVerifier {
    host: String,
    port: u16,
    known_hosts: PathBuf,
}

impl HostVerifier {
    fn new(hop: &HopSpec, known_hosts: &Path) -> Self {
        Self {
            host: hop.host.clone(),
            port: hop.port,
            known_hosts: known_hosts.to_path_buf(),
        }
    }
}

impl client::Handler for HostVerifier {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match check_known_hosts_path(&self.host, self.port, server_public_key, &self.known_hosts) {
            Ok(true) => Ok(true),
            Ok(false) => {
                tracing::warn!(host = %self.host, "host key not present in known_hosts");
                Ok(false)
            }
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::warn!(host = %self.host, "host key changed since it was recorded");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "known_hosts lookup failed");
                Ok(false)
            }
        }
    }
}

/// An authenticated transport to the final target host.
///
/// All command sessions multiplex over this one handle. A proxied transport
/// owns the transport(s) it is tunneled through; holding them keeps the
/// tunnel open for the lifetime of the batch.
pub struct Transport {
    handle: Handle<HostVerifier>,
    host: String,
    carrier: Option<Box<Transport>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("host", &self.host)
            .field("proxied", &self.carrier.is_some())
            .finish()
    }
}

impl Transport {
    /// Establish a transport to the last hop in `hops`, dialing each earlier
    /// hop in turn and tunneling the next handshake through it.
    pub async fn connect(hops: &[HopSpec], identity: &Identity) -> Result<Self> {
        let (first, rest) = hops.split_first().ok_or_else(|| Error::Connection {
            host: String::new(),
            reason: "no hops to dial".to_string(),
        })?;

        let mut transport = Self::dial(first, identity).await?;
        for hop in rest {
            transport = transport.extend_to(hop, identity).await?;
        }
        Ok(transport)
    }

    /// The host this transport terminates at.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Dial a hop directly over TCP and authenticate.
    async fn dial(hop: &HopSpec, identity: &Identity) -> Result<Self> {
        tracing::info!(host = %hop.address(), "connecting");

        let handler = HostVerifier::new(hop, identity.known_hosts());
        let mut handle = client::connect(client_config(), (hop.host.as_str(), hop.port), handler)
            .await
            .map_err(|e| connect_failure(&hop.host, e))?;

        authenticate(&mut handle, hop, identity).await?;
        tracing::info!(host = %hop.address(), "connected");

        Ok(Self {
            handle,
            host: hop.host.clone(),
            carrier: None,
        })
    }

    /// Open a tunnel through this transport to the next hop and run a full
    /// handshake plus authentication over the tunneled stream. The current
    /// transport becomes the carrier of the new one.
    async fn extend_to(self, hop: &HopSpec, identity: &Identity) -> Result<Self> {
        tracing::info!(target = %hop.address(), proxy = %self.host, "opening tunnel");

        let channel = self
            .handle
            .channel_open_direct_tcpip(&hop.host, u32::from(hop.port), "127.0.0.1", 0)
            .await
            .map_err(|e| Error::TunnelOpen {
                host: hop.host.clone(),
                proxy: self.host.clone(),
                reason: e.to_string(),
            })?;

        let handler = HostVerifier::new(hop, identity.known_hosts());
        let mut handle = client::connect_stream(client_config(), channel.into_stream(), handler)
            .await
            .map_err(|e| tunneled_handshake_failure(&hop.host, e))?;

        authenticate(&mut handle, hop, identity).await?;
        tracing::info!(host = %hop.address(), "connected through tunnel");

        Ok(Self {
            handle,
            host: hop.host.clone(),
            carrier: Some(Box::new(self)),
        })
    }

    /// Open a new session channel for one command execution.
    pub async fn open_channel(&self) -> Result<Channel<client::Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| Error::ChannelOpen(e.to_string()))
    }

    /// Disconnect the transport and any carriers, innermost first.
    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)?;
        if let Some(carrier) = self.carrier {
            Box::pin(carrier.disconnect()).await?;
        }
        Ok(())
    }
}

fn client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

fn connect_failure(host: &str, e: russh::Error) -> Error {
    match e {
        russh::Error::UnknownKey => Error::HostKeyRejected {
            host: host.to_string(),
        },
        e => Error::Connection {
            host: host.to_string(),
            reason: e.to_string(),
        },
    }
}

fn tunneled_handshake_failure(host: &str, e: russh::Error) -> Error {
    match e {
        russh::Error::UnknownKey => Error::HostKeyRejected {
            host: host.to_string(),
        },
        e => Error::TunneledHandshake {
            host: host.to_string(),
            reason: e.to_string(),
        },
    }
}

/// Offer each auth candidate in order until the server accepts one.
async fn authenticate(
    handle: &mut Handle<HostVerifier>,
    hop: &HopSpec,
    identity: &Identity,
) -> Result<()> {
    for candidate in auth_candidates(identity.agent_available()) {
        match candidate {
            AuthSource::PrivateKey => {
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(Error::Protocol)?
                    .flatten();

                let result = handle
                    .authenticate_publickey(
                        &hop.username,
                        PrivateKeyWithHashAlg::new(identity.key(), hash_alg),
                    )
                    .await
                    .map_err(Error::Protocol)?;

                if result.success() {
                    tracing::debug!(host = %hop.host, "authenticated with key identity");
                    return Ok(());
                }
            }
            AuthSource::Agent => match authenticate_via_agent(handle, &hop.username).await {
                Ok(true) => {
                    tracing::debug!(host = %hop.host, "authenticated with agent key");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(host = %hop.host, error = %e, "agent authentication skipped");
                }
            },
        }
    }

    Err(Error::AuthenticationFailed {
        host: hop.host.clone(),
        user: hop.username.clone(),
    })
}

/// Try every key the agent holds; the server may accept any of them.
async fn authenticate_via_agent(handle: &mut Handle<HostVerifier>, user: &str) -> Result<bool> {
    let mut agent = AgentClient::connect_env()
        .await
        .map_err(|e| Error::AgentUnavailable(e.to_string()))?;

    let keys = agent
        .request_identities()
        .await
        .map_err(|e| Error::AgentUnavailable(format!("failed to list agent keys: {e}")))?;

    for key in &keys {
        match handle
            .authenticate_publickey_with(user, key.clone(), None, &mut agent)
            .await
        {
            Ok(result) if result.success() => return Ok(true),
            _ => continue,
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_identity_is_always_offered_first() {
        assert_eq!(auth_candidates(false), vec![AuthSource::PrivateKey]);
        assert_eq!(
            auth_candidates(true),
            vec![AuthSource::PrivateKey, AuthSource::Agent]
        );
    }
}
