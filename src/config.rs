// ABOUTME: Invocation configuration types and JSON parsing.
// ABOUTME: Flattens the recursive proxy shape of the wire format into a hop chain.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the JSON configuration file.
pub const CONFIG_ENV: &str = "FANTAIL_CONFIG";

/// One SSH endpoint in the chain leading to the final target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopSpec {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl HopSpec {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One remote command and where its output goes.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandSpec {
    /// Command line executed on the remote side.
    #[serde(rename = "command")]
    pub command_line: String,

    /// Local file receiving the command's stdout. Absent or empty
    /// means the shared process stdout.
    #[serde(rename = "file", default)]
    output_file: Option<String>,
}

impl CommandSpec {
    pub fn new(command_line: impl Into<String>, output_file: Option<String>) -> Self {
        Self {
            command_line: command_line.into(),
            output_file,
        }
    }

    /// The configured output file, with the wire format's empty string
    /// normalized to the stdout route.
    pub fn output_file(&self) -> Option<&str> {
        self.output_file.as_deref().filter(|f| !f.is_empty())
    }
}

/// A parsed, validated invocation: where to connect and what to run.
///
/// Hops are stored in dial order - proxies first, final target last - so
/// the transport establisher just folds over the list.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    hops: Vec<HopSpec>,
    key_passphrase: Option<String>,
    pub commands: Vec<CommandSpec>,
    pub unique_outputs: bool,
}

impl InvocationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig =
            serde_json::from_str(json).map_err(|e| Error::ConfigParse(e.to_string()))?;
        raw.validate()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    /// Resolve the config path from the CLI override or the environment.
    pub fn resolve_path(cli_override: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = cli_override {
            return Ok(path);
        }
        match std::env::var(CONFIG_ENV) {
            Ok(value) if !value.is_empty() => Ok(PathBuf::from(value)),
            _ => Err(Error::MissingEnvVar(CONFIG_ENV)),
        }
    }

    /// All hops in dial order; the last one is the final target.
    pub fn hops(&self) -> &[HopSpec] {
        &self.hops
    }

    /// The final target hop.
    pub fn target(&self) -> &HopSpec {
        self.hops.last().expect("validated config has at least one hop")
    }

    pub fn key_passphrase(&self) -> Option<&str> {
        self.key_passphrase.as_deref().filter(|p| !p.is_empty())
    }
}

/// The wire format: the original recursive shape, one nested proxy per level.
#[derive(Debug, Deserialize)]
struct RawConfig {
    username: String,

    #[serde(default = "default_port")]
    port: u16,

    host: String,

    #[serde(default)]
    passphrase: Option<String>,

    #[serde(rename = "proxyConfig", default)]
    proxy_config: Option<Box<RawConfig>>,

    #[serde(default)]
    aliased: bool,

    #[serde(rename = "aliasString", default)]
    alias_string: Option<String>,

    #[serde(default)]
    commands: Vec<CommandSpec>,

    #[serde(default)]
    unique: bool,
}

fn default_port() -> u16 {
    22
}

impl RawConfig {
    fn validate(self) -> Result<InvocationConfig> {
        if self.aliased {
            tracing::debug!(alias = ?self.alias_string, "config alias present, not used");
        }

        let mut hops = Vec::new();
        flatten_hops(&self, &mut hops)?;

        Ok(InvocationConfig {
            hops,
            key_passphrase: self.passphrase,
            commands: self.commands,
            unique_outputs: self.unique,
        })
    }

    fn hop(&self) -> Result<HopSpec> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host cannot be empty".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "username cannot be empty for host {}",
                self.host
            )));
        }
        Ok(HopSpec {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
        })
    }
}

/// Walk the recursive proxy shape into dial order: outermost proxy first,
/// final target last.
fn flatten_hops(raw: &RawConfig, hops: &mut Vec<HopSpec>) -> Result<()> {
    if let Some(proxy) = &raw.proxy_config {
        flatten_hops(proxy, hops)?;
    }
    hops.push(raw.hop()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_prefers_cli_override() {
        temp_env::with_var(CONFIG_ENV, Some("/from/env.json"), || {
            let path = InvocationConfig::resolve_path(Some(PathBuf::from("/from/cli.json")))
                .expect("override should resolve");
            assert_eq!(path, PathBuf::from("/from/cli.json"));
        });
    }

    #[test]
    fn resolve_path_falls_back_to_env() {
        temp_env::with_var(CONFIG_ENV, Some("/from/env.json"), || {
            let path = InvocationConfig::resolve_path(None).expect("env should resolve");
            assert_eq!(path, PathBuf::from("/from/env.json"));
        });
    }

    #[test]
    fn resolve_path_fails_when_unset() {
        temp_env::with_var(CONFIG_ENV, None::<&str>, || {
            let err = InvocationConfig::resolve_path(None).unwrap_err();
            assert!(err.to_string().contains(CONFIG_ENV));
        });
    }

    #[test]
    fn empty_env_value_counts_as_unset() {
        temp_env::with_var(CONFIG_ENV, Some(""), || {
            assert!(InvocationConfig::resolve_path(None).is_err());
        });
    }
}
