// config.rs - Client configuration, loaded the way the teacher's server
// config loads: a serde-derived struct, deserialized from TOML, validated
// once at load time rather than scattered through the call sites that use it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::{RadiusError, Result};
use crate::secret::SecretBuffer;

fn default_auth_port() -> u16 {
    1812
}

fn default_acct_port() -> u16 {
    1813
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_retry_max() -> u32 {
    3
}

/// One RADIUS server entry: host plus the ports and secret used to reach it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub host: IpAddr,
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,
    #[serde(default = "default_acct_port")]
    pub acct_port: u16,
    pub secret: String,
}

fn default_servers() -> HashMap<String, ServerEntry> {
    HashMap::new()
}

/// Client-wide configuration: the server table plus the handful of settings
/// that apply to every transaction unless a call site overrides them.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_servers")]
    pub servers: HashMap<String, ServerEntry>,

    /// Network namespace to operate in before binding a socket, or `None`
    /// for the caller's own namespace.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Value sent in NAS-Identifier unless a request overrides it.
    #[serde(default)]
    pub nas_identifier: Option<String>,

    /// Prefer a non-temporary IPv6 source address when binding.
    #[serde(default)]
    pub use_public_addr: bool,

    /// Secret used for Service-Type=Administrative polling requests,
    /// standing in for the original's `MGMT_POLL_SECRET` build-time
    /// constant — here a runtime-configurable value instead.
    #[serde(default)]
    pub management_secret: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_max")]
    pub retry_max: u32,
}

impl ClientConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(RadiusError::Io)?;
        let config: ClientConfig = toml::from_str(&contents)
            .map_err(|e| RadiusError::Encoding(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, entry) in &self.servers {
            if name.is_empty() {
                return Err(RadiusError::EmptyServerName);
            }
            if entry.secret.is_empty() {
                return Err(RadiusError::Encoding(format!(
                    "server {}: secret must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn server(&self, name: &str) -> Result<&ServerEntry> {
        if name.is_empty() {
            return Err(RadiusError::EmptyServerName);
        }
        self.servers
            .get(name)
            .ok_or_else(|| RadiusError::ServerNotFound(name.to_string()))
    }

    pub fn management_secret(&self) -> Result<SecretBuffer> {
        let secret = self
            .management_secret
            .as_ref()
            .ok_or_else(|| RadiusError::Encoding("no management_secret configured".into()))?;
        SecretBuffer::new(secret.as_bytes().to_vec())
    }
}
