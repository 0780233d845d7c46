//! ICE server configuration as served by the credential endpoint.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Public STUN server used when no configuration could be fetched.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// One STUN or TURN server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// The endpoint sends either a single URL or a list.
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Servers handed to every new peer connection.
///
/// Loaded once per app run and replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceConfig {
    #[serde(rename = "iceServers")]
    pub servers: Vec<IceServer>,
    /// Only gather relay (TURN) candidates.
    #[serde(rename = "relayOnly", default)]
    pub relay_only: bool,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec![IceServer::stun(DEFAULT_STUN_URL)],
            relay_only: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum IceConfigError {
    #[error("malformed ICE configuration: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("ICE configuration has no servers")]
    NoServers,
}

impl IceConfig {
    /// Parses the credential endpoint's response body.
    ///
    /// A body without a non-empty `iceServers` list is rejected so that the
    /// caller can retry or fall back to [`IceConfig::default`].
    pub fn from_response(body: &[u8]) -> Result<Self, IceConfigError> {
        let config: IceConfig = serde_json::from_slice(body)?;
        if config.servers.is_empty() || config.servers.iter().all(|s| s.urls.is_empty()) {
            return Err(IceConfigError::NoServers);
        }
        Ok(config)
    }

    pub fn has_turn(&self) -> bool {
        self.servers
            .iter()
            .flat_map(|s| s.urls.iter())
            .any(|url| url.starts_with("turn:") || url.starts_with("turns:"))
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Urls {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Urls::deserialize(deserializer)? {
        Urls::One(url) => vec![url],
        Urls::Many(urls) => urls,
    })
}
