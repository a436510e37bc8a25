use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Configuration handed to a messaging client at construction time.
///
/// `hosts` always comes from the host side (`--host`); everything else is
/// client-specific and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub hosts: Vec<String>,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl ClientConfig {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts, options: serde_json::Map::new() }
    }

    pub fn to_json(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        serde_json::from_str(json).map_err(|e| ClientError::config(format!("invalid client config: {e}")))
    }
}

/// Split a comma-separated address list, e.g. `127.0.0.1:6570,127.0.0.2:6570`.
///
/// Whitespace around entries is trimmed, empty entries are dropped.
pub fn parse_hosts(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(String::from)
        .collect()
}
