use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default namenode RPC port.
pub const DEFAULT_NAMENODE_PORT: u16 = 8020;

/// A metadata-service endpoint: host name (or address literal) and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint. A port of 0 selects [`DEFAULT_NAMENODE_PORT`].
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let port = if port == 0 { DEFAULT_NAMENODE_PORT } else { port };
        Self {
            host: host.into(),
            port,
        }
    }

    /// Check the endpoint is usable for a connection attempt.
    pub fn validate(&self) -> Result<(), EndpointParseError> {
        if self.host.is_empty() {
            return Err(EndpointParseError::EmptyHost);
        }
        if self.host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(EndpointParseError::InvalidHost(self.host.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    /// Parse `"host:port"`, `"host"` or `"hdfs://host:port"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let rest = s.strip_prefix("hdfs://").unwrap_or(s);
        let rest = rest.trim_end_matches('/');
        let endpoint = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| EndpointParseError::InvalidPort)?;
                Endpoint::new(host, port)
            }
            None => Endpoint::new(rest, DEFAULT_NAMENODE_PORT),
        };
        endpoint.validate()?;
        Ok(endpoint)
    }
}

/// Errors when parsing or validating an [`Endpoint`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    #[error("empty host")]
    EmptyHost,
    #[error("invalid host: {0:?}")]
    InvalidHost(String),
    #[error("invalid port number")]
    InvalidPort,
}
