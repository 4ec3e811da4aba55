//! Client configuration types.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::path;

/// Configuration shared by every session opened from it.
///
/// Zero for `default_replication` or `default_block_size` defers to the
/// namenode's own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identity the connection authenticates as.
    pub user: String,

    /// Parent of per-user home directories; the initial working directory
    /// of a session is `<home_prefix>/<user>`.
    pub home_prefix: String,

    /// Buffer size used when `open` is passed 0.
    pub default_buffer_size: usize,

    /// Replication used when `open` is passed 0.
    pub default_replication: i32,

    /// Block size used when `open` is passed 0.
    pub default_block_size: i64,

    /// Upper bound on establishing a connection.
    #[serde(with = "secs_f64")]
    pub connect_timeout: Duration,

    /// Upper bound on a single request/response exchange.
    #[serde(with = "secs_f64")]
    pub rpc_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            home_prefix: "/user".into(),
            default_buffer_size: 64 * 1024,
            default_replication: 0,
            default_block_size: 0,
            connect_timeout: Duration::from_secs(20),
            rpc_timeout: Duration::from_secs(60),
        }
    }
}

fn default_user() -> String {
    std::env::var("HADOOP_USER_NAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "hdfs".into())
}

impl ClientConfig {
    /// Configuration for `user` with all other fields at their defaults.
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ..Self::default()
        }
    }

    /// Initial working directory of a session.
    pub fn home_directory(&self) -> String {
        path::join(&self.home_prefix, &self.user)
    }

    /// Load a TOML config file. Fields missing from the file keep their defaults.
    pub fn load(file: impl AsRef<Path>) -> ClientResult<Self> {
        let file = file.as_ref();
        let text = std::fs::read_to_string(file)
            .map_err(|e| ClientError::Config(format!("read {}: {}", file.display(), e)))?;
        let cfg: Self = toml::from_str(&text)
            .map_err(|e| ClientError::Config(format!("parse {}: {}", file.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.user.is_empty() {
            return Err(ClientError::Config("user must not be empty".into()));
        }
        if !self.home_prefix.starts_with('/') {
            return Err(ClientError::Config(format!(
                "home_prefix must be absolute, got {:?}",
                self.home_prefix
            )));
        }
        if self.default_buffer_size == 0 {
            return Err(ClientError::Config("default_buffer_size must be positive".into()));
        }
        if self.default_replication < 0 || self.default_block_size < 0 {
            return Err(ClientError::Config(
                "default_replication and default_block_size must not be negative".into(),
            ));
        }
        if self.connect_timeout.is_zero() || self.rpc_timeout.is_zero() {
            return Err(ClientError::Config("timeouts must be positive".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Duration serialisation helper (seconds-based)
// ---------------------------------------------------------------------------

/// Serde helper that serialises `Duration` as floating-point seconds.
mod secs_f64 {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
