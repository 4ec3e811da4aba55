//! Client error types.

use hdfs_types::Status;

/// Flat classification of [`ClientError`] for callers that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    ClosedSession,
    AlreadyConnected,
    Disconnect,
    NotFound,
    Operation,
    Open,
    Close,
    InvalidArgument,
    Config,
}

/// Errors that can occur during client operations.
///
/// Every variant that crosses the transport carries the endpoint host it
/// was attempted against and, where one was reported, the underlying
/// [`Status`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Could not establish a connection to the namenode.
    #[error("cannot connect to {host}:{port}: {status}")]
    Connection {
        host: String,
        port: u16,
        status: Status,
    },

    /// The session was never connected, has been disconnected, or is gone.
    #[error("session to {host} is closed")]
    ClosedSession { host: String },

    /// `connect` was called on a session that already holds a connection.
    #[error("session is already connected to {host}")]
    AlreadyConnected { host: String },

    /// Releasing the connection failed. The session is closed regardless.
    #[error("cannot disconnect from {host}: {status}")]
    Disconnect { host: String, status: Status },

    /// The path does not exist.
    #[error("no such file or directory: {path} in filesystem on {host}")]
    NotFound { path: String, host: String },

    /// A metadata or I/O operation failed or was refused by the service.
    #[error("cannot {op} {path} in filesystem on {host}{}", fmt_status(.status))]
    Operation {
        op: &'static str,
        path: String,
        host: String,
        status: Option<Status>,
    },

    /// Opening a file failed.
    #[error("cannot open {path} in filesystem on {host}: {status}")]
    Open {
        path: String,
        host: String,
        status: Status,
    },

    /// Flushing or finalizing a file on close failed.
    #[error("cannot close {path} in filesystem on {host}: {status}")]
    Close {
        path: String,
        host: String,
        status: Status,
    },

    /// An argument was rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

fn fmt_status(status: &Option<Status>) -> String {
    match status {
        Some(s) => format!(": {}", s),
        None => String::new(),
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Connection { .. } => ErrorKind::Connection,
            ClientError::ClosedSession { .. } => ErrorKind::ClosedSession,
            ClientError::AlreadyConnected { .. } => ErrorKind::AlreadyConnected,
            ClientError::Disconnect { .. } => ErrorKind::Disconnect,
            ClientError::NotFound { .. } => ErrorKind::NotFound,
            ClientError::Operation { .. } => ErrorKind::Operation,
            ClientError::Open { .. } => ErrorKind::Open,
            ClientError::Close { .. } => ErrorKind::Close,
            ClientError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ClientError::Config(_) => ErrorKind::Config,
        }
    }

    /// The service status behind this error, if any.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ClientError::Connection { status, .. }
            | ClientError::Disconnect { status, .. }
            | ClientError::Open { status, .. }
            | ClientError::Close { status, .. } => Some(status),
            ClientError::Operation { status, .. } => status.as_ref(),
            _ => None,
        }
    }

    /// Whether the error means the path is absent, whichever operation reported it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
            || self.status().is_some_and(Status::is_not_found)
    }
}

/// Convenience result type.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
