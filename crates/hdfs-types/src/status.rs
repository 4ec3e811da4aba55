use std::fmt;

use crate::status_code::{self, MetaCode, StatusCode, StatusCodeType, status_code_t};

/// A status value carrying a code and optional message.
///
/// Every failure that crosses the namenode/datanode boundary is reported as
/// a `Status`. The client layer wraps it into a typed error together with
/// the path and endpoint it was attempted against.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Status {
    code: status_code_t,
    message: Option<String>,
}

impl Status {
    /// Create a status with just a code.
    pub fn new(code: status_code_t) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// Create a status with a code and a descriptive message.
    pub fn with_message(code: status_code_t, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(msg.into()),
        }
    }

    /// Return the numeric status code.
    pub fn code(&self) -> status_code_t {
        self.code
    }

    /// Return the optional message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether this status represents success (code == OK).
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::OK
    }

    /// Whether the service reported the path as absent.
    pub fn is_not_found(&self) -> bool {
        self.code == MetaCode::NOT_FOUND
    }

    /// Whether the failure happened at the transport level rather than
    /// being a verdict from the service.
    pub fn is_transport(&self) -> bool {
        status_code::type_of(self.code) == StatusCodeType::RPC
    }

    /// Produce a human-readable description like `"Meta::NotFound(3000) /a/b"`.
    pub fn describe(&self) -> String {
        let name = status_code::to_string(self.code);
        match &self.message {
            Some(msg) => format!("{}({}) {}", name, self.code, msg),
            None => format!("{}({})", name, self.code),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl std::error::Error for Status {}

impl From<status_code_t> for Status {
    fn from(code: status_code_t) -> Self {
        Self::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_code::{MetaCode, RPCCode};

    #[test]
    fn test_status_ok() {
        let s = Status::new(StatusCode::OK);
        assert!(s.is_ok());
        assert_eq!(s.code(), 0);
        assert!(s.message().is_none());
        assert_eq!(s.describe(), "OK(0)");
    }

    #[test]
    fn test_status_with_message() {
        let s = Status::with_message(MetaCode::NOT_FOUND, "/user/alice/missing");
        assert!(!s.is_ok());
        assert!(s.is_not_found());
        assert_eq!(s.code(), 3000);
        assert_eq!(s.message(), Some("/user/alice/missing"));
        assert_eq!(s.describe(), "Meta::NotFound(3000) /user/alice/missing");
    }

    #[test]
    fn test_status_transport_classification() {
        assert!(Status::new(RPCCode::SOCKET_CLOSED).is_transport());
        assert!(!Status::new(MetaCode::EXISTS).is_transport());
    }

    #[test]
    fn test_status_display() {
        let s = Status::new(RPCCode::TIMEOUT);
        assert_eq!(format!("{}", s), "RPC::Timeout(2005)");
    }

    #[test]
    fn test_status_from_code() {
        let s: Status = StatusCode::INVALID_ARG.into();
        assert_eq!(s.code(), 3);
    }

    #[test]
    fn test_status_is_error() {
        let s = Status::new(StatusCode::UNKNOWN);
        let e: &dyn std::error::Error = &s;
        assert!(e.to_string().contains("Unknown"));
    }
}
