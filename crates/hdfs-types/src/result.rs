use crate::status::Status;
use crate::status_code::status_code_t;

/// The standard result type at the service boundary, with `Status` as the error.
pub type Result<T> = std::result::Result<T, Status>;

/// Create an error result from a status code.
pub fn make_error<T>(code: status_code_t) -> Result<T> {
    Err(Status::new(code))
}

/// Create an error result from a status code and message.
pub fn make_error_msg<T>(code: status_code_t, msg: impl Into<String>) -> Result<T> {
    Err(Status::with_message(code, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_code::{MetaCode, StatusCode};

    #[test]
    fn test_make_error() {
        let r: Result<i64> = make_error(MetaCode::NOT_FOUND);
        assert_eq!(r.unwrap_err().code(), 3000);
    }

    #[test]
    fn test_make_error_msg() {
        let r: Result<i64> = make_error_msg(StatusCode::INVALID_ARG, "replication must be positive");
        let err = r.unwrap_err();
        assert_eq!(err.code(), 3);
        assert_eq!(err.message(), Some("replication must be positive"));
    }
}
