#[allow(non_snake_case)]
pub mod status_code;

pub mod status;
pub mod result;

#[macro_use]
pub mod ids;
pub mod endpoint;

// Re-export commonly used items at the crate root.
pub use endpoint::{DEFAULT_NAMENODE_PORT, Endpoint, EndpointParseError};
pub use ids::{BlockId, LeaseId};
pub use result::{Result, make_error, make_error_msg};
pub use status::Status;
pub use status_code::*;
