//! Messages exchanged with the namenode and datanodes.
//!
//! Wire encoding is the transport's concern; every record derives serde so
//! any encoding can be layered on top.

pub mod ops;
pub mod types;

pub use ops::*;
pub use types::*;
