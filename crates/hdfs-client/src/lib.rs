//! Client for a namenode/datanode distributed filesystem.
//!
//! A [`Session`] owns one connection to one namenode and resolves relative
//! paths against its working directory. Files are read and written through
//! [`FileHandle`]s opened from a session. The transport is pluggable via
//! `hdfs_stubs::NamenodeConnector`; `hdfs_stubs::InMemoryConnector` serves
//! an in-process namenode for tests and demos.

pub mod config;
pub mod error;
pub mod file;
pub mod info;
pub mod path;
pub mod session;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, ErrorKind};
pub use file::{FileHandle, OpenMode};
pub use info::{BlockLocation, ObjectKind, PathInfo};
pub use session::Session;
