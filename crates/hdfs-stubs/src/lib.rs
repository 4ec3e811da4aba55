//! Client-side transport seam for the namenode and its datanodes.
//!
//! `INamenodeStub` is the async request/response interface a session talks
//! to; `NamenodeConnector` opens one stub per endpoint. Real network-backed
//! implementations live outside this workspace. This crate also provides an
//! in-memory namenode that is useful for unit testing without a cluster.

pub mod mem_namenode;
pub mod namenode_stub;

pub use mem_namenode::{
    AUTO_PATH_DIR, InMemoryConnection, InMemoryConnector, InMemoryNamenode, RecordedCall,
};
pub use namenode_stub::{INamenodeStub, NamenodeConnector};
