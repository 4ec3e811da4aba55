//! Namenode and datanode request/response messages.
//!
//! Fields typed `Option` that a response may leave empty mirror the native
//! service contract, where "no result" is not always distinguishable from
//! "not found". Callers must not read more into a `None` than the operation
//! documents.

use bytes::Bytes;
use hdfs_types::{BlockId, LeaseId};
use serde::{Deserialize, Serialize};

use crate::types::*;

// ---- GetFileInfo ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetFileInfoReq {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetFileInfoRsp {
    /// `None` when the path does not exist.
    pub status: Option<FileStatus>,
}

// ---- ListStatus ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListStatusReq {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListStatusRsp {
    /// `None` both for a missing path and for an empty directory.
    pub entries: Option<Vec<FileStatus>>,
}

// ---- Delete ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteReq {
    pub path: String,
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteRsp {
    pub deleted: bool,
}

// ---- Rename ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenameReq {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenameRsp {
    pub renamed: bool,
}

// ---- Mkdirs ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MkdirsReq {
    pub path: String,
    pub permission: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MkdirsRsp {
    pub created: bool,
}

// ---- SetReplication ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetReplicationReq {
    pub path: String,
    pub replication: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetReplicationRsp {
    pub applied: bool,
}

// ---- SetPermission / SetOwner / SetTimes ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetPermissionReq {
    pub path: String,
    pub permission: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetOwnerReq {
    pub path: String,
    /// `None` leaves the owner unchanged.
    pub owner: Option<String>,
    /// `None` leaves the group unchanged.
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetTimesReq {
    pub path: String,
    /// Milliseconds since epoch; negative leaves the value unchanged.
    pub modification_time: i64,
    pub access_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetAttrRsp {}

// ---- Filesystem-wide ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetFsStatsReq {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetFsStatsRsp {
    pub stats: FsStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetServerDefaultsReq {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetServerDefaultsRsp {
    pub defaults: ServerDefaults,
}

// ---- GetBlockLocations ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetBlockLocationsReq {
    pub path: String,
    pub offset: i64,
    pub length: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetBlockLocationsRsp {
    /// `None` when the path is absent or is not a file.
    pub blocks: Option<LocatedBlocks>,
}

// ---- Create / Append / AddBlock / Complete ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateReq {
    /// `None` asks the namenode to choose a fresh path.
    pub path: Option<String>,
    pub overwrite: bool,
    pub replication: i32,
    pub block_size: i64,
    pub permission: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateRsp {
    pub status: FileStatus,
    pub lease: LeaseId,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppendReq {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppendRsp {
    pub status: FileStatus,
    /// Last block of the file, if it has any. The writer continues in it
    /// while it has room and allocates a new block otherwise.
    pub last_block: Option<LocatedBlock>,
    pub lease: LeaseId,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddBlockReq {
    pub path: String,
    pub lease: LeaseId,
    pub previous: Option<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddBlockRsp {
    pub block: LocatedBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompleteReq {
    pub path: String,
    pub lease: LeaseId,
    pub last: Option<BlockId>,
    /// File length the writer has produced.
    pub length: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompleteRsp {
    pub completed: bool,
}

// ---- Datanode block I/O ----

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadBlockReq {
    pub block: BlockId,
    pub host: String,
    /// Offset within the block.
    pub offset: i64,
    pub length: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadBlockRsp {
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteBlockReq {
    pub block: BlockId,
    pub host: String,
    pub lease: LeaseId,
    /// Offset within the block; must equal the current block length.
    pub offset: i64,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteBlockRsp {
    pub written: i64,
}
