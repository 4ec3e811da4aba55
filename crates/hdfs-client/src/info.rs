//! Caller-facing records built from namenode entity records.

use hdfs_proto::{FileStatus, FileType, LocatedBlock};
use serde::{Deserialize, Serialize};

/// Kind of a namespace object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    File,
    Directory,
    Unknown,
}

impl From<FileType> for ObjectKind {
    fn from(t: FileType) -> Self {
        match t {
            FileType::File => ObjectKind::File,
            FileType::Directory => ObjectKind::Directory,
            FileType::Symlink => ObjectKind::Unknown,
        }
    }
}

/// Snapshot of one path's metadata at the time of the call.
///
/// `name` is the absolute path of the entry. Timestamps are milliseconds
/// since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    pub kind: ObjectKind,
    pub name: String,
    pub owner: String,
    pub group: String,
    pub size: i64,
    pub replication: i64,
    pub block_size: i64,
    pub permission: i64,
    pub last_access: i64,
    pub last_mod: i64,
}

impl PathInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == ObjectKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == ObjectKind::File
    }
}

impl From<FileStatus> for PathInfo {
    fn from(st: FileStatus) -> Self {
        Self {
            kind: st.file_type.into(),
            name: st.path,
            owner: st.owner,
            group: st.group,
            size: st.length.max(0),
            replication: st.replication as i64,
            block_size: st.block_size,
            permission: st.permission as i64,
            last_access: st.access_time,
            last_mod: st.modification_time,
        }
    }
}

/// Hosts serving one block of a file, with the byte range the block covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocation {
    pub hosts: Vec<String>,
    pub offset: i64,
    pub length: i64,
}

impl From<LocatedBlock> for BlockLocation {
    fn from(blk: LocatedBlock) -> Self {
        Self {
            hosts: blk.hosts,
            offset: blk.offset,
            length: blk.length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdfs_types::BlockId;

    #[test]
    fn test_path_info_from_status() {
        let st = FileStatus {
            path: "/user/alice/f".into(),
            file_type: FileType::File,
            length: 10,
            replication: 3,
            block_size: 1 << 27,
            permission: 0o640,
            owner: "alice".into(),
            group: "supergroup".into(),
            access_time: 1,
            modification_time: 2,
        };
        let info = PathInfo::from(st);
        assert!(info.is_file());
        assert_eq!(info.name, "/user/alice/f");
        assert_eq!(info.permission, 0o640);
        assert_eq!(info.last_mod, 2);
    }

    #[test]
    fn test_symlink_is_unknown() {
        assert_eq!(ObjectKind::from(FileType::Symlink), ObjectKind::Unknown);
    }

    #[test]
    fn test_serde_field_names() {
        let loc = BlockLocation::from(LocatedBlock {
            block: BlockId(7),
            offset: 0,
            length: 5,
            hosts: vec!["dn1".into(), "dn2".into()],
        });
        let json = serde_json::to_value(&loc).unwrap();
        assert_eq!(json["hosts"][1], "dn2");
        assert_eq!(json["length"], 5);

        let kind = serde_json::to_string(&ObjectKind::Directory).unwrap();
        assert_eq!(kind, "\"directory\"");
    }
}
