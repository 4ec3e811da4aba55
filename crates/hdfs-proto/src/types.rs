//! Namenode entity records.
//!
//! These model what the metadata service reports about the namespace: file
//! status records, located blocks, filesystem-wide statistics and server
//! defaults. Timestamps are milliseconds since the Unix epoch.

use hdfs_types::BlockId;
use serde::{Deserialize, Serialize};

/// Default permission bits for new files.
pub const DEFAULT_FILE_PERMISSION: u16 = 0o644;
/// Default permission bits for new directories.
pub const DEFAULT_DIR_PERMISSION: u16 = 0o755;

// ---------------------------------------------------------------------------
// File type
// ---------------------------------------------------------------------------

/// Namespace object type as reported by the namenode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FileType {
    File = 0,
    Directory = 1,
    Symlink = 2,
}

impl Default for FileType {
    fn default() -> Self {
        Self::File
    }
}

impl TryFrom<u8> for FileType {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(Self::File),
            1 => Ok(Self::Directory),
            2 => Ok(Self::Symlink),
            other => Err(other),
        }
    }
}

// ---------------------------------------------------------------------------
// File status
// ---------------------------------------------------------------------------

/// Status record of one namespace entry.
///
/// `path` is the absolute path of the entry at the time the record was
/// produced.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: String,
    pub file_type: FileType,
    pub length: i64,
    pub replication: i32,
    pub block_size: i64,
    pub permission: u16,
    pub owner: String,
    pub group: String,
    pub access_time: i64,
    pub modification_time: i64,
}

impl FileStatus {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// One block of a file together with the datanodes holding its replicas.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocatedBlock {
    pub block: BlockId,
    /// Offset of the first byte of this block within the file.
    pub offset: i64,
    /// Number of bytes currently in the block.
    pub length: i64,
    /// Datanode host names, in the order the namenode prefers them.
    pub hosts: Vec<String>,
}

impl LocatedBlock {
    /// Offset one past the last byte of the block.
    pub fn end(&self) -> i64 {
        self.offset + self.length
    }

    /// Whether the block intersects the half-open range `[offset, offset + length)`.
    pub fn overlaps(&self, offset: i64, length: i64) -> bool {
        self.offset < offset.saturating_add(length) && offset < self.end()
    }
}

/// Block list of a file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocatedBlocks {
    pub file_length: i64,
    pub blocks: Vec<LocatedBlock>,
    /// The file is still open for write by some client.
    pub under_construction: bool,
}

// ---------------------------------------------------------------------------
// Filesystem-wide records
// ---------------------------------------------------------------------------

/// Aggregate storage statistics of the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FsStats {
    pub capacity: i64,
    pub used: i64,
    pub remaining: i64,
}

/// Defaults the namenode applies when a client leaves a parameter unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDefaults {
    pub block_size: i64,
    pub replication: i32,
    pub buffer_size: i32,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            block_size: 128 * 1024 * 1024,
            replication: 3,
            buffer_size: 64 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_try_from() {
        assert_eq!(FileType::try_from(1), Ok(FileType::Directory));
        assert_eq!(FileType::try_from(9), Err(9));
    }

    #[test]
    fn test_located_block_overlaps() {
        let blk = LocatedBlock {
            block: BlockId(1),
            offset: 100,
            length: 50,
            hosts: vec!["dn1".into()],
        };
        assert_eq!(blk.end(), 150);
        assert!(blk.overlaps(0, 101));
        assert!(blk.overlaps(149, 10));
        assert!(!blk.overlaps(0, 100));
        assert!(!blk.overlaps(150, 10));
        assert!(blk.overlaps(120, i64::MAX));
    }

    #[test]
    fn test_file_status_serde() {
        let st = FileStatus {
            path: "/data/part-00000".into(),
            file_type: FileType::File,
            length: 4096,
            replication: 3,
            block_size: 1 << 27,
            permission: DEFAULT_FILE_PERMISSION,
            owner: "hadoop".into(),
            group: "supergroup".into(),
            access_time: 1_700_000_000_000,
            modification_time: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&st).unwrap();
        let parsed: FileStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, st);
        assert!(parsed.is_file());
        assert!(!parsed.is_dir());
    }
}
