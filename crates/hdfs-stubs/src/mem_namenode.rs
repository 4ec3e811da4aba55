//! In-memory namenode and datanodes for testing and development.
//!
//! [`InMemoryNamenode`] keeps the namespace in a `BTreeMap` keyed by
//! canonical absolute path and block payloads in a `DashMap`. It reproduces
//! the service contract the client has to cope with, including the
//! ambiguous `None` listing for both empty and missing directories.
//!
//! Tests can observe and steer the service: every call is recorded, any
//! operation can be forced to fail with a given [`Status`], and
//! [`InMemoryNamenode::pause`] holds all calls at the transport boundary
//! until [`InMemoryNamenode::resume`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use hdfs_proto::{
    AddBlockReq, AddBlockRsp, AppendReq, AppendRsp, CompleteReq, CompleteRsp, CreateReq,
    CreateRsp, DEFAULT_DIR_PERMISSION, DEFAULT_FILE_PERMISSION, DeleteReq, DeleteRsp, FileStatus,
    FileType, FsStats, GetBlockLocationsReq, GetBlockLocationsRsp, GetFileInfoReq,
    GetFileInfoRsp, GetFsStatsReq, GetFsStatsRsp, GetServerDefaultsReq, GetServerDefaultsRsp,
    ListStatusReq, ListStatusRsp, LocatedBlock, LocatedBlocks, MkdirsReq, MkdirsRsp,
    ReadBlockReq, ReadBlockRsp, RenameReq, RenameRsp, ServerDefaults, SetAttrRsp, SetOwnerReq,
    SetPermissionReq, SetReplicationReq, SetReplicationRsp, SetTimesReq, WriteBlockReq,
    WriteBlockRsp,
};
use hdfs_types::{
    BlockId, Endpoint, LeaseId, MetaCode, RPCCode, Result, Status, StatusCode, StorageCode,
    make_error_msg,
};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::namenode_stub::{INamenodeStub, NamenodeConnector};

/// Directory under which namenode-assigned paths are created.
pub const AUTO_PATH_DIR: &str = "/tmp";

const DEFAULT_CAPACITY: i64 = 1 << 40;
const MAX_REPLICATION: i32 = 512;
const SUPERGROUP: &str = "supergroup";

/// One call observed at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub op: &'static str,
    pub path: Option<String>,
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Canonicalize an absolute path: collapse separators, drop `.` and resolve `..`.
fn canonical(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return make_error_msg(
            StatusCode::INVALID_ARG,
            format!("not an absolute path: {:?}", path),
        );
    }
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            c => parts.push(c),
        }
    }
    if parts.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", parts.join("/")))
    }
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    Some(if idx == 0 { "/" } else { &path[..idx] })
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

fn child_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

fn subtree_prefix(dir: &str) -> String {
    if dir == "/" {
        "/".to_string()
    } else {
        format!("{}/", dir)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Entry {
    status: FileStatus,
    blocks: Vec<LocatedBlock>,
    lease: Option<LeaseId>,
}

impl Entry {
    fn directory(owner: &str, permission: u16) -> Self {
        let now = now_millis();
        Self {
            status: FileStatus {
                file_type: FileType::Directory,
                permission,
                owner: owner.to_string(),
                group: SUPERGROUP.to_string(),
                access_time: now,
                modification_time: now,
                ..FileStatus::default()
            },
            blocks: Vec::new(),
            lease: None,
        }
    }

    fn snapshot(&self, path: &str) -> FileStatus {
        FileStatus {
            path: path.to_string(),
            ..self.status.clone()
        }
    }

    fn check_lease(&self, path: &str, lease: LeaseId) -> Result<()> {
        match self.lease {
            Some(held) if held == lease => Ok(()),
            Some(_) => make_error_msg(
                MetaCode::LEASE_CONFLICT,
                format!("{} is leased by another writer", path),
            ),
            None => make_error_msg(
                MetaCode::LEASE_CONFLICT,
                format!("no lease held on {}", path),
            ),
        }
    }
}

#[derive(Debug, Default)]
struct Namespace {
    entries: BTreeMap<String, Entry>,
    block_owner: HashMap<BlockId, String>,
}

impl Namespace {
    fn children(&self, dir: &str) -> Vec<(String, &Entry)> {
        let prefix = subtree_prefix(dir);
        self.entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.len() > prefix.len() && !k[prefix.len()..].contains('/'))
            .map(|(k, e)| (k.clone(), e))
            .collect()
    }

    fn descendants(&self, dir: &str) -> Vec<String> {
        let prefix = subtree_prefix(dir);
        self.entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.len() > prefix.len())
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn get_existing_mut(&mut self, path: &str) -> Result<&mut Entry> {
        self.entries
            .get_mut(path)
            .ok_or_else(|| Status::with_message(MetaCode::NOT_FOUND, path.to_string()))
    }

    /// Create `path` and any missing ancestors as directories.
    fn mkdirs(&mut self, path: &str, owner: &str, permission: u16) -> Result<()> {
        let mut current = String::from("/");
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        for name in components {
            current = child_path(&current, name);
            match self.entries.get(&current) {
                Some(e) if e.status.is_dir() => {}
                Some(_) => {
                    return make_error_msg(
                        MetaCode::NOT_DIRECTORY,
                        format!("{} exists and is not a directory", current),
                    );
                }
                None => {
                    self.entries
                        .insert(current.clone(), Entry::directory(owner, permission));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Namenode
// ---------------------------------------------------------------------------

/// In-memory namenode with co-located datanode block storage.
pub struct InMemoryNamenode {
    ns: Mutex<Namespace>,
    blocks: DashMap<BlockId, Vec<u8>>,
    defaults: ServerDefaults,
    capacity: i64,
    datanodes: Vec<String>,
    next_block: AtomicU64,
    next_lease: AtomicU64,
    next_auto: AtomicU64,
    calls: Mutex<Vec<RecordedCall>>,
    faults: Mutex<HashMap<&'static str, Status>>,
    gate: watch::Sender<bool>,
    live_connections: AtomicUsize,
}

impl Default for InMemoryNamenode {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNamenode {
    /// Create a namenode with default server settings and three datanodes.
    pub fn new() -> Self {
        Self::with_defaults(
            ServerDefaults::default(),
            vec!["dn1".into(), "dn2".into(), "dn3".into()],
        )
    }

    /// Create a namenode with custom defaults and datanode host names.
    pub fn with_defaults(defaults: ServerDefaults, datanodes: Vec<String>) -> Self {
        let mut ns = Namespace::default();
        ns.entries
            .insert("/".to_string(), Entry::directory("hdfs", DEFAULT_DIR_PERMISSION));
        let (gate, _) = watch::channel(true);
        Self {
            ns: Mutex::new(ns),
            blocks: DashMap::new(),
            defaults,
            capacity: DEFAULT_CAPACITY,
            datanodes,
            next_block: AtomicU64::new(1 << 30),
            next_lease: AtomicU64::new(1),
            next_auto: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            gate,
            live_connections: AtomicUsize::new(0),
        }
    }

    /// Wrap in an `Arc` for convenient sharing.
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Calls observed so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Make every subsequent `op` call fail with `status` until cleared.
    pub fn fail_op(&self, op: &'static str, status: Status) {
        self.faults.lock().insert(op, status);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Hold all incoming calls at the transport boundary.
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    /// Release held calls and stop holding new ones.
    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    /// Number of connections opened and not yet shut down.
    pub fn live_connections(&self) -> usize {
        self.live_connections.load(Ordering::SeqCst)
    }

    /// Number of blocks currently stored.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Open a connection authenticated as `user`.
    pub fn connect(self: &Arc<Self>, user: &str) -> InMemoryConnection {
        self.live_connections.fetch_add(1, Ordering::SeqCst);
        InMemoryConnection {
            nn: Arc::clone(self),
            user: user.to_string(),
            closed: AtomicBool::new(false),
        }
    }

    fn record(&self, op: &'static str, path: Option<&str>) {
        self.calls.lock().push(RecordedCall {
            op,
            path: path.map(str::to_string),
        });
    }

    async fn wait_gate(&self) {
        let mut rx = self.gate.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|open| *open).await;
    }

    fn check_fault(&self, op: &'static str) -> Result<()> {
        match self.faults.lock().get(op) {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }

    fn remove_blocks(&self, ns: &mut Namespace, blocks: &[LocatedBlock]) {
        for blk in blocks {
            ns.block_owner.remove(&blk.block);
            self.blocks.remove(&blk.block);
        }
    }

    // ---- Namespace operations ----

    fn get_file_info(&self, req: GetFileInfoReq) -> Result<GetFileInfoRsp> {
        let path = canonical(&req.path)?;
        let ns = self.ns.lock();
        Ok(GetFileInfoRsp {
            status: ns.entries.get(&path).map(|e| e.snapshot(&path)),
        })
    }

    fn list_status(&self, req: ListStatusReq) -> Result<ListStatusRsp> {
        let path = canonical(&req.path)?;
        let ns = self.ns.lock();
        let entries = match ns.entries.get(&path) {
            None => None,
            Some(e) if !e.status.is_dir() => Some(vec![e.snapshot(&path)]),
            Some(_) => {
                let children: Vec<FileStatus> = ns
                    .children(&path)
                    .into_iter()
                    .map(|(k, e)| e.snapshot(&k))
                    .collect();
                if children.is_empty() { None } else { Some(children) }
            }
        };
        Ok(ListStatusRsp { entries })
    }

    fn delete(&self, req: DeleteReq) -> Result<DeleteRsp> {
        let path = canonical(&req.path)?;
        if path == "/" {
            return make_error_msg(MetaCode::NO_PERMISSION, "cannot delete the root directory");
        }
        let mut ns = self.ns.lock();
        let is_dir = match ns.entries.get(&path) {
            None => return Ok(DeleteRsp { deleted: false }),
            Some(e) => e.status.is_dir(),
        };
        let mut doomed = Vec::new();
        if is_dir {
            doomed = ns.descendants(&path);
            if !doomed.is_empty() && !req.recursive {
                return make_error_msg(MetaCode::NOT_EMPTY, path);
            }
        }
        doomed.push(path);
        for key in doomed {
            if let Some(entry) = ns.entries.remove(&key) {
                self.remove_blocks(&mut ns, &entry.blocks);
            }
        }
        Ok(DeleteRsp { deleted: true })
    }

    fn rename(&self, req: RenameReq) -> Result<RenameRsp> {
        let src = canonical(&req.src)?;
        let dst = canonical(&req.dst)?;
        let mut ns = self.ns.lock();
        if src == "/" || !ns.entries.contains_key(&src) {
            return Ok(RenameRsp { renamed: false });
        }
        if src == dst {
            return Ok(RenameRsp { renamed: true });
        }
        let target = match ns.entries.get(&dst) {
            Some(e) if e.status.is_dir() => child_path(&dst, base_name(&src)),
            _ => dst,
        };
        if ns.entries.contains_key(&target) || target.starts_with(&subtree_prefix(&src)) {
            return Ok(RenameRsp { renamed: false });
        }
        match parent_of(&target).and_then(|p| ns.entries.get(p)) {
            Some(parent) if parent.status.is_dir() => {}
            _ => return Ok(RenameRsp { renamed: false }),
        }

        let mut moved = ns.descendants(&src);
        moved.push(src.clone());
        for key in moved {
            if let Some(entry) = ns.entries.remove(&key) {
                let new_key = format!("{}{}", target, &key[src.len()..]);
                for blk in &entry.blocks {
                    ns.block_owner.insert(blk.block, new_key.clone());
                }
                ns.entries.insert(new_key, entry);
            }
        }
        Ok(RenameRsp { renamed: true })
    }

    fn mkdirs(&self, user: &str, req: MkdirsReq) -> Result<MkdirsRsp> {
        let path = canonical(&req.path)?;
        let permission = if req.permission == 0 {
            DEFAULT_DIR_PERMISSION
        } else {
            req.permission & 0o7777
        };
        self.ns.lock().mkdirs(&path, user, permission)?;
        Ok(MkdirsRsp { created: true })
    }

    fn set_replication(&self, req: SetReplicationReq) -> Result<SetReplicationRsp> {
        let path = canonical(&req.path)?;
        if req.replication <= 0 || req.replication > MAX_REPLICATION {
            return make_error_msg(
                MetaCode::INVALID_REPLICATION,
                format!("replication {} out of range", req.replication),
            );
        }
        let mut ns = self.ns.lock();
        match ns.entries.get_mut(&path) {
            Some(e) if e.status.is_file() => {
                e.status.replication = req.replication;
                Ok(SetReplicationRsp { applied: true })
            }
            _ => Ok(SetReplicationRsp { applied: false }),
        }
    }

    fn set_permission(&self, req: SetPermissionReq) -> Result<SetAttrRsp> {
        let path = canonical(&req.path)?;
        let mut ns = self.ns.lock();
        ns.get_existing_mut(&path)?.status.permission = req.permission & 0o7777;
        Ok(SetAttrRsp {})
    }

    fn set_owner(&self, req: SetOwnerReq) -> Result<SetAttrRsp> {
        let path = canonical(&req.path)?;
        if req.owner.is_none() && req.group.is_none() {
            return make_error_msg(StatusCode::INVALID_ARG, "neither owner nor group given");
        }
        let mut ns = self.ns.lock();
        let entry = ns.get_existing_mut(&path)?;
        if let Some(owner) = req.owner {
            entry.status.owner = owner;
        }
        if let Some(group) = req.group {
            entry.status.group = group;
        }
        Ok(SetAttrRsp {})
    }

    fn set_times(&self, req: SetTimesReq) -> Result<SetAttrRsp> {
        let path = canonical(&req.path)?;
        let mut ns = self.ns.lock();
        let entry = ns.get_existing_mut(&path)?;
        if req.modification_time >= 0 {
            entry.status.modification_time = req.modification_time;
        }
        if req.access_time >= 0 {
            entry.status.access_time = req.access_time;
        }
        Ok(SetAttrRsp {})
    }

    fn get_fs_stats(&self) -> GetFsStatsRsp {
        let ns = self.ns.lock();
        let used: i64 = ns
            .entries
            .values()
            .filter(|e| e.status.is_file())
            .map(|e| e.status.length * e.status.replication as i64)
            .sum();
        GetFsStatsRsp {
            stats: FsStats {
                capacity: self.capacity,
                used,
                remaining: (self.capacity - used).max(0),
            },
        }
    }

    fn get_block_locations(&self, req: GetBlockLocationsReq) -> Result<GetBlockLocationsRsp> {
        let path = canonical(&req.path)?;
        if req.offset < 0 || req.length < 0 {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("negative range {}+{}", req.offset, req.length),
            );
        }
        let ns = self.ns.lock();
        let blocks = match ns.entries.get(&path) {
            Some(e) if e.status.is_file() => Some(LocatedBlocks {
                file_length: e.status.length,
                blocks: e
                    .blocks
                    .iter()
                    .filter(|b| b.overlaps(req.offset, req.length))
                    .cloned()
                    .collect(),
                under_construction: e.lease.is_some(),
            }),
            _ => None,
        };
        Ok(GetBlockLocationsRsp { blocks })
    }

    // ---- Write pipeline ----

    fn create(&self, user: &str, req: CreateReq) -> Result<CreateRsp> {
        let path = match req.path.as_deref() {
            Some(p) => canonical(p)?,
            None => {
                let n = self.next_auto.fetch_add(1, Ordering::Relaxed);
                format!("{}/.auto-{:08}", AUTO_PATH_DIR, n)
            }
        };
        if path == "/" {
            return make_error_msg(MetaCode::IS_DIRECTORY, path);
        }
        let replication = if req.replication <= 0 {
            self.defaults.replication
        } else {
            req.replication
        };
        if replication > MAX_REPLICATION {
            return make_error_msg(
                MetaCode::INVALID_REPLICATION,
                format!("replication {} out of range", replication),
            );
        }
        let block_size = if req.block_size <= 0 {
            self.defaults.block_size
        } else {
            req.block_size
        };
        let permission = if req.permission == 0 {
            DEFAULT_FILE_PERMISSION
        } else {
            req.permission & 0o7777
        };

        let mut ns = self.ns.lock();
        if let Some(existing) = ns.entries.get(&path) {
            if existing.status.is_dir() {
                return make_error_msg(MetaCode::IS_DIRECTORY, path);
            }
            if existing.lease.is_some() {
                return make_error_msg(
                    MetaCode::LEASE_CONFLICT,
                    format!("{} is open for write", path),
                );
            }
            if !req.overwrite {
                return make_error_msg(MetaCode::EXISTS, path);
            }
            if let Some(old) = ns.entries.remove(&path) {
                self.remove_blocks(&mut ns, &old.blocks);
            }
        }
        if let Some(parent) = parent_of(&path) {
            ns.mkdirs(parent, user, DEFAULT_DIR_PERMISSION)?;
        }

        let lease = LeaseId(self.next_lease.fetch_add(1, Ordering::Relaxed));
        let now = now_millis();
        let entry = Entry {
            status: FileStatus {
                file_type: FileType::File,
                length: 0,
                replication,
                block_size,
                permission,
                owner: user.to_string(),
                group: SUPERGROUP.to_string(),
                access_time: now,
                modification_time: now,
                ..FileStatus::default()
            },
            blocks: Vec::new(),
            lease: Some(lease),
        };
        let status = entry.snapshot(&path);
        ns.entries.insert(path, entry);
        Ok(CreateRsp { status, lease })
    }

    fn append(&self, req: AppendReq) -> Result<AppendRsp> {
        let path = canonical(&req.path)?;
        let mut ns = self.ns.lock();
        let entry = ns.get_existing_mut(&path)?;
        if entry.status.is_dir() {
            return make_error_msg(MetaCode::IS_DIRECTORY, path);
        }
        if entry.lease.is_some() {
            return make_error_msg(
                MetaCode::LEASE_CONFLICT,
                format!("{} is open for write", path),
            );
        }
        let lease = LeaseId(self.next_lease.fetch_add(1, Ordering::Relaxed));
        entry.lease = Some(lease);
        Ok(AppendRsp {
            status: entry.snapshot(&path),
            last_block: entry.blocks.last().cloned(),
            lease,
        })
    }

    fn add_block(&self, req: AddBlockReq) -> Result<AddBlockRsp> {
        let path = canonical(&req.path)?;
        if self.datanodes.is_empty() {
            return make_error_msg(StorageCode::NO_DATANODE, "no datanodes registered");
        }
        let mut ns = self.ns.lock();
        let entry = ns.get_existing_mut(&path)?;
        entry.check_lease(&path, req.lease)?;
        if entry.blocks.last().map(|b| b.block) != req.previous {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("stale previous block for {}", path),
            );
        }

        let id = BlockId(self.next_block.fetch_add(1, Ordering::Relaxed));
        let copies = (entry.status.replication.max(1) as usize).min(self.datanodes.len());
        let start = (id.raw() as usize) % self.datanodes.len();
        let hosts = (0..copies)
            .map(|i| self.datanodes[(start + i) % self.datanodes.len()].clone())
            .collect();
        let block = LocatedBlock {
            block: id,
            offset: entry.status.length,
            length: 0,
            hosts,
        };
        entry.blocks.push(block.clone());
        ns.block_owner.insert(id, path);
        self.blocks.insert(id, Vec::new());
        Ok(AddBlockRsp { block })
    }

    fn complete(&self, req: CompleteReq) -> Result<CompleteRsp> {
        let path = canonical(&req.path)?;
        let mut ns = self.ns.lock();
        let entry = ns.get_existing_mut(&path)?;
        entry.check_lease(&path, req.lease)?;
        if entry.blocks.last().map(|b| b.block) != req.last {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("last block mismatch for {}", path),
            );
        }
        if entry.status.length != req.length {
            return Ok(CompleteRsp { completed: false });
        }
        entry.lease = None;
        entry.status.modification_time = now_millis();
        Ok(CompleteRsp { completed: true })
    }

    // ---- Datanode block I/O ----

    fn read_block(&self, req: ReadBlockReq) -> Result<ReadBlockRsp> {
        if req.offset < 0 || req.length < 0 {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("negative block range {}+{}", req.offset, req.length),
            );
        }
        let ns = self.ns.lock();
        let located = ns
            .block_owner
            .get(&req.block)
            .and_then(|p| ns.entries.get(p))
            .and_then(|e| e.blocks.iter().find(|b| b.block == req.block));
        match located {
            Some(b) if b.hosts.contains(&req.host) => {}
            _ => {
                return make_error_msg(
                    StorageCode::BLOCK_NOT_FOUND,
                    format!("block {} not on {}", req.block, req.host),
                );
            }
        }
        let data = self.blocks.get(&req.block).ok_or_else(|| {
            Status::with_message(
                StorageCode::BLOCK_NOT_FOUND,
                format!("block {} has no replica", req.block),
            )
        })?;
        let start = req.offset as usize;
        if start >= data.len() {
            return Ok(ReadBlockRsp { data: Bytes::new() });
        }
        let end = start.saturating_add(req.length as usize).min(data.len());
        Ok(ReadBlockRsp {
            data: Bytes::copy_from_slice(&data[start..end]),
        })
    }

    fn write_block(&self, req: WriteBlockReq) -> Result<WriteBlockRsp> {
        let mut ns = self.ns.lock();
        let path = ns.block_owner.get(&req.block).cloned().ok_or_else(|| {
            Status::with_message(
                StorageCode::BLOCK_NOT_FOUND,
                format!("block {} not allocated", req.block),
            )
        })?;
        let entry = ns.get_existing_mut(&path)?;
        entry.check_lease(&path, req.lease)?;
        let block_size = entry.status.block_size;
        let block = match entry.blocks.last_mut() {
            Some(b) if b.block == req.block => b,
            _ => {
                return make_error_msg(
                    StorageCode::BLOCK_COMMITTED,
                    format!("block {} is not the last block of {}", req.block, path),
                );
            }
        };
        if !block.hosts.contains(&req.host) {
            return make_error_msg(
                StorageCode::BLOCK_WRITE_FAILED,
                format!("block {} is not placed on {}", req.block, req.host),
            );
        }
        if req.offset != block.length {
            return make_error_msg(
                StorageCode::BLOCK_WRITE_FAILED,
                format!(
                    "non-sequential write to block {}: offset {} != length {}",
                    req.block, req.offset, block.length
                ),
            );
        }
        let n = req.data.len() as i64;
        if block.length + n > block_size {
            return make_error_msg(
                StorageCode::BLOCK_SIZE_EXCEEDED,
                format!("block {} would exceed {} bytes", req.block, block_size),
            );
        }
        match self.blocks.get_mut(&req.block) {
            Some(mut data) => data.extend_from_slice(&req.data),
            None => {
                return make_error_msg(
                    StorageCode::BLOCK_NOT_FOUND,
                    format!("block {} has no replica", req.block),
                );
            }
        }
        block.length += n;
        entry.status.length += n;
        entry.status.modification_time = now_millis();
        Ok(WriteBlockRsp { written: n })
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One client connection to an [`InMemoryNamenode`].
pub struct InMemoryConnection {
    nn: Arc<InMemoryNamenode>,
    user: String,
    closed: AtomicBool,
}

impl InMemoryConnection {
    /// Common prologue of every call: liveness, recording, pause gate, faults.
    async fn enter(&self, op: &'static str, path: Option<&str>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return make_error_msg(RPCCode::SOCKET_CLOSED, "connection is closed");
        }
        self.nn.record(op, path);
        self.nn.wait_gate().await;
        self.nn.check_fault(op)
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.nn.live_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl INamenodeStub for InMemoryConnection {
    async fn get_file_info(&self, req: GetFileInfoReq) -> Result<GetFileInfoRsp> {
        self.enter("get_file_info", Some(&req.path)).await?;
        self.nn.get_file_info(req)
    }

    async fn list_status(&self, req: ListStatusReq) -> Result<ListStatusRsp> {
        self.enter("list_status", Some(&req.path)).await?;
        self.nn.list_status(req)
    }

    async fn delete(&self, req: DeleteReq) -> Result<DeleteRsp> {
        self.enter("delete", Some(&req.path)).await?;
        self.nn.delete(req)
    }

    async fn rename(&self, req: RenameReq) -> Result<RenameRsp> {
        self.enter("rename", Some(&req.src)).await?;
        self.nn.rename(req)
    }

    async fn mkdirs(&self, req: MkdirsReq) -> Result<MkdirsRsp> {
        self.enter("mkdirs", Some(&req.path)).await?;
        self.nn.mkdirs(&self.user, req)
    }

    async fn set_replication(&self, req: SetReplicationReq) -> Result<SetReplicationRsp> {
        self.enter("set_replication", Some(&req.path)).await?;
        self.nn.set_replication(req)
    }

    async fn set_permission(&self, req: SetPermissionReq) -> Result<SetAttrRsp> {
        self.enter("set_permission", Some(&req.path)).await?;
        self.nn.set_permission(req)
    }

    async fn set_owner(&self, req: SetOwnerReq) -> Result<SetAttrRsp> {
        self.enter("set_owner", Some(&req.path)).await?;
        self.nn.set_owner(req)
    }

    async fn set_times(&self, req: SetTimesReq) -> Result<SetAttrRsp> {
        self.enter("set_times", Some(&req.path)).await?;
        self.nn.set_times(req)
    }

    async fn get_fs_stats(&self, _req: GetFsStatsReq) -> Result<GetFsStatsRsp> {
        self.enter("get_fs_stats", None).await?;
        Ok(self.nn.get_fs_stats())
    }

    async fn get_server_defaults(&self, _req: GetServerDefaultsReq) -> Result<GetServerDefaultsRsp> {
        self.enter("get_server_defaults", None).await?;
        Ok(GetServerDefaultsRsp {
            defaults: self.nn.defaults,
        })
    }

    async fn get_block_locations(&self, req: GetBlockLocationsReq) -> Result<GetBlockLocationsRsp> {
        self.enter("get_block_locations", Some(&req.path)).await?;
        self.nn.get_block_locations(req)
    }

    async fn create(&self, req: CreateReq) -> Result<CreateRsp> {
        self.enter("create", req.path.as_deref()).await?;
        self.nn.create(&self.user, req)
    }

    async fn append(&self, req: AppendReq) -> Result<AppendRsp> {
        self.enter("append", Some(&req.path)).await?;
        self.nn.append(req)
    }

    async fn add_block(&self, req: AddBlockReq) -> Result<AddBlockRsp> {
        self.enter("add_block", Some(&req.path)).await?;
        self.nn.add_block(req)
    }

    async fn complete(&self, req: CompleteReq) -> Result<CompleteRsp> {
        self.enter("complete", Some(&req.path)).await?;
        self.nn.complete(req)
    }

    async fn read_block(&self, req: ReadBlockReq) -> Result<ReadBlockRsp> {
        self.enter("read_block", None).await?;
        self.nn.read_block(req)
    }

    async fn write_block(&self, req: WriteBlockReq) -> Result<WriteBlockRsp> {
        self.enter("write_block", None).await?;
        self.nn.write_block(req)
    }

    async fn shutdown(&self) -> Result<()> {
        self.enter("shutdown", None).await?;
        if self.closed.swap(true, Ordering::SeqCst) {
            return make_error_msg(RPCCode::SOCKET_CLOSED, "connection is closed");
        }
        self.nn.live_connections.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Routes endpoints to registered [`InMemoryNamenode`]s.
#[derive(Default)]
pub struct InMemoryConnector {
    namenodes: Mutex<HashMap<Endpoint, Arc<InMemoryNamenode>>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `endpoint` from `nn`, replacing any previous registration.
    pub fn register(&self, endpoint: Endpoint, nn: Arc<InMemoryNamenode>) {
        self.namenodes.lock().insert(endpoint, nn);
    }

    /// Stop serving `endpoint`; later connects to it are refused.
    pub fn unregister(&self, endpoint: &Endpoint) {
        self.namenodes.lock().remove(endpoint);
    }
}

#[async_trait]
impl NamenodeConnector for InMemoryConnector {
    async fn connect(&self, endpoint: &Endpoint, user: &str) -> Result<Arc<dyn INamenodeStub>> {
        let nn = self.namenodes.lock().get(endpoint).cloned();
        match nn {
            Some(nn) => Ok(Arc::new(nn.connect(user))),
            None => make_error_msg(
                RPCCode::CONNECT_FAILED,
                format!("no namenode listening on {}", endpoint),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> (Arc<InMemoryNamenode>, InMemoryConnection) {
        let nn = InMemoryNamenode::new().into_arc();
        let c = nn.connect("alice");
        (nn, c)
    }

    async fn write_file(c: &InMemoryConnection, path: &str, data: &[u8]) {
        let created = c
            .create(CreateReq {
                path: Some(path.into()),
                overwrite: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let blk = c
            .add_block(AddBlockReq {
                path: path.into(),
                lease: created.lease,
                previous: None,
            })
            .await
            .unwrap()
            .block;
        c.write_block(WriteBlockReq {
            block: blk.block,
            host: blk.hosts[0].clone(),
            lease: created.lease,
            offset: 0,
            data: Bytes::copy_from_slice(data),
        })
        .await
        .unwrap();
        let done = c
            .complete(CompleteReq {
                path: path.into(),
                lease: created.lease,
                last: Some(blk.block),
                length: data.len() as i64,
            })
            .await
            .unwrap();
        assert!(done.completed);
    }

    #[test]
    fn test_canonical() {
        assert_eq!(canonical("/a//b/./c/../d/").unwrap(), "/a/b/d");
        assert_eq!(canonical("/..").unwrap(), "/");
        assert!(canonical("relative").is_err());
        assert!(canonical("").is_err());
    }

    #[test]
    fn test_parent_and_base() {
        assert_eq!(parent_of("/a/b"), Some("/a"));
        assert_eq!(parent_of("/a"), Some("/"));
        assert_eq!(parent_of("/"), None);
        assert_eq!(base_name("/a/b"), "b");
    }

    #[tokio::test]
    async fn test_list_status_is_ambiguous() {
        let (_nn, c) = conn();
        c.mkdirs(MkdirsReq {
            path: "/empty".into(),
            permission: 0,
        })
        .await
        .unwrap();
        let empty = c
            .list_status(ListStatusReq {
                path: "/empty".into(),
            })
            .await
            .unwrap();
        let missing = c
            .list_status(ListStatusReq {
                path: "/missing".into(),
            })
            .await
            .unwrap();
        assert_eq!(empty.entries, None);
        assert_eq!(missing.entries, None);
    }

    #[tokio::test]
    async fn test_write_then_read_block() {
        let (nn, c) = conn();
        write_file(&c, "/data/f", b"hello world").await;
        assert_eq!(nn.block_count(), 1);

        let info = c
            .get_file_info(GetFileInfoReq { path: "/data/f".into() })
            .await
            .unwrap()
            .status
            .unwrap();
        assert_eq!(info.length, 11);
        assert_eq!(info.owner, "alice");

        let located = c
            .get_block_locations(GetBlockLocationsReq {
                path: "/data/f".into(),
                offset: 0,
                length: i64::MAX,
            })
            .await
            .unwrap()
            .blocks
            .unwrap();
        assert!(!located.under_construction);
        let blk = &located.blocks[0];
        let rsp = c
            .read_block(ReadBlockReq {
                block: blk.block,
                host: blk.hosts[0].clone(),
                offset: 6,
                length: 100,
            })
            .await
            .unwrap();
        assert_eq!(&rsp.data[..], b"world");
    }

    #[tokio::test]
    async fn test_create_without_path_assigns_one() {
        let (_nn, c) = conn();
        let rsp = c
            .create(CreateReq {
                path: None,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(rsp.status.path.starts_with(AUTO_PATH_DIR));
        assert_eq!(rsp.status.replication, ServerDefaults::default().replication);
    }

    #[tokio::test]
    async fn test_create_conflicts() {
        let (_nn, c) = conn();
        let first = c
            .create(CreateReq {
                path: Some("/f".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let err = c
            .create(CreateReq {
                path: Some("/f".into()),
                overwrite: true,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), MetaCode::LEASE_CONFLICT);

        c.complete(CompleteReq {
            path: "/f".into(),
            lease: first.lease,
            last: None,
            length: 0,
        })
        .await
        .unwrap();
        let err = c
            .create(CreateReq {
                path: Some("/f".into()),
                overwrite: false,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), MetaCode::EXISTS);
    }

    #[tokio::test]
    async fn test_delete_non_recursive_on_non_empty_dir() {
        let (_nn, c) = conn();
        write_file(&c, "/d/f", b"x").await;
        let err = c
            .delete(DeleteReq {
                path: "/d".into(),
                recursive: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), MetaCode::NOT_EMPTY);
        let rsp = c
            .delete(DeleteReq {
                path: "/d".into(),
                recursive: true,
            })
            .await
            .unwrap();
        assert!(rsp.deleted);
    }

    #[tokio::test]
    async fn test_rename_into_directory() {
        let (_nn, c) = conn();
        write_file(&c, "/a/f", b"abc").await;
        c.mkdirs(MkdirsReq {
            path: "/b".into(),
            permission: 0,
        })
        .await
        .unwrap();
        let rsp = c
            .rename(RenameReq {
                src: "/a".into(),
                dst: "/b".into(),
            })
            .await
            .unwrap();
        assert!(rsp.renamed);
        let moved = c
            .get_file_info(GetFileInfoReq {
                path: "/b/a/f".into(),
            })
            .await
            .unwrap();
        assert_eq!(moved.status.unwrap().length, 3);

        let into_self = c
            .rename(RenameReq {
                src: "/b".into(),
                dst: "/b/a/sub".into(),
            })
            .await
            .unwrap();
        assert!(!into_self.renamed);
    }

    #[tokio::test]
    async fn test_fault_injection_and_recording() {
        let (nn, c) = conn();
        nn.fail_op("mkdirs", Status::new(RPCCode::TIMEOUT));
        let err = c
            .mkdirs(MkdirsReq {
                path: "/x".into(),
                permission: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), RPCCode::TIMEOUT);
        assert_eq!(
            nn.calls(),
            vec![RecordedCall {
                op: "mkdirs",
                path: Some("/x".into())
            }]
        );
        nn.clear_faults();
        assert!(c
            .mkdirs(MkdirsReq {
                path: "/x".into(),
                permission: 0
            })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_connection_lifecycle() {
        let nn = InMemoryNamenode::new().into_arc();
        let connector = InMemoryConnector::new();
        let ep = Endpoint::new("nn1", 8020);
        connector.register(ep.clone(), Arc::clone(&nn));

        let stub = connector.connect(&ep, "alice").await.unwrap();
        assert_eq!(nn.live_connections(), 1);
        stub.shutdown().await.unwrap();
        assert_eq!(nn.live_connections(), 0);
        let err = stub
            .get_file_info(GetFileInfoReq { path: "/".into() })
            .await
            .unwrap_err();
        assert_eq!(err.code(), RPCCode::SOCKET_CLOSED);

        let refused = connector
            .connect(&Endpoint::new("nowhere", 8020), "alice")
            .await;
        assert_eq!(refused.err().map(|s| s.code()), Some(RPCCode::CONNECT_FAILED));
    }

    #[tokio::test]
    async fn test_write_block_rejects_overflow() {
        let nn = InMemoryNamenode::with_defaults(
            ServerDefaults {
                block_size: 4,
                ..ServerDefaults::default()
            },
            vec!["dn1".into()],
        )
        .into_arc();
        let c = nn.connect("alice");
        let created = c
            .create(CreateReq {
                path: Some("/small".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let blk = c
            .add_block(AddBlockReq {
                path: "/small".into(),
                lease: created.lease,
                previous: None,
            })
            .await
            .unwrap()
            .block;
        assert_eq!(blk.hosts, vec!["dn1".to_string()]);
        let err = c
            .write_block(WriteBlockReq {
                block: blk.block,
                host: "dn1".into(),
                lease: created.lease,
                offset: 0,
                data: Bytes::from_static(b"12345"),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), StorageCode::BLOCK_SIZE_EXCEEDED);
    }
}
