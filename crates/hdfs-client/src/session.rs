//! Metadata session: one connection to one namenode endpoint.
//!
//! A [`Session`] owns at most one live stub connection and a working
//! directory against which relative paths are resolved. Every operation
//! holds the session lock for its whole duration, so operations issued on
//! one session are serialized while independent sessions proceed in
//! parallel.
//!
//! Failures reported by the namenode are surfaced as typed
//! [`ClientError`]s carrying the path, the endpoint host and the
//! underlying [`Status`]. Nothing is retried.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hdfs_proto::{
    DeleteReq, GetBlockLocationsReq, GetFileInfoReq, GetFsStatsReq, GetServerDefaultsReq,
    ListStatusReq, MkdirsReq, RenameReq, SetOwnerReq, SetPermissionReq, SetReplicationReq,
    SetTimesReq,
};
use hdfs_stubs::{INamenodeStub, NamenodeConnector};
use hdfs_types::{Endpoint, RPCCode, Status, make_error_msg};
use tokio::sync::{Mutex, MutexGuard};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::file::{FileHandle, OpenMode};
use crate::info::{BlockLocation, ObjectKind, PathInfo};
use crate::path;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

enum Connection {
    /// Never connected.
    Idle,
    Live(Arc<dyn INamenodeStub>),
    /// Disconnected. Terminal.
    Closed,
}

struct SessionState {
    conn: Connection,
    endpoint: Option<Endpoint>,
    cwd: String,
}

impl SessionState {
    fn host(&self) -> String {
        self.endpoint
            .as_ref()
            .map(|ep| ep.host.clone())
            .unwrap_or_default()
    }
}

pub(crate) struct SessionInner {
    config: ClientConfig,
    connector: Arc<dyn NamenodeConnector>,
    state: Mutex<SessionState>,
    leaked_handles: AtomicUsize,
}

impl SessionInner {
    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Lock the session and return the live connection, or `ClosedSession`.
    pub(crate) async fn lock_live(&self) -> ClientResult<Live<'_>> {
        let state = self.state.lock().await;
        let stub = match &state.conn {
            Connection::Live(stub) => Arc::clone(stub),
            Connection::Idle | Connection::Closed => {
                return Err(ClientError::ClosedSession { host: state.host() });
            }
        };
        let host = state.host();
        Ok(Live {
            state,
            stub,
            host,
            rpc_timeout: self.config.rpc_timeout,
        })
    }

    pub(crate) fn report_leak(&self) {
        self.leaked_handles.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if matches!(state.conn, Connection::Live(_)) {
            tracing::debug!(
                host = %state.host(),
                "session dropped while connected; releasing connection"
            );
        }
    }
}

/// A locked, connected session. Dropping it releases the session lock.
pub(crate) struct Live<'a> {
    state: MutexGuard<'a, SessionState>,
    pub(crate) stub: Arc<dyn INamenodeStub>,
    pub(crate) host: String,
    rpc_timeout: Duration,
}

impl Live<'_> {
    /// Validate `input` and resolve it against the working directory.
    pub(crate) fn resolve(&self, input: &str) -> ClientResult<String> {
        path::validate(input)?;
        Ok(path::resolve(&self.state.cwd, input))
    }

    /// Await one stub call, bounded by the configured RPC timeout.
    pub(crate) async fn call<T>(
        &self,
        fut: impl Future<Output = hdfs_types::Result<T>>,
    ) -> hdfs_types::Result<T> {
        match tokio::time::timeout(self.rpc_timeout, fut).await {
            Ok(result) => result,
            Err(_) => make_error_msg(
                RPCCode::TIMEOUT,
                format!("no response from {} within {:?}", self.host, self.rpc_timeout),
            ),
        }
    }

    pub(crate) fn op_error(&self, op: &'static str, path: &str, status: Option<Status>) -> ClientError {
        match &status {
            Some(s) => tracing::warn!(op, path, host = %self.host, "operation failed: {}", s),
            None => tracing::warn!(op, path, host = %self.host, "operation refused"),
        }
        ClientError::Operation {
            op,
            path: path.to_string(),
            host: self.host.clone(),
            status,
        }
    }

    pub(crate) fn not_found(&self, path: &str) -> ClientError {
        ClientError::NotFound {
            path: path.to_string(),
            host: self.host.clone(),
        }
    }

    /// Stat an already resolved path.
    async fn stat_abs(&self, abs: &str) -> ClientResult<PathInfo> {
        let rsp = self
            .call(self.stub.get_file_info(GetFileInfoReq { path: abs.to_string() }))
            .await
            .map_err(|s| self.op_error("stat", abs, Some(s)))?;
        rsp.status
            .map(PathInfo::from)
            .ok_or_else(|| self.not_found(abs))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Handle to a metadata session. Clones share the same connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create an unconnected session.
    pub fn new(config: ClientConfig, connector: Arc<dyn NamenodeConnector>) -> Self {
        let cwd = config.home_directory();
        Self {
            inner: Arc::new(SessionInner {
                config,
                connector,
                state: Mutex::new(SessionState {
                    conn: Connection::Idle,
                    endpoint: None,
                    cwd,
                }),
                leaked_handles: AtomicUsize::new(0),
            }),
        }
    }

    /// Create a session and connect it to `host:port`.
    pub async fn connected(
        config: ClientConfig,
        connector: Arc<dyn NamenodeConnector>,
        host: &str,
        port: u16,
    ) -> ClientResult<Self> {
        let session = Self::new(config, connector);
        session.connect(host, port).await?;
        Ok(session)
    }

    // ---- Lifecycle ----

    /// Connect to `host:port`. Port 0 selects the default namenode port.
    pub async fn connect(&self, host: &str, port: u16) -> ClientResult<()> {
        let mut state = self.inner.state.lock().await;
        match state.conn {
            Connection::Live(_) => {
                return Err(ClientError::AlreadyConnected { host: state.host() });
            }
            Connection::Closed => {
                return Err(ClientError::ClosedSession { host: state.host() });
            }
            Connection::Idle => {}
        }

        let endpoint = Endpoint::new(host, port);
        let connection_error = |status: Status| ClientError::Connection {
            host: host.to_string(),
            port: endpoint.port,
            status,
        };
        endpoint
            .validate()
            .map_err(|e| connection_error(Status::with_message(RPCCode::INVALID_ADDR, e.to_string())))?;

        let timeout = self.inner.config.connect_timeout;
        let connecting = self.inner.connector.connect(&endpoint, &self.inner.config.user);
        let stub = match tokio::time::timeout(timeout, connecting).await {
            Ok(Ok(stub)) => stub,
            Ok(Err(status)) => {
                tracing::warn!(%endpoint, "connect failed: {}", status);
                return Err(connection_error(status));
            }
            Err(_) => {
                tracing::warn!(%endpoint, "connect timed out after {:?}", timeout);
                return Err(connection_error(Status::with_message(
                    RPCCode::TIMEOUT,
                    format!("no connection within {:?}", timeout),
                )));
            }
        };

        tracing::info!(%endpoint, user = %self.inner.config.user, "connected to namenode");
        state.conn = Connection::Live(stub);
        state.endpoint = Some(endpoint);
        Ok(())
    }

    /// Release the connection. The session is closed afterwards even if the
    /// release itself fails.
    pub async fn disconnect(&self) -> ClientResult<()> {
        let mut state = self.inner.state.lock().await;
        let stub = match &state.conn {
            Connection::Live(stub) => Arc::clone(stub),
            Connection::Idle | Connection::Closed => {
                return Err(ClientError::ClosedSession { host: state.host() });
            }
        };
        state.conn = Connection::Closed;
        let host = state.host();
        let timeout = self.inner.config.rpc_timeout;
        let result = match tokio::time::timeout(timeout, stub.shutdown()).await {
            Ok(r) => r,
            Err(_) => make_error_msg(RPCCode::TIMEOUT, "shutdown timed out"),
        };
        match result {
            Ok(()) => {
                tracing::info!(%host, "disconnected from namenode");
                Ok(())
            }
            Err(status) => {
                tracing::warn!(%host, "disconnect failed: {}", status);
                Err(ClientError::Disconnect { host, status })
            }
        }
    }

    /// Whether the session currently holds a live connection.
    pub async fn is_connected(&self) -> bool {
        matches!(self.inner.state.lock().await.conn, Connection::Live(_))
    }

    /// Endpoint of the current or last connection.
    pub async fn endpoint(&self) -> Option<Endpoint> {
        self.inner.state.lock().await.endpoint.clone()
    }

    /// Number of file handles of this session dropped without `close`.
    pub fn leaked_handles(&self) -> usize {
        self.inner.leaked_handles.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ---- Queries ----

    /// Whether `path` exists. Fails only when the service cannot be asked.
    pub async fn exists(&self, path: &str) -> ClientResult<bool> {
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, "exists");
        match live
            .call(live.stub.get_file_info(GetFileInfoReq { path: abs.clone() }))
            .await
        {
            Ok(rsp) => Ok(rsp.status.is_some()),
            Err(status) if status.is_not_found() => Ok(false),
            Err(status) => Err(live.op_error("stat", &abs, Some(status))),
        }
    }

    /// Metadata of `path`.
    pub async fn stat(&self, path: &str) -> ClientResult<PathInfo> {
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, "stat");
        live.stat_abs(&abs).await
    }

    /// Entries of the directory `path`, or the file itself if `path` is a file.
    ///
    /// The namenode answers a listing of an empty directory and of a missing
    /// path the same way, so existence is checked first.
    pub async fn list_directory(&self, path: &str) -> ClientResult<Vec<PathInfo>> {
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, "list_directory");
        live.stat_abs(&abs).await?;
        let rsp = live
            .call(live.stub.list_status(ListStatusReq { path: abs.clone() }))
            .await
            .map_err(|s| live.op_error("list", &abs, Some(s)))?;
        Ok(rsp
            .entries
            .unwrap_or_default()
            .into_iter()
            .map(PathInfo::from)
            .collect())
    }

    // ---- Mutations ----

    /// Delete `path`, recursing into directories.
    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        self.delete_with(path, true).await
    }

    /// Delete `path`. A non-empty directory requires `recursive`.
    pub async fn delete_with(&self, path: &str, recursive: bool) -> ClientResult<()> {
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, recursive, "delete");
        let rsp = live
            .call(live.stub.delete(DeleteReq {
                path: abs.clone(),
                recursive,
            }))
            .await
            .map_err(|s| live.op_error("delete", &abs, Some(s)))?;
        if !rsp.deleted {
            return Err(live.op_error("delete", &abs, None));
        }
        Ok(())
    }

    /// Rename `from` to `to`. If `to` is an existing directory, `from` is
    /// moved into it.
    pub async fn rename(&self, from: &str, to: &str) -> ClientResult<()> {
        let live = self.inner.lock_live().await?;
        let src = live.resolve(from)?;
        let dst = live.resolve(to)?;
        tracing::debug!(%src, %dst, "rename");
        let rsp = live
            .call(live.stub.rename(RenameReq {
                src: src.clone(),
                dst,
            }))
            .await
            .map_err(|s| live.op_error("rename", &src, Some(s)))?;
        if !rsp.renamed {
            return Err(live.op_error("rename", &src, None));
        }
        Ok(())
    }

    /// Create `path` and any missing parents.
    pub async fn mkdir(&self, path: &str) -> ClientResult<()> {
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, "mkdir");
        let rsp = live
            .call(live.stub.mkdirs(MkdirsReq {
                path: abs.clone(),
                permission: 0,
            }))
            .await
            .map_err(|s| live.op_error("create directory", &abs, Some(s)))?;
        if !rsp.created {
            return Err(live.op_error("create directory", &abs, None));
        }
        Ok(())
    }

    /// Change the replication factor of the file `path`.
    pub async fn set_replication(&self, path: &str, replication: i32) -> ClientResult<()> {
        if replication <= 0 {
            return Err(ClientError::InvalidArgument(format!(
                "replication must be positive, got {}",
                replication
            )));
        }
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, replication, "set_replication");
        let rsp = live
            .call(live.stub.set_replication(SetReplicationReq {
                path: abs.clone(),
                replication,
            }))
            .await
            .map_err(|s| live.op_error("set replication of", &abs, Some(s)))?;
        if !rsp.applied {
            return Err(live.op_error("set replication of", &abs, None));
        }
        Ok(())
    }

    /// Change the permission bits of `path`.
    pub async fn chmod(&self, path: &str, mode: u16) -> ClientResult<()> {
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, mode = %format!("{:o}", mode), "chmod");
        live.call(live.stub.set_permission(SetPermissionReq {
            path: abs.clone(),
            permission: mode,
        }))
        .await
        .map_err(|s| live.op_error("change permissions of", &abs, Some(s)))?;
        Ok(())
    }

    /// Change owner and/or group of `path`. `None` leaves that field unchanged.
    pub async fn chown(
        &self,
        path: &str,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> ClientResult<()> {
        if owner.is_none() && group.is_none() {
            return Err(ClientError::InvalidArgument(
                "chown needs an owner or a group".into(),
            ));
        }
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, ?owner, ?group, "chown");
        live.call(live.stub.set_owner(SetOwnerReq {
            path: abs.clone(),
            owner: owner.map(str::to_string),
            group: group.map(str::to_string),
        }))
        .await
        .map_err(|s| live.op_error("change owner of", &abs, Some(s)))?;
        Ok(())
    }

    /// Set modification and access times of `path`, in milliseconds since
    /// the epoch. A negative value leaves that time unchanged.
    pub async fn utime(&self, path: &str, mtime: i64, atime: i64) -> ClientResult<()> {
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, mtime, atime, "utime");
        live.call(live.stub.set_times(SetTimesReq {
            path: abs.clone(),
            modification_time: mtime,
            access_time: atime,
        }))
        .await
        .map_err(|s| live.op_error("set times of", &abs, Some(s)))?;
        Ok(())
    }

    // ---- Working directory ----

    pub async fn working_directory(&self) -> ClientResult<String> {
        let live = self.inner.lock_live().await?;
        Ok(live.state.cwd.clone())
    }

    /// Change the working directory to `path` resolved against the current
    /// one, exactly as other operations resolve it. Existence is not checked.
    pub async fn set_working_directory(&self, path: &str) -> ClientResult<()> {
        let mut live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(cwd = %abs, "set_working_directory");
        live.state.cwd = abs;
        Ok(())
    }

    // ---- Filesystem-wide ----

    /// Raw capacity of the filesystem in bytes.
    pub async fn capacity(&self) -> ClientResult<i64> {
        let live = self.inner.lock_live().await?;
        let rsp = live
            .call(live.stub.get_fs_stats(GetFsStatsReq {}))
            .await
            .map_err(|s| live.op_error("get capacity of", "/", Some(s)))?;
        Ok(rsp.stats.capacity)
    }

    /// Bytes used by all replicas of all files.
    pub async fn used(&self) -> ClientResult<i64> {
        let live = self.inner.lock_live().await?;
        let rsp = live
            .call(live.stub.get_fs_stats(GetFsStatsReq {}))
            .await
            .map_err(|s| live.op_error("get used space of", "/", Some(s)))?;
        Ok(rsp.stats.used)
    }

    /// Block size the namenode applies when a writer does not choose one.
    pub async fn default_block_size(&self) -> ClientResult<i64> {
        let live = self.inner.lock_live().await?;
        let rsp = live
            .call(live.stub.get_server_defaults(GetServerDefaultsReq {}))
            .await
            .map_err(|s| live.op_error("get default block size of", "/", Some(s)))?;
        Ok(rsp.defaults.block_size)
    }

    /// Hosts of each block of `path` overlapping `[offset, offset + length)`,
    /// in block order. A missing file or an empty result is an error.
    pub async fn get_block_locations(
        &self,
        path: &str,
        offset: i64,
        length: i64,
    ) -> ClientResult<Vec<BlockLocation>> {
        if offset < 0 || length < 0 {
            return Err(ClientError::InvalidArgument(format!(
                "block range must not be negative, got offset {} length {}",
                offset, length
            )));
        }
        let live = self.inner.lock_live().await?;
        let abs = live.resolve(path)?;
        tracing::debug!(path = %abs, offset, length, "get_block_locations");
        let rsp = live
            .call(live.stub.get_block_locations(GetBlockLocationsReq {
                path: abs.clone(),
                offset,
                length,
            }))
            .await
            .map_err(|s| live.op_error("get block locations of", &abs, Some(s)))?;
        match rsp.blocks {
            Some(located) if !located.blocks.is_empty() => {
                Ok(located.blocks.into_iter().map(BlockLocation::from).collect())
            }
            _ => Err(live.op_error("get block locations of", &abs, None)),
        }
    }

    // ---- Files ----

    /// Open `path`. Zero for `buffer_size`, `replication` or `block_size`
    /// selects the configured or server default. An empty path in write
    /// mode lets the namenode choose one; see [`FileHandle::path`].
    pub async fn open(
        &self,
        path: &str,
        mode: OpenMode,
        buffer_size: usize,
        replication: i32,
        block_size: i64,
    ) -> ClientResult<FileHandle> {
        FileHandle::open(&self.inner, path, mode, buffer_size, replication, block_size).await
    }

    // ---- Cross-session ----

    /// Copy `src` of this session to `dst_path` of `dst`. Directories are
    /// copied recursively. If `dst_path` is an existing directory the copy
    /// lands inside it.
    pub async fn copy_to(&self, src: &str, dst: &Session, dst_path: &str) -> ClientResult<()> {
        let root = self.stat(src).await?;
        let dst_abs = {
            let live = dst.inner.lock_live().await?;
            path::normalize(&live.resolve(dst_path)?)
        };
        let target = match dst.stat(&dst_abs).await {
            Ok(info) if info.is_dir() => path::join(&dst_abs, path::file_name(&root.name)),
            Ok(_) => dst_abs,
            Err(e) if e.is_not_found() => dst_abs,
            Err(e) => return Err(e),
        };
        if self.same_filesystem(dst).await && is_within(&target, &root.name) {
            return Err(ClientError::InvalidArgument(format!(
                "cannot copy {} onto or into itself ({})",
                root.name, target
            )));
        }
        tracing::debug!(src = %root.name, dst = %target, "copy");

        let mut pending = vec![(root, target)];
        while let Some((info, to)) = pending.pop() {
            match info.kind {
                ObjectKind::Directory => {
                    dst.mkdir(&to).await?;
                    for child in self.list_directory(&info.name).await? {
                        let child_to = path::join(&to, path::file_name(&child.name));
                        pending.push((child, child_to));
                    }
                }
                ObjectKind::File => self.copy_file(&info.name, dst, &to).await?,
                ObjectKind::Unknown => {
                    tracing::warn!(path = %info.name, "skipping entry of unknown kind");
                }
            }
        }
        Ok(())
    }

    async fn same_filesystem(&self, other: &Session) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        match (self.endpoint().await, other.endpoint().await) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Copy `src` to `dst`, then delete `src`.
    pub async fn move_to(&self, src: &str, dst: &Session, dst_path: &str) -> ClientResult<()> {
        self.copy_to(src, dst, dst_path).await?;
        self.delete(src).await
    }

    async fn copy_file(&self, src: &str, dst: &Session, to: &str) -> ClientResult<()> {
        let mut reader = self.open(src, OpenMode::Read, 0, 0, 0).await?;
        let mut writer = match dst.open(to, OpenMode::Write, 0, 0, 0).await {
            Ok(w) => w,
            Err(e) => {
                let _ = reader.close().await;
                return Err(e);
            }
        };
        let pumped = pump(&mut reader, &mut writer).await;
        let written = writer.close().await;
        let read = reader.close().await;
        pumped?;
        written?;
        read
    }
}

async fn pump(reader: &mut FileHandle, writer: &mut FileHandle) -> ClientResult<()> {
    let chunk = reader.buffer_size();
    loop {
        let data = reader.read(chunk).await?;
        if data.is_empty() {
            return Ok(());
        }
        writer.write(&data).await?;
    }
}

/// Whether `path` equals `dir` or lies below it.
fn is_within(path: &str, dir: &str) -> bool {
    dir == "/" || path == dir || path.starts_with(&format!("{}/", dir))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hdfs_stubs::{InMemoryConnector, InMemoryNamenode, RecordedCall};
    use hdfs_types::MetaCode;

    use crate::error::ErrorKind;

    pub(crate) const NN_HOST: &str = "nn1";

    pub(crate) async fn setup() -> (Arc<InMemoryNamenode>, Session) {
        let nn = InMemoryNamenode::new().into_arc();
        let connector = Arc::new(InMemoryConnector::new());
        connector.register(Endpoint::new(NN_HOST, 0), Arc::clone(&nn));
        let session = Session::connected(ClientConfig::for_user("alice"), connector, NN_HOST, 0)
            .await
            .unwrap();
        (nn, session)
    }

    pub(crate) async fn write_file(session: &Session, path: &str, data: &[u8]) {
        let mut f = session.open(path, OpenMode::Write, 0, 0, 0).await.unwrap();
        f.write(data).await.unwrap();
        f.close().await.unwrap();
    }

    async fn read_all(session: &Session, path: &str) -> Vec<u8> {
        let mut f = session.open(path, OpenMode::Read, 0, 0, 0).await.unwrap();
        let mut out = Vec::new();
        loop {
            let chunk = f.read(4096).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        f.close().await.unwrap();
        out
    }

    // ---- Lifecycle ----

    #[tokio::test]
    async fn test_connect_lifecycle() {
        let (nn, session) = setup().await;
        assert!(session.is_connected().await);
        assert_eq!(nn.live_connections(), 1);
        assert_eq!(session.endpoint().await, Some(Endpoint::new(NN_HOST, 8020)));

        let err = session.connect(NN_HOST, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyConnected);
        assert_eq!(nn.live_connections(), 1);

        session.disconnect().await.unwrap();
        assert_eq!(nn.live_connections(), 0);
        assert!(!session.is_connected().await);

        let err = session.exists("/").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClosedSession);
        let err = session.disconnect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClosedSession);
        let err = session.connect(NN_HOST, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClosedSession);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let connector = Arc::new(InMemoryConnector::new());
        let err = Session::connected(ClientConfig::for_user("alice"), connector.clone(), "nowhere", 9000)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.status().map(Status::code), Some(RPCCode::CONNECT_FAILED));

        let err = Session::connected(ClientConfig::for_user("alice"), connector, "bad host", 9000)
            .await
            .err()
            .unwrap();
        assert_eq!(err.status().map(Status::code), Some(RPCCode::INVALID_ADDR));
    }

    #[tokio::test]
    async fn test_unconnected_session_is_closed() {
        let session = Session::new(
            ClientConfig::for_user("alice"),
            Arc::new(InMemoryConnector::new()),
        );
        let err = session.stat("/").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClosedSession);
    }

    #[tokio::test]
    async fn test_disconnect_failure_still_closes() {
        let (nn, session) = setup().await;
        nn.fail_op("shutdown", Status::new(RPCCode::SOCKET_ERROR));
        let err = session.disconnect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Disconnect);
        assert!(!session.is_connected().await);
    }

    // ---- Queries ----

    #[tokio::test]
    async fn test_exists_stat_list_consistency() {
        let (_nn, session) = setup().await;
        write_file(&session, "/data/present", b"abc").await;

        assert!(session.exists("/data/present").await.unwrap());
        let info = session.stat("/data/present").await.unwrap();
        assert_eq!(info.kind, ObjectKind::File);
        assert_eq!(info.size, 3);
        assert_eq!(info.owner, "alice");
        let listed = session.list_directory("/data").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "/data/present");

        assert!(!session.exists("/data/absent").await.unwrap());
        let err = session.stat("/data/absent").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = session.list_directory("/data/absent").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_missing_never_reaches_list_call() {
        let (nn, session) = setup().await;
        nn.clear_calls();
        let _ = session.list_directory("/nope").await;
        assert!(nn.calls().iter().all(|c| c.op != "list_status"));
    }

    #[tokio::test]
    async fn test_empty_directory_lists_empty() {
        let (_nn, session) = setup().await;
        session.mkdir("/empty").await.unwrap();
        assert!(session.list_directory("/empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_file_returns_itself() {
        let (_nn, session) = setup().await;
        write_file(&session, "/f", b"1").await;
        let listed = session.list_directory("/f").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "/f");
    }

    #[tokio::test]
    async fn test_exists_fails_on_transport_error() {
        let (nn, session) = setup().await;
        nn.fail_op("get_file_info", Status::new(RPCCode::SOCKET_ERROR));
        let err = session.exists("/x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);
        assert!(err.status().is_some_and(Status::is_transport));
    }

    #[tokio::test]
    async fn test_rpc_timeout() {
        let (nn, session) = setup().await;
        let session = {
            let mut cfg = session.config().clone();
            cfg.rpc_timeout = Duration::from_millis(20);
            let connector = Arc::new(InMemoryConnector::new());
            connector.register(Endpoint::new(NN_HOST, 0), Arc::clone(&nn));
            Session::connected(cfg, connector, NN_HOST, 0).await.unwrap()
        };
        nn.pause();
        let err = session.stat("/").await.unwrap_err();
        nn.resume();
        assert_eq!(err.status().map(Status::code), Some(RPCCode::TIMEOUT));
    }

    // ---- Mutations ----

    #[tokio::test]
    async fn test_mkdir_rename_delete() {
        let (_nn, session) = setup().await;
        session.mkdir("/a/b/c").await.unwrap();
        assert!(session.stat("/a/b").await.unwrap().is_dir());

        session.rename("/a/b", "/a/moved").await.unwrap();
        assert!(session.exists("/a/moved/c").await.unwrap());
        assert!(!session.exists("/a/b").await.unwrap());

        let err = session.rename("/a/b", "/a/other").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);

        let err = session.delete_with("/a", false).await.unwrap_err();
        assert_eq!(err.status().map(Status::code), Some(MetaCode::NOT_EMPTY));
        session.delete("/a").await.unwrap();
        assert!(!session.exists("/a").await.unwrap());

        let err = session.delete("/a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);
        assert!(err.to_string().contains("cannot delete /a in filesystem on nn1"));
    }

    #[tokio::test]
    async fn test_set_replication_rejects_non_positive_without_dispatch() {
        let (nn, session) = setup().await;
        write_file(&session, "/f", b"x").await;
        nn.clear_calls();
        for bad in [0, -1] {
            let err = session.set_replication("/f", bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert_eq!(nn.call_count(), 0);

        session.set_replication("/f", 2).await.unwrap();
        assert_eq!(session.stat("/f").await.unwrap().replication, 2);
        let err = session.set_replication("/missing", 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);
    }

    #[tokio::test]
    async fn test_attribute_setters() {
        let (_nn, session) = setup().await;
        write_file(&session, "/f", b"x").await;
        session.chmod("/f", 0o600).await.unwrap();
        session.chown("/f", None, Some("staff")).await.unwrap();
        session.utime("/f", 1_000, -1).await.unwrap();
        let info = session.stat("/f").await.unwrap();
        assert_eq!(info.permission, 0o600);
        assert_eq!(info.owner, "alice");
        assert_eq!(info.group, "staff");
        assert_eq!(info.last_mod, 1_000);

        let err = session.chmod("/missing", 0o600).await.unwrap_err();
        assert!(err.is_not_found());
        let err = session.chown("/f", None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_invalid_paths_rejected_before_dispatch() {
        let (nn, session) = setup().await;
        nn.clear_calls();
        assert_eq!(session.stat("").await.unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            session.mkdir("/a:b").await.unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(nn.call_count(), 0);
    }

    // ---- Working directory ----

    #[tokio::test]
    async fn test_working_directory_round_trip() {
        let (nn, session) = setup().await;
        assert_eq!(session.working_directory().await.unwrap(), "/user/alice");

        session.set_working_directory("/data/in").await.unwrap();
        assert_eq!(session.working_directory().await.unwrap(), "/data/in");
        session.set_working_directory("../out").await.unwrap();
        assert_eq!(session.working_directory().await.unwrap(), "/data/out");

        for d in ["/a/../b", "x/./y", "/data/out"] {
            let previous = session.working_directory().await.unwrap();
            session.set_working_directory(d).await.unwrap();
            assert_eq!(
                session.working_directory().await.unwrap(),
                path::resolve(&previous, d)
            );
        }
        assert_eq!(session.working_directory().await.unwrap(), "/data/out");

        nn.clear_calls();
        session.mkdir("sub").await.unwrap();
        assert_eq!(
            nn.calls(),
            vec![RecordedCall {
                op: "mkdirs",
                path: Some("/data/out/sub".into()),
            }]
        );
    }

    // ---- Filesystem-wide ----

    #[tokio::test]
    async fn test_fs_stats() {
        let (_nn, session) = setup().await;
        assert_eq!(session.used().await.unwrap(), 0);
        write_file(&session, "/f", &[0u8; 100]).await;
        assert_eq!(session.used().await.unwrap(), 300);
        assert!(session.capacity().await.unwrap() > 300);
        assert_eq!(session.default_block_size().await.unwrap(), 128 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_get_block_locations() {
        let (_nn, session) = setup().await;
        let mut f = session.open("/big", OpenMode::Write, 0, 2, 1024).await.unwrap();
        f.write(&vec![7u8; 2500]).await.unwrap();
        f.close().await.unwrap();

        let all = session.get_block_locations("/big", 0, 2500).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].offset, 0);
        assert_eq!(all[2].offset, 2048);
        assert_eq!(all[2].length, 452);
        assert!(all.iter().all(|b| b.hosts.len() == 2));

        let tail = session.get_block_locations("/big", 2100, 10).await.unwrap();
        assert_eq!(tail, vec![all[2].clone()]);

        let err = session.get_block_locations("/big", -1, 10).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = session.get_block_locations("/missing", 0, 10).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);

        write_file(&session, "/empty", b"").await;
        let err = session.get_block_locations("/empty", 0, 10).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operation);
    }

    // ---- Cross-session ----

    #[tokio::test]
    async fn test_copy_and_move_between_sessions() {
        let (_nn1, src) = setup().await;
        let (_nn2, dst) = setup().await;
        write_file(&src, "/tree/a", b"alpha").await;
        write_file(&src, "/tree/sub/b", b"beta").await;
        src.mkdir("/tree/sub/empty").await.unwrap();
        dst.mkdir("/backup").await.unwrap();

        src.copy_to("/tree", &dst, "/backup").await.unwrap();
        assert_eq!(read_all(&dst, "/backup/tree/a").await, b"alpha");
        assert_eq!(read_all(&dst, "/backup/tree/sub/b").await, b"beta");
        assert!(dst.stat("/backup/tree/sub/empty").await.unwrap().is_dir());
        assert!(src.exists("/tree/a").await.unwrap());

        src.move_to("/tree/a", &dst, "/moved-a").await.unwrap();
        assert_eq!(read_all(&dst, "/moved-a").await, b"alpha");
        assert!(!src.exists("/tree/a").await.unwrap());
        assert_eq!(src.leaked_handles(), 0);
        assert_eq!(dst.leaked_handles(), 0);
    }

    #[tokio::test]
    async fn test_copy_into_itself_rejected() {
        let (_nn, session) = setup().await;
        write_file(&session, "/d/f", b"x").await;
        let err = session.copy_to("/d", &session, "/d/inner").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = session.copy_to("/d/f", &session, "/d/f").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_copy_into_itself_rejected_across_sessions() {
        let (nn, first) = setup().await;
        let connector = Arc::new(InMemoryConnector::new());
        connector.register(Endpoint::new(NN_HOST, 0), Arc::clone(&nn));
        let second = Session::connected(ClientConfig::for_user("alice"), connector, NN_HOST, 0)
            .await
            .unwrap();
        write_file(&first, "/d/f", b"x").await;

        let err = first.copy_to("/d", &second, "/d/inner").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!first.exists("/d/inner").await.unwrap());

        first.copy_to("/d", &second, "/e").await.unwrap();
        assert_eq!(read_all(&second, "/e/f").await, b"x");
    }

    #[tokio::test]
    async fn test_copy_requires_live_destination() {
        let (_nn1, src) = setup().await;
        let (_nn2, dst) = setup().await;
        write_file(&src, "/f", b"x").await;
        dst.disconnect().await.unwrap();
        let err = src.copy_to("/f", &dst, "/f").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClosedSession);
    }

    // ---- Concurrency ----

    async fn wait_for_calls(nn: &InMemoryNamenode, n: usize) {
        while nn.call_count() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_independent_sessions_run_in_parallel() {
        let (nn1, s1) = setup().await;
        let (_nn2, s2) = setup().await;
        nn1.clear_calls();
        nn1.pause();

        let blocked = tokio::spawn({
            let s1 = s1.clone();
            async move { s1.mkdir("/slow").await }
        });
        wait_for_calls(&nn1, 1).await;

        let fast = tokio::time::timeout(Duration::from_secs(5), s2.mkdir("/fast")).await;
        assert!(matches!(fast, Ok(Ok(()))));
        assert!(!blocked.is_finished());

        nn1.resume();
        blocked.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_operations_on_one_session_are_serialized() {
        let (nn, session) = setup().await;
        nn.clear_calls();
        nn.pause();

        let in_flight = tokio::spawn({
            let s = session.clone();
            async move { s.exists("/anything").await }
        });
        wait_for_calls(&nn, 1).await;

        let cwd_update = tokio::spawn({
            let s = session.clone();
            async move { s.set_working_directory("/elsewhere").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cwd_update.is_finished());

        nn.resume();
        assert!(!in_flight.await.unwrap().unwrap());
        cwd_update.await.unwrap().unwrap();
        assert_eq!(session.working_directory().await.unwrap(), "/elsewhere");
    }
}
