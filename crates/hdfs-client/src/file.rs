//! File handles: buffered block reads and writes through a session.
//!
//! A read handle snapshots the file's block list when it is opened and
//! reads block ranges from the first datanode of each block. A write
//! handle accumulates bytes until the buffer fills, then spills them into
//! namenode-allocated blocks. `close` pushes whatever is buffered and
//! completes the file, releasing the write lease.
//!
//! A handle does not keep its session alive. Once the session is gone or
//! disconnected every call fails with `ClosedSession`.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use bytes::{Bytes, BytesMut};
use hdfs_proto::{
    AddBlockReq, AppendReq, CompleteReq, CreateReq, GetBlockLocationsReq, GetFileInfoReq,
    LocatedBlock, ReadBlockReq, WriteBlockReq,
};
use hdfs_types::{LeaseId, MetaCode, Status, StatusCode, StorageCode};

use crate::error::{ClientError, ClientResult};
use crate::session::{Live, SessionInner};

const O_WRONLY: i32 = 0o1;
const O_RDWR: i32 = 0o2;
const O_ACCMODE: i32 = 0o3;
const O_APPEND: i32 = 0o2000;

/// Access mode of a [`FileHandle`]. Append counts as write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

impl OpenMode {
    /// Mode from POSIX open flags. `O_RDWR` is not supported.
    pub fn from_flags(flags: i32) -> ClientResult<Self> {
        match (flags & O_ACCMODE, flags & O_APPEND != 0) {
            (0, false) => Ok(OpenMode::Read),
            (O_WRONLY, false) => Ok(OpenMode::Write),
            (O_WRONLY, true) => Ok(OpenMode::Append),
            (O_RDWR, _) => Err(ClientError::InvalidArgument(
                "files cannot be opened for both reading and writing".into(),
            )),
            _ => Err(ClientError::InvalidArgument(format!(
                "unsupported open flags {:#o}",
                flags
            ))),
        }
    }

    pub fn is_write(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

impl FromStr for OpenMode {
    type Err = ClientError;

    /// Parse `"r"`, `"w"` or `"a"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            "a" => Ok(OpenMode::Append),
            other => Err(ClientError::InvalidArgument(format!(
                "unknown open mode {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::Append => "a",
        })
    }
}

// ---------------------------------------------------------------------------
// Per-mode state
// ---------------------------------------------------------------------------

struct ReadState {
    length: i64,
    blocks: Vec<LocatedBlock>,
    /// Bytes read ahead, starting at file offset `cache_offset`.
    cache: Bytes,
    cache_offset: i64,
}

impl ReadState {
    fn block_at(&self, pos: i64) -> Option<&LocatedBlock> {
        self.blocks
            .iter()
            .find(|b| b.offset <= pos && pos < b.end())
    }

    fn cached(&self, pos: i64, max: usize) -> Option<Bytes> {
        let start = pos - self.cache_offset;
        if start < 0 || start >= self.cache.len() as i64 {
            return None;
        }
        let start = start as usize;
        let end = start.saturating_add(max).min(self.cache.len());
        Some(self.cache.slice(start..end))
    }
}

struct WriteState {
    lease: LeaseId,
    block_size: i64,
    /// Last block of the file, the one further bytes go to while it has room.
    last: Option<LocatedBlock>,
    buf: BytesMut,
}

enum Io {
    Read(ReadState),
    Write(WriteState),
}

// ---------------------------------------------------------------------------
// FileHandle
// ---------------------------------------------------------------------------

/// One open file bound to a session.
///
/// Must be finished with [`FileHandle::close`]. A handle dropped while
/// open is reported as leaked on its session; any bytes still buffered are
/// lost and the write lease stays held.
pub struct FileHandle {
    session: Weak<SessionInner>,
    path: String,
    host: String,
    mode: OpenMode,
    buffer_size: usize,
    pos: i64,
    io: Io,
    closed: bool,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("host", &self.host)
            .field("mode", &self.mode)
            .field("pos", &self.pos)
            .field("closed", &self.closed)
            .finish()
    }
}

impl FileHandle {
    pub(crate) async fn open(
        inner: &Arc<SessionInner>,
        path: &str,
        mode: OpenMode,
        buffer_size: usize,
        replication: i32,
        block_size: i64,
    ) -> ClientResult<Self> {
        if replication < 0 || block_size < 0 {
            return Err(ClientError::InvalidArgument(format!(
                "replication and block size must not be negative, got {} and {}",
                replication, block_size
            )));
        }
        let config = inner.config();
        let buffer_size = if buffer_size == 0 {
            config.default_buffer_size
        } else {
            buffer_size
        };
        let replication = if replication == 0 {
            config.default_replication
        } else {
            replication
        };
        let block_size = if block_size == 0 {
            config.default_block_size
        } else {
            block_size
        };

        let live = inner.lock_live().await?;
        let target = if path.is_empty() {
            None
        } else {
            Some(live.resolve(path)?)
        };
        tracing::debug!(path = ?target, %mode, buffer_size, replication, block_size, "open");

        let (path, io, pos) = match (mode, target) {
            (OpenMode::Read, Some(abs)) => {
                let state = open_read(&live, &abs).await?;
                (abs, Io::Read(state), 0)
            }
            (OpenMode::Write, target) => {
                let req = CreateReq {
                    path: target.clone(),
                    overwrite: true,
                    replication,
                    block_size,
                    permission: 0,
                };
                let rsp = live
                    .call(live.stub.create(req))
                    .await
                    .map_err(|s| open_error(&live, target.as_deref().unwrap_or(""), s))?;
                let state = WriteState {
                    lease: rsp.lease,
                    block_size: rsp.status.block_size,
                    last: None,
                    buf: BytesMut::with_capacity(buffer_size),
                };
                (rsp.status.path, Io::Write(state), 0)
            }
            (OpenMode::Append, Some(abs)) => {
                let rsp = live
                    .call(live.stub.append(AppendReq { path: abs.clone() }))
                    .await
                    .map_err(|s| open_error(&live, &abs, s))?;
                let state = WriteState {
                    lease: rsp.lease,
                    block_size: rsp.status.block_size,
                    last: rsp.last_block,
                    buf: BytesMut::with_capacity(buffer_size),
                };
                (abs, Io::Write(state), rsp.status.length)
            }
            (OpenMode::Read | OpenMode::Append, None) => {
                return Err(ClientError::InvalidArgument(
                    "an empty path can only be opened for writing".into(),
                ));
            }
        };

        Ok(Self {
            session: Arc::downgrade(inner),
            path,
            host: live.host.clone(),
            mode,
            buffer_size,
            pos,
            io,
            closed: false,
        })
    }

    /// Absolute path of the file. For a write handle opened with an empty
    /// path this is the path the namenode assigned.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Current position: next byte to read, or number of bytes in the file
    /// including those accepted but not yet flushed.
    pub fn tell(&self) -> i64 {
        self.pos
    }

    /// File length as seen by this handle.
    pub fn size(&self) -> i64 {
        match &self.io {
            Io::Read(r) => r.length,
            Io::Write(_) => self.pos,
        }
    }

    // ---- Read side ----

    /// Read up to `max` bytes at the cursor. Returns fewer when a block
    /// boundary or end of file is reached, and nothing at end of file.
    pub async fn read(&mut self, max: usize) -> ClientResult<Bytes> {
        let data = self.read_at(self.pos, max).await?;
        self.pos += data.len() as i64;
        Ok(data)
    }

    /// Read up to `len` bytes starting at `pos` without moving the cursor.
    /// Returns fewer only at end of file.
    pub async fn pread(&mut self, pos: i64, len: usize) -> ClientResult<Bytes> {
        if pos < 0 {
            return Err(ClientError::InvalidArgument(format!(
                "negative read position {}",
                pos
            )));
        }
        let length = self.read_state("read")?.length;
        let remaining = usize::try_from((length - pos).max(0)).unwrap_or(usize::MAX);
        let mut out = BytesMut::with_capacity(len.min(remaining));
        let mut at = pos;
        while out.len() < len {
            let chunk = self.read_at(at, len - out.len()).await?;
            if chunk.is_empty() {
                break;
            }
            at += chunk.len() as i64;
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// Move the read cursor. `pos` may be at most the file length.
    pub async fn seek(&mut self, pos: i64) -> ClientResult<()> {
        let length = self.read_state("seek")?.length;
        if pos < 0 || pos > length {
            return Err(ClientError::InvalidArgument(format!(
                "seek position {} outside [0, {}]",
                pos, length
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Bytes left between the cursor and end of file.
    pub fn available(&self) -> ClientResult<i64> {
        let length = self.read_state("query")?.length;
        Ok((length - self.pos).max(0))
    }

    async fn read_at(&mut self, pos: i64, max: usize) -> ClientResult<Bytes> {
        let buffer_size = self.buffer_size;
        let state = self.read_state("read")?;
        if max == 0 || pos >= state.length {
            return Ok(Bytes::new());
        }
        if let Some(hit) = state.cached(pos, max) {
            return Ok(hit);
        }
        let block = match state.block_at(pos) {
            Some(b) => b.clone(),
            None => {
                let status = Status::with_message(
                    StatusCode::DATA_CORRUPTION,
                    format!("no block covers offset {}", pos),
                );
                return Err(self.op_error("read", status));
            }
        };
        let host = match block.hosts.first() {
            Some(h) => h.clone(),
            None => {
                let status = Status::with_message(
                    StorageCode::NO_DATANODE,
                    format!("block {} has no replicas", block.block),
                );
                return Err(self.op_error("read", status));
            }
        };
        let want = i64::try_from(buffer_size.max(max)).unwrap_or(i64::MAX);
        let fetch = (block.end() - pos).min(want);

        let inner = self.session()?;
        let live = inner.lock_live().await?;
        let req = ReadBlockReq {
            block: block.block,
            host,
            offset: pos - block.offset,
            length: fetch,
        };
        let data = live
            .call(live.stub.read_block(req))
            .await
            .map_err(|s| live.op_error("read", &self.path, Some(s)))?
            .data;
        drop(live);

        if data.is_empty() {
            let status = Status::with_message(
                StatusCode::DATA_CORRUPTION,
                format!("block {} returned no data at offset {}", block.block, pos),
            );
            return Err(self.op_error("read", status));
        }
        let served = data.slice(..max.min(data.len()));
        if let Io::Read(state) = &mut self.io {
            state.cache = data;
            state.cache_offset = pos;
        }
        Ok(served)
    }

    // ---- Write side ----

    /// Accept `data` for writing. Bytes are buffered and pushed to the
    /// datanodes once the buffer fills.
    ///
    /// Returns the number of bytes of `data` accepted. If pushing the buffer
    /// fails, the part of `data` that did not reach a datanode is discarded
    /// rather than kept buffered: the call returns the count that did, or
    /// the error when none did. Bytes accepted by earlier calls stay buffered.
    pub async fn write(&mut self, data: &[u8]) -> ClientResult<usize> {
        let buffer_size = self.buffer_size;
        let state = self.write_state("write")?;
        state.buf.extend_from_slice(data);
        self.pos += data.len() as i64;
        let needs_flush = self.write_state("write")?.buf.len() >= buffer_size;
        if !needs_flush {
            return Ok(data.len());
        }
        let Err(e) = self.flush_buffer().await else {
            return Ok(data.len());
        };
        let state = self.write_state("write")?;
        let pending = state.buf.len();
        let unsent = pending.min(data.len());
        state.buf.truncate(pending - unsent);
        self.pos -= unsent as i64;
        match data.len() - unsent {
            0 => Err(e),
            accepted => Ok(accepted),
        }
    }

    /// Push buffered bytes to the datanodes without closing.
    pub async fn flush(&mut self) -> ClientResult<()> {
        self.write_state("flush")?;
        self.flush_buffer().await
    }

    async fn flush_buffer(&mut self) -> ClientResult<()> {
        let inner = self.session()?;
        let path = self.path.clone();
        let Io::Write(state) = &mut self.io else {
            return Ok(());
        };
        if state.buf.is_empty() {
            return Ok(());
        }
        let live = inner.lock_live().await?;
        while !state.buf.is_empty() {
            let block = match state.last.take() {
                Some(b) if b.length < state.block_size => b,
                previous => {
                    let req = AddBlockReq {
                        path: path.clone(),
                        lease: state.lease,
                        previous: previous.as_ref().map(|b| b.block),
                    };
                    match live.call(live.stub.add_block(req)).await {
                        Ok(rsp) => rsp.block,
                        Err(s) => {
                            state.last = previous;
                            return Err(live.op_error("write", &path, Some(s)));
                        }
                    }
                }
            };
            let room = (state.block_size - block.length) as usize;
            let chunk = state.buf.split_to(room.min(state.buf.len())).freeze();
            let host = block.hosts.first().cloned().unwrap_or_default();
            let req = WriteBlockReq {
                block: block.block,
                host,
                lease: state.lease,
                offset: block.length,
                data: chunk.clone(),
            };
            let written = live.call(live.stub.write_block(req)).await;
            match written {
                Ok(rsp) => {
                    let mut block = block;
                    block.length += rsp.written;
                    state.last = Some(block);
                }
                Err(s) => {
                    // Unwritten bytes stay buffered.
                    let mut restored = BytesMut::from(&chunk[..]);
                    restored.extend_from_slice(&state.buf);
                    state.buf = restored;
                    state.last = Some(block);
                    return Err(live.op_error("write", &path, Some(s)));
                }
            }
        }
        Ok(())
    }

    // ---- Close ----

    /// Close the handle. In write mode all buffered bytes are pushed and
    /// the file is completed; a failure to do so is a `Close` error.
    pub async fn close(mut self) -> ClientResult<()> {
        self.closed = true;
        if !self.mode.is_write() {
            tracing::debug!(path = %self.path, "closed");
            return Ok(());
        }
        if let Err(e) = self.flush_buffer().await {
            return Err(self.close_error(e));
        }

        let inner = self.session()?;
        let live = inner.lock_live().await?;
        let Io::Write(state) = &self.io else {
            return Ok(());
        };
        let req = CompleteReq {
            path: self.path.clone(),
            lease: state.lease,
            last: state.last.as_ref().map(|b| b.block),
            length: self.pos,
        };
        let completed = live
            .call(live.stub.complete(req))
            .await
            .map_err(|status| ClientError::Close {
                path: self.path.clone(),
                host: self.host.clone(),
                status,
            })?
            .completed;
        if !completed {
            return Err(ClientError::Close {
                path: self.path.clone(),
                host: self.host.clone(),
                status: Status::with_message(
                    MetaCode::FILE_NOT_CLOSED,
                    format!("namenode did not accept length {}", self.pos),
                ),
            });
        }
        tracing::debug!(path = %self.path, length = self.pos, "closed");
        Ok(())
    }

    // ---- Helpers ----

    fn session(&self) -> ClientResult<Arc<SessionInner>> {
        self.session.upgrade().ok_or_else(|| ClientError::ClosedSession {
            host: self.host.clone(),
        })
    }

    fn read_state(&self, op: &'static str) -> ClientResult<&ReadState> {
        match &self.io {
            Io::Read(r) => Ok(r),
            Io::Write(_) => Err(self.wrong_mode(op)),
        }
    }

    fn write_state(&mut self, op: &'static str) -> ClientResult<&mut WriteState> {
        match self.io {
            Io::Write(ref mut w) => Ok(w),
            Io::Read(_) => Err(self.wrong_mode(op)),
        }
    }

    fn wrong_mode(&self, op: &'static str) -> ClientError {
        self.op_error(
            op,
            Status::with_message(
                StatusCode::INVALID_ARG,
                format!("file is open in mode {:?}", self.mode.to_string()),
            ),
        )
    }

    fn op_error(&self, op: &'static str, status: Status) -> ClientError {
        tracing::warn!(op, path = %self.path, host = %self.host, "file operation failed: {}", status);
        ClientError::Operation {
            op,
            path: self.path.clone(),
            host: self.host.clone(),
            status: Some(status),
        }
    }

    fn close_error(&self, err: ClientError) -> ClientError {
        match err {
            ClientError::Operation {
                status: Some(status),
                ..
            } => ClientError::Close {
                path: self.path.clone(),
                host: self.host.clone(),
                status,
            },
            other => other,
        }
    }
}

async fn open_read(live: &Live<'_>, abs: &str) -> ClientResult<ReadState> {
    let info = live
        .call(live.stub.get_file_info(GetFileInfoReq { path: abs.to_string() }))
        .await
        .map_err(|s| open_error(live, abs, s))?;
    match info.status {
        None => {
            return Err(open_error(live, abs, Status::with_message(MetaCode::NOT_FOUND, abs)));
        }
        Some(st) if st.is_dir() => {
            return Err(open_error(live, abs, Status::with_message(MetaCode::IS_DIRECTORY, abs)));
        }
        Some(_) => {}
    }

    let req = GetBlockLocationsReq {
        path: abs.to_string(),
        offset: 0,
        length: i64::MAX,
    };
    let located = live
        .call(live.stub.get_block_locations(req))
        .await
        .map_err(|s| open_error(live, abs, s))?
        .blocks
        .ok_or_else(|| open_error(live, abs, Status::with_message(MetaCode::NOT_FILE, abs)))?;
    Ok(ReadState {
        length: located.file_length,
        blocks: located.blocks,
        cache: Bytes::new(),
        cache_offset: 0,
    })
}

fn open_error(live: &Live<'_>, path: &str, status: Status) -> ClientError {
    tracing::warn!(path, host = %live.host, "open failed: {}", status);
    ClientError::Open {
        path: path.to_string(),
        host: live.host.clone(),
        status,
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        tracing::error!(
            path = %self.path,
            mode = %self.mode,
            "file handle dropped without close"
        );
        if let Some(inner) = self.session.upgrade() {
            inner.report_leak();
        }
    }
}
