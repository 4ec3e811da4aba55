//! Namenode service stub trait and connector seam.

use std::sync::Arc;

use async_trait::async_trait;
use hdfs_proto::{
    AddBlockReq, AddBlockRsp, AppendReq, AppendRsp, CompleteReq, CompleteRsp, CreateReq,
    CreateRsp, DeleteReq, DeleteRsp, GetBlockLocationsReq, GetBlockLocationsRsp, GetFileInfoReq,
    GetFileInfoRsp, GetFsStatsReq, GetFsStatsRsp, GetServerDefaultsReq, GetServerDefaultsRsp,
    ListStatusReq, ListStatusRsp, MkdirsReq, MkdirsRsp, ReadBlockReq, ReadBlockRsp, RenameReq,
    RenameRsp, SetAttrRsp, SetOwnerReq, SetPermissionReq, SetReplicationReq, SetReplicationRsp,
    SetTimesReq, WriteBlockReq, WriteBlockRsp,
};
use hdfs_types::{Endpoint, Result};

/// Client-side stub for one open connection to a namenode.
///
/// Block reads and writes are routed through the same connection; the
/// transport behind it decides how to reach the datanode named in the
/// request.
#[async_trait]
pub trait INamenodeStub: Send + Sync {
    async fn get_file_info(&self, req: GetFileInfoReq) -> Result<GetFileInfoRsp>;
    async fn list_status(&self, req: ListStatusReq) -> Result<ListStatusRsp>;
    async fn delete(&self, req: DeleteReq) -> Result<DeleteRsp>;
    async fn rename(&self, req: RenameReq) -> Result<RenameRsp>;
    async fn mkdirs(&self, req: MkdirsReq) -> Result<MkdirsRsp>;
    async fn set_replication(&self, req: SetReplicationReq) -> Result<SetReplicationRsp>;
    async fn set_permission(&self, req: SetPermissionReq) -> Result<SetAttrRsp>;
    async fn set_owner(&self, req: SetOwnerReq) -> Result<SetAttrRsp>;
    async fn set_times(&self, req: SetTimesReq) -> Result<SetAttrRsp>;
    async fn get_fs_stats(&self, req: GetFsStatsReq) -> Result<GetFsStatsRsp>;
    async fn get_server_defaults(&self, req: GetServerDefaultsReq) -> Result<GetServerDefaultsRsp>;
    async fn get_block_locations(&self, req: GetBlockLocationsReq) -> Result<GetBlockLocationsRsp>;
    async fn create(&self, req: CreateReq) -> Result<CreateRsp>;
    async fn append(&self, req: AppendReq) -> Result<AppendRsp>;
    async fn add_block(&self, req: AddBlockReq) -> Result<AddBlockRsp>;
    async fn complete(&self, req: CompleteReq) -> Result<CompleteRsp>;
    async fn read_block(&self, req: ReadBlockReq) -> Result<ReadBlockRsp>;
    async fn write_block(&self, req: WriteBlockReq) -> Result<WriteBlockRsp>;

    /// Release the connection. Later calls fail with `RPCCode::SOCKET_CLOSED`.
    async fn shutdown(&self) -> Result<()>;
}

/// Opens stub connections to namenode endpoints.
///
/// `user` is the identity the connection authenticates as; the namenode
/// records it as owner of the entries created over that connection.
#[async_trait]
pub trait NamenodeConnector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint, user: &str) -> Result<Arc<dyn INamenodeStub>>;
}
