/// Status code type alias. Codes are grouped in ranges of one thousand.
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const DATA_CORRUPTION: status_code_t = 2;
    pub const INVALID_ARG: status_code_t = 3;
    pub const UNKNOWN: status_code_t = 999;
}

/// RPC status codes (2xxx).
pub mod RPCCode {
    use super::status_code_t;

    pub const TIMEOUT: status_code_t = 2005;
    pub const INVALID_ADDR: status_code_t = 2006;
    pub const SOCKET_ERROR: status_code_t = 2010;
    pub const SOCKET_CLOSED: status_code_t = 2013;
    pub const CONNECT_FAILED: status_code_t = 2014;
}

/// Namenode (metadata service) status codes (3xxx).
pub mod MetaCode {
    use super::status_code_t;

    pub const NOT_FOUND: status_code_t = 3000;
    pub const NOT_EMPTY: status_code_t = 3001;
    pub const NOT_DIRECTORY: status_code_t = 3003;
    pub const IS_DIRECTORY: status_code_t = 3006;
    pub const EXISTS: status_code_t = 3007;
    pub const NO_PERMISSION: status_code_t = 3008;
    pub const NOT_FILE: status_code_t = 3010;
    pub const LEASE_CONFLICT: status_code_t = 3020;
    pub const FILE_NOT_CLOSED: status_code_t = 3021;
    pub const INVALID_REPLICATION: status_code_t = 3022;
}

/// Datanode (block storage) status codes (4xxx).
pub mod StorageCode {
    use super::status_code_t;

    pub const BLOCK_NOT_FOUND: status_code_t = 4001;
    pub const BLOCK_WRITE_FAILED: status_code_t = 4011;
    pub const BLOCK_SIZE_EXCEEDED: status_code_t = 4015;
    pub const BLOCK_COMMITTED: status_code_t = 4023;
    pub const NO_DATANODE: status_code_t = 4034;
}

/// Classification of status code ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum StatusCodeType {
    Invalid = -1,
    Common = 0,
    RPC = 2,
    Meta = 3,
    Storage = 4,
}

/// Determine the type/category of a status code.
pub fn type_of(code: status_code_t) -> StatusCodeType {
    match code {
        0..=999 => StatusCodeType::Common,
        2000..=2999 => StatusCodeType::RPC,
        3000..=3999 => StatusCodeType::Meta,
        4000..=4999 => StatusCodeType::Storage,
        _ => StatusCodeType::Invalid,
    }
}

/// Convert a status code to its human-readable name.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        // Common
        StatusCode::OK => "OK",
        StatusCode::DATA_CORRUPTION => "DataCorruption",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::UNKNOWN => "Unknown",

        // RPC
        RPCCode::TIMEOUT => "RPC::Timeout",
        RPCCode::INVALID_ADDR => "RPC::InvalidAddr",
        RPCCode::SOCKET_ERROR => "RPC::SocketError",
        RPCCode::SOCKET_CLOSED => "RPC::SocketClosed",
        RPCCode::CONNECT_FAILED => "RPC::ConnectFailed",

        // Meta
        MetaCode::NOT_FOUND => "Meta::NotFound",
        MetaCode::NOT_EMPTY => "Meta::NotEmpty",
        MetaCode::NOT_DIRECTORY => "Meta::NotDirectory",
        MetaCode::IS_DIRECTORY => "Meta::IsDirectory",
        MetaCode::EXISTS => "Meta::Exists",
        MetaCode::NO_PERMISSION => "Meta::NoPermission",
        MetaCode::NOT_FILE => "Meta::NotFile",
        MetaCode::LEASE_CONFLICT => "Meta::LeaseConflict",
        MetaCode::FILE_NOT_CLOSED => "Meta::FileNotClosed",
        MetaCode::INVALID_REPLICATION => "Meta::InvalidReplication",

        // Storage
        StorageCode::BLOCK_NOT_FOUND => "Storage::BlockNotFound",
        StorageCode::BLOCK_WRITE_FAILED => "Storage::BlockWriteFailed",
        StorageCode::BLOCK_SIZE_EXCEEDED => "Storage::BlockSizeExceeded",
        StorageCode::BLOCK_COMMITTED => "Storage::BlockCommitted",
        StorageCode::NO_DATANODE => "Storage::NoDatanode",

        _ => "UnknownCode",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_of() {
        assert_eq!(type_of(StatusCode::OK), StatusCodeType::Common);
        assert_eq!(type_of(RPCCode::TIMEOUT), StatusCodeType::RPC);
        assert_eq!(type_of(MetaCode::NOT_FOUND), StatusCodeType::Meta);
        assert_eq!(type_of(StorageCode::BLOCK_NOT_FOUND), StatusCodeType::Storage);
        assert_eq!(type_of(9000), StatusCodeType::Invalid);
    }

    #[test]
    fn test_to_string() {
        assert_eq!(to_string(StatusCode::INVALID_ARG), "InvalidArg");
        assert_eq!(to_string(RPCCode::CONNECT_FAILED), "RPC::ConnectFailed");
        assert_eq!(to_string(MetaCode::IS_DIRECTORY), "Meta::IsDirectory");
        assert_eq!(to_string(StorageCode::NO_DATANODE), "Storage::NoDatanode");
        assert_eq!(to_string(1234), "UnknownCode");
    }
}
