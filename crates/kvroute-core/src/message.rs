//! Request and response layouts exchanged with the storage engine and the
//! meta service.
//!
//! Every response carries the engine status (`error`, 0 = success) and the
//! serving node's identity. The client copies those into
//! [`InternalInfo`](crate::types::InternalInfo) without interpreting them.

use serde::{Deserialize, Serialize};

use crate::key::RoutingKey;
use crate::types::InternalInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Requests routed to a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Put {
        key: RoutingKey,
        value: Vec<u8>,
        /// Absolute expiry in unix seconds, 0 for none
        expire_ts_seconds: u64,
    },
    MultiPut {
        hash_key: Vec<u8>,
        kvs: Vec<KeyValue>,
        expire_ts_seconds: u64,
    },
    Remove {
        key: RoutingKey,
    },
    MultiRemove {
        hash_key: Vec<u8>,
        sort_keys: Vec<Vec<u8>>,
    },
    Get {
        key: RoutingKey,
    },
    /// Empty `sort_keys` fetches the whole collection. Non-positive limits
    /// mean unlimited.
    MultiGet {
        hash_key: Vec<u8>,
        sort_keys: Vec<Vec<u8>>,
        max_kv_count: i32,
        max_kv_size: i32,
        no_value: bool,
    },
    SortKeyCount {
        hash_key: Vec<u8>,
    },
    Ttl {
        key: RoutingKey,
    },
    /// Empty `stop_key` is unbounded; empty `start_key` starts at the front.
    Scan {
        start_key: RoutingKey,
        stop_key: RoutingKey,
        start_inclusive: bool,
        stop_inclusive: bool,
        batch_size: u32,
        snapshot: bool,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Put { .. } => "put",
            Request::MultiPut { .. } => "multi_put",
            Request::Remove { .. } => "remove",
            Request::MultiRemove { .. } => "multi_remove",
            Request::Get { .. } => "get",
            Request::MultiGet { .. } => "multi_get",
            Request::SortKeyCount { .. } => "sortkey_count",
            Request::Ttl { .. } => "ttl",
            Request::Scan { .. } => "scan",
        }
    }
}

/// Identity of the replica that served a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedBy {
    pub app_id: i32,
    pub partition_index: i32,
    pub server: String,
}

impl ServedBy {
    /// Diagnostics for a read.
    pub fn read_info(&self) -> InternalInfo {
        InternalInfo {
            app_id: self.app_id,
            partition_index: self.partition_index,
            decree: -1,
            server: self.server.clone(),
        }
    }

    /// Diagnostics for a write at `decree`.
    pub fn write_info(&self, decree: i64) -> InternalInfo {
        InternalInfo { decree, ..self.read_info() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Update {
        error: i32,
        decree: i64,
        served_by: ServedBy,
    },
    Read {
        error: i32,
        value: Vec<u8>,
        served_by: ServedBy,
    },
    MultiGet {
        error: i32,
        /// sort_key -> value; values are empty when `no_value` was requested
        kvs: Vec<KeyValue>,
        served_by: ServedBy,
    },
    MultiRemove {
        error: i32,
        count: i64,
        decree: i64,
        served_by: ServedBy,
    },
    Count {
        error: i32,
        count: i64,
        served_by: ServedBy,
    },
    Ttl {
        error: i32,
        /// Remaining seconds, -1 when the record never expires
        ttl_seconds: i32,
        served_by: ServedBy,
    },
    Scan {
        error: i32,
        /// routing key -> value, in routing-key order
        kvs: Vec<KeyValue>,
        /// No records remain past the last one returned
        complete: bool,
        served_by: ServedBy,
    },
}

impl Response {
    pub fn error(&self) -> i32 {
        match self {
            Response::Update { error, .. }
            | Response::Read { error, .. }
            | Response::MultiGet { error, .. }
            | Response::MultiRemove { error, .. }
            | Response::Count { error, .. }
            | Response::Ttl { error, .. }
            | Response::Scan { error, .. } => *error,
        }
    }

    pub fn served_by(&self) -> &ServedBy {
        match self {
            Response::Update { served_by, .. }
            | Response::Read { served_by, .. }
            | Response::MultiGet { served_by, .. }
            | Response::MultiRemove { served_by, .. }
            | Response::Count { served_by, .. }
            | Response::Ttl { served_by, .. }
            | Response::Scan { served_by, .. } => served_by,
        }
    }
}

/// Partition-count discovery, sent to the meta service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPartitionConfig {
    pub app_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfigResponse {
    /// Transport status code of the meta service's own answer
    pub err: i32,
    pub app_id: i32,
    pub partition_count: u32,
}

/// Raw storage-engine statuses carried in `Response::error`.
pub mod engine_status {
    pub const OK: i32 = 0;
    pub const NOT_FOUND: i32 = 1;
    pub const CORRUPTION: i32 = 2;
    pub const NOT_SUPPORTED: i32 = 3;
    pub const INVALID_ARGUMENT: i32 = 4;
    pub const IO_ERROR: i32 = 5;
    pub const INCOMPLETE: i32 = 7;
    pub const BUSY: i32 = 11;
}

/// Seconds since the unix epoch.
pub fn epoch_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Absolute expiry for a TTL in seconds; 0 means never.
pub fn expire_ts(ttl_seconds: u32) -> u64 {
    if ttl_seconds == 0 {
        0
    } else {
        epoch_now() + u64::from(ttl_seconds)
    }
}
