//! kvroute Core: request routing and scan planning for a partitioned store
//!
//! Records live in `hash_key -> {sort_key -> value}` collections. Every record
//! sharing a hash_key is co-located on one partition, so the routing layer
//! only ever hashes the hash_key portion of a key.
//!
//! # Architecture
//!
//! - **Key codec**: length-prefixed composite keys whose byte order matches
//!   `(hash_key, sort_key)` order
//! - **Partition hasher**: stable 64-bit shard hints derived from a routing key
//! - **Error translation**: transport status and storage-engine status folded
//!   into one client [`ErrorCode`]
//! - **Scan planning**: single-hash_key bounded ranges and full-table splits
//!
//! This crate has no async runtime dependency. The transport contract, the
//! blocking bridge and the client facade live in `kvroute-client`.

pub mod config;
pub mod error;
pub mod format;
pub mod hash;
pub mod key;
pub mod message;
pub mod scan;
pub mod translate;
pub mod types;
pub mod validate;

// Re-export key types for convenience
pub use config::{ClientConfig, ClusterDirectory};
pub use error::{ClientError, ClientResult, CodecError, ConfigError, ErrorCode};
pub use hash::{partition_hash, partition_index, PartitionHash};
pub use key::{RoutingKey, MAX_HASH_KEY_LEN};
pub use scan::{plan_bounded, plan_unordered, ScanOptions, ScanRange};
pub use translate::{error_message, get_client_error, storage_error, translate, TransportStatus};
pub use types::{Fetched, InternalInfo, Reply};
