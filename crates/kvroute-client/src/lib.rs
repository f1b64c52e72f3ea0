//! kvroute Client: blocking and async access to a partitioned store
//!
//! Builds the public operation set on top of `kvroute-core`:
//!
//! - [`Transport`]: the narrow contract to the RPC layer and meta service
//! - [`KvClient`]: the native async form of every operation
//! - [`BlockingKvClient`]: the same operations, blocking the calling thread
//!   through a [`SyncBridge`]
//! - [`Scanner`]: executes planned scan ranges page by page
//! - [`InMemoryCluster`]: an in-process transport for tests and local use
//!
//! Every operation runs Validate -> Encode/Hash -> Dispatch -> Translate, and
//! the blocking form adds one bounded wait on top.

pub mod blocking;
pub mod bridge;
pub mod client;
pub mod memory;
pub mod scanner;
pub mod transport;

pub use blocking::{BlockingKvClient, BlockingScanner};
pub use bridge::SyncBridge;
pub use client::KvClient;
pub use memory::InMemoryCluster;
pub use scanner::{Record, Scanner};
pub use transport::{Transport, TransportReply};

pub use kvroute_core::{
    ClientConfig, ClientError, ClientResult, ErrorCode, Fetched, InternalInfo, Reply, ScanOptions, TransportStatus,
};
