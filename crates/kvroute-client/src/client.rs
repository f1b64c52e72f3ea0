//! Async client facade.
//!
//! Every operation follows the same pipeline: validate the input, encode the
//! routing key and its partition hash, dispatch through the [`Transport`],
//! then translate transport and engine statuses into one [`ErrorCode`].
//! Validation failures resolve on first poll without touching the transport.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use kvroute_core::hash::hash_key_hash;
use kvroute_core::message::{expire_ts, KeyValue, Request, Response};
use kvroute_core::validate::{check_batch, check_hash_key, check_hash_key_len, check_split_count};
use kvroute_core::{
    partition_hash, plan_bounded, plan_unordered, translate, ClientConfig, ClientError, ClientResult, ConfigError,
    ErrorCode, Fetched, InternalInfo, PartitionHash, Reply, RoutingKey, ScanOptions, TransportStatus,
};

use crate::scanner::Scanner;
use crate::transport::{complete, query_partition_config, round_trip, unexpected, Transport};

/// Async client bound to one cluster and one app.
///
/// Cheap to clone; clones share the configuration and the transport.
#[derive(Clone)]
pub struct KvClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl KvClient {
    /// Build a client. The configuration is validated here; a client never
    /// exists with an unresolved cluster.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config: Arc::new(config), transport })
    }

    pub fn cluster_name(&self) -> &str {
        &self.config.cluster_name
    }

    pub fn app_name(&self) -> &str {
        &self.config.app_name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Configured per-operation timeout.
    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout
    }

    /// Scan options seeded from the client configuration.
    pub fn default_scan_options(&self) -> ScanOptions {
        ScanOptions {
            timeout: self.config.default_timeout,
            batch_size: self.config.scan_batch_size,
            ..ScanOptions::default()
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write one record. `ttl_seconds == 0` means it never expires.
    pub async fn set(
        &self,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
        timeout: Duration,
        ttl_seconds: u32,
    ) -> ClientResult<Reply<()>> {
        check_hash_key_len(hash_key, "set")?;
        let key = RoutingKey::encode(hash_key, sort_key)?;
        let hash = partition_hash(&key);
        let request = Request::Put { key, value: value.to_vec(), expire_ts_seconds: expire_ts(ttl_seconds) };
        self.update("set", hash, request, timeout).await
    }

    /// Write several sort_keys under one hash_key in a single request.
    pub async fn multi_set(
        &self,
        hash_key: &[u8],
        kvs: &BTreeMap<Vec<u8>, Vec<u8>>,
        timeout: Duration,
        ttl_seconds: u32,
    ) -> ClientResult<Reply<()>> {
        check_hash_key(hash_key, "multi_set")?;
        check_batch(kvs.len(), "kvs", "multi_set")?;
        let request = Request::MultiPut {
            hash_key: hash_key.to_vec(),
            kvs: kvs.iter().map(|(k, v)| KeyValue { key: k.clone(), value: v.clone() }).collect(),
            expire_ts_seconds: expire_ts(ttl_seconds),
        };
        self.update("multi_set", hash_key_hash(hash_key), request, timeout).await
    }

    /// Delete one record. Deleting a missing record succeeds.
    pub async fn del(&self, hash_key: &[u8], sort_key: &[u8], timeout: Duration) -> ClientResult<Reply<()>> {
        check_hash_key_len(hash_key, "del")?;
        let key = RoutingKey::encode(hash_key, sort_key)?;
        let hash = partition_hash(&key);
        self.update("del", hash, Request::Remove { key }, timeout).await
    }

    /// Delete several sort_keys under one hash_key; returns how many existed.
    pub async fn multi_del(
        &self,
        hash_key: &[u8],
        sort_keys: &BTreeSet<Vec<u8>>,
        timeout: Duration,
    ) -> ClientResult<Reply<i64>> {
        check_hash_key(hash_key, "multi_del")?;
        check_batch(sort_keys.len(), "sort_keys", "multi_del")?;
        let request = Request::MultiRemove {
            hash_key: hash_key.to_vec(),
            sort_keys: sort_keys.iter().cloned().collect(),
        };
        match round_trip(&self.transport, hash_key_hash(hash_key), &request, timeout).await? {
            Response::MultiRemove { error, count, decree, served_by } => {
                complete(engine_code(error), count, served_by.write_info(decree))
            }
            other => Err(unexpected("multi_del", &other)),
        }
    }

    async fn update(
        &self,
        op: &'static str,
        hash: PartitionHash,
        request: Request,
        timeout: Duration,
    ) -> ClientResult<Reply<()>> {
        match round_trip(&self.transport, hash, &request, timeout).await? {
            Response::Update { error, decree, served_by } => {
                complete(engine_code(error), (), served_by.write_info(decree))
            }
            other => Err(unexpected(op, &other)),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Read one record. A missing record fails with [`ErrorCode::NotFound`].
    pub async fn get(&self, hash_key: &[u8], sort_key: &[u8], timeout: Duration) -> ClientResult<Reply<Vec<u8>>> {
        check_hash_key_len(hash_key, "get")?;
        let key = RoutingKey::encode(hash_key, sort_key)?;
        let hash = partition_hash(&key);
        match round_trip(&self.transport, hash, &Request::Get { key }, timeout).await? {
            Response::Read { error, value, served_by } => complete(engine_code(error), value, served_by.read_info()),
            other => Err(unexpected("get", &other)),
        }
    }

    /// Read several sort_keys under one hash_key. An empty `sort_keys` set
    /// reads the whole collection. Non-positive limits mean unlimited; a fetch
    /// cut short by a limit returns the records read so far with
    /// `complete == false`.
    pub async fn multi_get(
        &self,
        hash_key: &[u8],
        sort_keys: &BTreeSet<Vec<u8>>,
        max_fetch_count: i32,
        max_fetch_size: i32,
        timeout: Duration,
    ) -> ClientResult<Reply<Fetched<BTreeMap<Vec<u8>, Vec<u8>>>>> {
        check_hash_key(hash_key, "multi_get")?;
        let request = Request::MultiGet {
            hash_key: hash_key.to_vec(),
            sort_keys: sort_keys.iter().cloned().collect(),
            max_kv_count: max_fetch_count,
            max_kv_size: max_fetch_size,
            no_value: false,
        };
        match round_trip(&self.transport, hash_key_hash(hash_key), &request, timeout).await? {
            Response::MultiGet { error, kvs, served_by } => {
                let values = kvs.into_iter().map(|kv| (kv.key, kv.value)).collect();
                fetched(error, values, served_by.read_info())
            }
            other => Err(unexpected("multi_get", &other)),
        }
    }

    /// List the sort_keys under one hash_key without their values. Limits
    /// behave as in [`KvClient::multi_get`].
    pub async fn multi_get_sortkeys(
        &self,
        hash_key: &[u8],
        max_fetch_count: i32,
        max_fetch_size: i32,
        timeout: Duration,
    ) -> ClientResult<Reply<Fetched<BTreeSet<Vec<u8>>>>> {
        check_hash_key(hash_key, "multi_get_sortkeys")?;
        let request = Request::MultiGet {
            hash_key: hash_key.to_vec(),
            sort_keys: Vec::new(),
            max_kv_count: max_fetch_count,
            max_kv_size: max_fetch_size,
            no_value: true,
        };
        match round_trip(&self.transport, hash_key_hash(hash_key), &request, timeout).await? {
            Response::MultiGet { error, kvs, served_by } => {
                let sort_keys = kvs.into_iter().map(|kv| kv.key).collect();
                fetched(error, sort_keys, served_by.read_info())
            }
            other => Err(unexpected("multi_get_sortkeys", &other)),
        }
    }

    /// Whether a record exists, answered by a TTL probe.
    pub async fn exist(&self, hash_key: &[u8], sort_key: &[u8], timeout: Duration) -> ClientResult<Reply<bool>> {
        match self.ttl(hash_key, sort_key, timeout).await {
            Ok(reply) => Ok(reply.map(|_| true)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(Reply::new(false, err.info)),
            Err(err) => Err(err),
        }
    }

    /// Remaining time-to-live in seconds; `-1` when the record never expires.
    pub async fn ttl(&self, hash_key: &[u8], sort_key: &[u8], timeout: Duration) -> ClientResult<Reply<i32>> {
        check_hash_key_len(hash_key, "ttl")?;
        let key = RoutingKey::encode(hash_key, sort_key)?;
        let hash = partition_hash(&key);
        match round_trip(&self.transport, hash, &Request::Ttl { key }, timeout).await? {
            Response::Ttl { error, ttl_seconds, served_by } => {
                complete(engine_code(error), ttl_seconds, served_by.read_info())
            }
            other => Err(unexpected("ttl", &other)),
        }
    }

    /// Number of live sort_keys under one hash_key.
    pub async fn sortkey_count(&self, hash_key: &[u8], timeout: Duration) -> ClientResult<Reply<i64>> {
        check_hash_key(hash_key, "sortkey_count")?;
        let request = Request::SortKeyCount { hash_key: hash_key.to_vec() };
        match round_trip(&self.transport, hash_key_hash(hash_key), &request, timeout).await? {
            Response::Count { error, count, served_by } => complete(engine_code(error), count, served_by.read_info()),
            other => Err(unexpected("sortkey_count", &other)),
        }
    }

    // -----------------------------------------------------------------------
    // Scans
    // -----------------------------------------------------------------------

    /// Scanner over `[start_sort_key, stop_sort_key]` of one hash_key, with
    /// inclusivity taken from `options`. An empty `stop_sort_key` scans to the
    /// end of the collection. Planning needs no network call.
    pub async fn get_scanner(
        &self,
        hash_key: &[u8],
        start_sort_key: &[u8],
        stop_sort_key: &[u8],
        options: &ScanOptions,
    ) -> ClientResult<Scanner> {
        let range = plan_bounded(hash_key, start_sort_key, stop_sort_key, options)?;
        debug!(hints = range.partition_hashes.len(), "planned bounded scan");
        Ok(Scanner::new(Arc::clone(&self.transport), range))
    }

    /// Split a full-table scan into at most `max_split_count` scanners, each
    /// covering a disjoint group of whole partitions.
    pub async fn get_unordered_scanners(
        &self,
        max_split_count: i32,
        options: &ScanOptions,
    ) -> ClientResult<Vec<Scanner>> {
        check_split_count(max_split_count)?;
        let config = query_partition_config(&self.transport, &self.config.app_name, options.timeout).await?;
        let ranges = plan_unordered(config.partition_count, max_split_count, options)?;
        debug!(
            partition_count = config.partition_count,
            scanners = ranges.len(),
            "planned unordered scan"
        );
        Ok(ranges
            .into_iter()
            .map(|range| Scanner::new(Arc::clone(&self.transport), range))
            .collect())
    }
}

impl std::fmt::Debug for KvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvClient")
            .field("cluster", &self.config.cluster_name)
            .field("app", &self.config.app_name)
            .finish()
    }
}

/// Engine status of a successful transport round trip.
#[inline]
fn engine_code(status: i32) -> ErrorCode {
    translate(TransportStatus::Ok, status)
}

/// A multi-read cut short by a limit still carries the records it read.
fn fetched<T>(error: i32, values: T, info: InternalInfo) -> ClientResult<Reply<Fetched<T>>> {
    let complete = match engine_code(error) {
        ErrorCode::Ok => true,
        ErrorCode::Incomplete => false,
        code => return Err(ClientError::with_info(code, info)),
    };
    Ok(Reply::new(Fetched { values, complete }, info))
}
