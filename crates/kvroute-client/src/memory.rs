//! In-process cluster implementing the [`Transport`] contract.
//!
//! Each partition keeps its records in an ordered map keyed by routing key
//! and guarded by a `parking_lot` RwLock, so many readers proceed together
//! and writers hold the lock only briefly. Requests are routed exactly as a
//! real cluster routes them: `partition_hash % partition_count`.
//!
//! Test hooks: call counters (to prove validation never reaches the
//! transport), injected transport statuses, and injected latency.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use kvroute_core::format::{decode_frame, encode_frame, FrameKind};
use kvroute_core::message::{
    engine_status, epoch_now, KeyValue, PartitionConfigResponse, QueryPartitionConfig, Request, Response, ServedBy,
};
use kvroute_core::{partition_index, PartitionHash, RoutingKey, TransportStatus};

use crate::transport::{Transport, TransportReply};

/// Transport code reported for frames the cluster cannot parse.
pub const BAD_FRAME_STATUS: i32 = 100;

/// First port of the simulated replica servers
const BASE_PORT: u16 = 34801;

/// Simulated server port of a partition; saturates instead of wrapping.
fn server_port(index: u32) -> u16 {
    u16::try_from(index).map_or(u16::MAX, |i| BASE_PORT.saturating_add(i))
}

#[derive(Debug, Clone)]
struct Stored {
    value: Vec<u8>,
    /// Unix seconds, 0 for never
    expire_ts: u64,
}

impl Stored {
    #[inline]
    fn alive(&self, now: u64) -> bool {
        self.expire_ts == 0 || self.expire_ts > now
    }
}

struct Partition {
    served_by: ServedBy,
    data: RwLock<BTreeMap<Vec<u8>, Stored>>,
    decree: AtomicI64,
}

impl Partition {
    fn new(app_id: i32, index: u32) -> Self {
        let port = server_port(index);
        Self {
            served_by: ServedBy {
                app_id,
                partition_index: index as i32,
                server: format!("127.0.0.1:{}", port),
            },
            data: RwLock::new(BTreeMap::new()),
            decree: AtomicI64::new(0),
        }
    }

    fn next_decree(&self) -> i64 {
        self.decree.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn execute(&self, request: Request, now: u64) -> Response {
        let served_by = self.served_by.clone();
        match request {
            Request::Put { key, value, expire_ts_seconds } => {
                self.data
                    .write()
                    .insert(key.into_bytes(), Stored { value, expire_ts: expire_ts_seconds });
                Response::Update { error: engine_status::OK, decree: self.next_decree(), served_by }
            }

            Request::MultiPut { hash_key, kvs, expire_ts_seconds } => {
                let mut encoded = Vec::with_capacity(kvs.len());
                for kv in kvs {
                    match RoutingKey::encode(&hash_key, &kv.key) {
                        Ok(key) => encoded.push((key.into_bytes(), kv.value)),
                        Err(_) => {
                            return Response::Update { error: engine_status::INVALID_ARGUMENT, decree: -1, served_by };
                        }
                    }
                }
                {
                    let mut data = self.data.write();
                    for (key, value) in encoded {
                        data.insert(key, Stored { value, expire_ts: expire_ts_seconds });
                    }
                }
                Response::Update { error: engine_status::OK, decree: self.next_decree(), served_by }
            }

            Request::Remove { key } => {
                self.data.write().remove(key.as_bytes());
                Response::Update { error: engine_status::OK, decree: self.next_decree(), served_by }
            }

            Request::MultiRemove { hash_key, sort_keys } => {
                let mut count = 0i64;
                {
                    let mut data = self.data.write();
                    for sort_key in sort_keys {
                        let Ok(key) = RoutingKey::encode(&hash_key, &sort_key) else {
                            continue;
                        };
                        if let Some(stored) = data.remove(key.as_bytes()) {
                            if stored.alive(now) {
                                count += 1;
                            }
                        }
                    }
                }
                Response::MultiRemove { error: engine_status::OK, count, decree: self.next_decree(), served_by }
            }

            Request::Get { key } => {
                let data = self.data.read();
                match data.get(key.as_bytes()).filter(|s| s.alive(now)) {
                    Some(stored) => Response::Read { error: engine_status::OK, value: stored.value.clone(), served_by },
                    None => Response::Read { error: engine_status::NOT_FOUND, value: Vec::new(), served_by },
                }
            }

            Request::MultiGet { hash_key, sort_keys, max_kv_count, max_kv_size, no_value } => {
                self.multi_get(&hash_key, &sort_keys, max_kv_count, max_kv_size, no_value, now, served_by)
            }

            Request::SortKeyCount { hash_key } => {
                let count = self.collection(&hash_key, now).len() as i64;
                Response::Count { error: engine_status::OK, count, served_by }
            }

            Request::Ttl { key } => {
                let data = self.data.read();
                match data.get(key.as_bytes()).filter(|s| s.alive(now)) {
                    Some(stored) => {
                        let ttl_seconds = if stored.expire_ts == 0 {
                            -1
                        } else {
                            i32::try_from(stored.expire_ts - now).unwrap_or(i32::MAX)
                        };
                        Response::Ttl { error: engine_status::OK, ttl_seconds, served_by }
                    }
                    None => Response::Ttl { error: engine_status::NOT_FOUND, ttl_seconds: 0, served_by },
                }
            }

            Request::Scan { start_key, stop_key, start_inclusive, stop_inclusive, batch_size, snapshot: _ } => {
                let Some(bounds) = key_bounds(&start_key, start_inclusive, &stop_key, stop_inclusive) else {
                    return Response::Scan { error: engine_status::OK, kvs: Vec::new(), complete: true, served_by };
                };
                let limit = batch_size.max(1) as usize;
                let data = self.data.read();
                let mut kvs: Vec<KeyValue> = data
                    .range::<[u8], _>(bounds)
                    .filter(|(_, s)| s.alive(now))
                    .take(limit + 1)
                    .map(|(k, s)| KeyValue { key: k.clone(), value: s.value.clone() })
                    .collect();
                let complete = kvs.len() <= limit;
                kvs.truncate(limit);
                Response::Scan { error: engine_status::OK, kvs, complete, served_by }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn multi_get(
        &self,
        hash_key: &[u8],
        sort_keys: &[Vec<u8>],
        max_kv_count: i32,
        max_kv_size: i32,
        no_value: bool,
        now: u64,
        served_by: ServedBy,
    ) -> Response {
        let candidates: Vec<(Vec<u8>, Vec<u8>)> = if sort_keys.is_empty() {
            self.collection(hash_key, now)
        } else {
            let data = self.data.read();
            sort_keys
                .iter()
                .filter_map(|sort_key| {
                    let key = RoutingKey::encode(hash_key, sort_key).ok()?;
                    let stored = data.get(key.as_bytes()).filter(|s| s.alive(now))?;
                    Some((sort_key.clone(), stored.value.clone()))
                })
                .collect()
        };

        let mut kvs = Vec::with_capacity(candidates.len());
        let mut size = 0usize;
        let mut error = engine_status::OK;
        for (sort_key, value) in candidates {
            let count_reached = max_kv_count > 0 && kvs.len() >= max_kv_count as usize;
            let size_reached = max_kv_size > 0 && size >= max_kv_size as usize;
            if count_reached || size_reached {
                error = engine_status::INCOMPLETE;
                break;
            }
            let value = if no_value { Vec::new() } else { value };
            size += sort_key.len() + value.len();
            kvs.push(KeyValue { key: sort_key, value });
        }
        Response::MultiGet { error, kvs, served_by }
    }

    /// Live `(sort_key, value)` pairs of one hash_key, in sort_key order.
    fn collection(&self, hash_key: &[u8], now: u64) -> Vec<(Vec<u8>, Vec<u8>)> {
        let (Ok(start), Ok(stop)) = (RoutingKey::encode(hash_key, &[]), RoutingKey::next_key(hash_key)) else {
            return Vec::new();
        };
        let Some(bounds) = key_bounds(&start, true, &stop, false) else {
            return Vec::new();
        };
        let data = self.data.read();
        data.range::<[u8], _>(bounds)
            .filter(|(_, s)| s.alive(now))
            .filter_map(|(k, s)| {
                let key = RoutingKey::from_bytes(k.clone());
                let (_, sort_key) = key.decode().ok()?;
                Some((sort_key.to_vec(), s.value.clone()))
            })
            .collect()
    }
}

/// Range bounds for a scan, or `None` when the range is empty. Empty keys
/// are open bounds.
fn key_bounds<'a>(
    start: &'a RoutingKey,
    start_inclusive: bool,
    stop: &'a RoutingKey,
    stop_inclusive: bool,
) -> Option<(Bound<&'a [u8]>, Bound<&'a [u8]>)> {
    if !start.is_unbounded() && !stop.is_unbounded() {
        match start.cmp(stop) {
            std::cmp::Ordering::Greater => return None,
            std::cmp::Ordering::Equal if !(start_inclusive && stop_inclusive) => return None,
            _ => {}
        }
    }
    let lower = match (start.is_unbounded(), start_inclusive) {
        (true, _) => Bound::Unbounded,
        (false, true) => Bound::Included(start.as_bytes()),
        (false, false) => Bound::Excluded(start.as_bytes()),
    };
    let upper = match (stop.is_unbounded(), stop_inclusive) {
        (true, _) => Bound::Unbounded,
        (false, true) => Bound::Included(stop.as_bytes()),
        (false, false) => Bound::Excluded(stop.as_bytes()),
    };
    Some((lower, upper))
}

/// In-process cluster serving one app.
pub struct InMemoryCluster {
    app_name: String,
    app_id: i32,
    partitions: Vec<Partition>,
    calls: AtomicU64,
    meta_calls: AtomicU64,
    faults: Mutex<VecDeque<TransportStatus>>,
    latency: Mutex<Duration>,
}

impl InMemoryCluster {
    /// Create a cluster serving `app_name` with `partition_count` partitions.
    ///
    /// # Panics
    ///
    /// Panics if `partition_count` is 0.
    pub fn new(app_name: impl Into<String>, partition_count: u32) -> Self {
        assert!(partition_count > 0, "partition_count must be > 0");
        let app_id = 1;
        Self {
            app_name: app_name.into(),
            app_id,
            partitions: (0..partition_count).map(|i| Partition::new(app_id, i)).collect(),
            calls: AtomicU64::new(0),
            meta_calls: AtomicU64::new(0),
            faults: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    pub fn partition_count(&self) -> u32 {
        self.partitions.len() as u32
    }

    /// Partition requests received so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Meta requests received so far.
    pub fn meta_calls(&self) -> u64 {
        self.meta_calls.load(Ordering::Relaxed)
    }

    /// Fail the next call (partition or meta) with `status`.
    pub fn inject_status(&self, status: TransportStatus) {
        self.faults.lock().push_back(status);
    }

    /// Delay every call by `latency`. A delay reaching the caller's timeout
    /// is reported as [`TransportStatus::Timeout`].
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Live records held by one partition.
    pub fn partition_len(&self, index: u32) -> usize {
        let now = epoch_now();
        self.partitions
            .get(index as usize)
            .map_or(0, |p| p.data.read().values().filter(|s| s.alive(now)).count())
    }

    /// Live records across all partitions.
    pub fn len(&self) -> usize {
        (0..self.partition_count()).map(|i| self.partition_len(i)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply latency and injected faults. Returns a failure to report instead
    /// of serving the call.
    async fn admit(&self, timeout: Duration) -> Option<TransportStatus> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            if latency >= timeout {
                tokio::time::sleep(timeout).await;
                return Some(TransportStatus::Timeout);
            }
            tokio::time::sleep(latency).await;
        }
        self.faults.lock().pop_front()
    }
}

impl std::fmt::Debug for InMemoryCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCluster")
            .field("app", &self.app_name)
            .field("partitions", &self.partitions.len())
            .field("calls", &self.calls())
            .finish()
    }
}

#[async_trait]
impl Transport for InMemoryCluster {
    async fn call(&self, partition_hash: PartitionHash, request: Vec<u8>, timeout: Duration) -> TransportReply {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(status) = self.admit(timeout).await {
            return TransportReply::failed(status);
        }

        let request: Request = match decode_frame(FrameKind::Request, &request) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "rejecting undecodable request frame");
                return TransportReply::failed(TransportStatus::Other(BAD_FRAME_STATUS));
            }
        };

        let index = partition_index(partition_hash, self.partition_count());
        let response = self.partitions[index as usize].execute(request, epoch_now());
        match encode_frame(FrameKind::Response, &response) {
            Ok(payload) => TransportReply::ok(payload),
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                TransportReply::failed(TransportStatus::FileOperationFailed)
            }
        }
    }

    async fn call_meta(&self, request: Vec<u8>, timeout: Duration) -> TransportReply {
        self.meta_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(status) = self.admit(timeout).await {
            return TransportReply::failed(status);
        }

        let query: QueryPartitionConfig = match decode_frame(FrameKind::MetaRequest, &request) {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "rejecting undecodable meta frame");
                return TransportReply::failed(TransportStatus::Other(BAD_FRAME_STATUS));
            }
        };

        let response = if query.app_name == self.app_name {
            PartitionConfigResponse { err: TransportStatus::Ok.code(), app_id: self.app_id, partition_count: self.partition_count() }
        } else {
            PartitionConfigResponse { err: TransportStatus::AppNotExist.code(), app_id: -1, partition_count: 0 }
        };
        match encode_frame(FrameKind::MetaResponse, &response) {
            Ok(payload) => TransportReply::ok(payload),
            Err(e) => {
                warn!(error = %e, "failed to encode meta response");
                TransportReply::failed(TransportStatus::FileOperationFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hash_key: &[u8], sort_key: &[u8]) -> RoutingKey {
        RoutingKey::encode(hash_key, sort_key).unwrap()
    }

    fn put(p: &Partition, hash_key: &[u8], sort_key: &[u8], value: &[u8], expire_ts: u64) {
        let request = Request::Put { key: key(hash_key, sort_key), value: value.to_vec(), expire_ts_seconds: expire_ts };
        assert!(matches!(p.execute(request, 1000), Response::Update { error: 0, .. }));
    }

    #[test]
    fn test_server_port_saturates() {
        assert_eq!(server_port(0), BASE_PORT);
        assert_eq!(server_port(2), BASE_PORT + 2);
        assert_eq!(server_port(u32::from(u16::MAX - BASE_PORT)), u16::MAX);
        assert_eq!(server_port(70_000), u16::MAX);
        assert_eq!(Partition::new(1, 70_000).served_by.server, format!("127.0.0.1:{}", u16::MAX));
    }

    #[test]
    fn test_decree_monotonic() {
        let p = Partition::new(1, 0);
        let mut last = 0;
        for i in 0..5u8 {
            let request = Request::Put { key: key(b"h", &[i]), value: vec![i], expire_ts_seconds: 0 };
            match p.execute(request, 1000) {
                Response::Update { decree, .. } => {
                    assert!(decree > last);
                    last = decree;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_expired_records_invisible() {
        let p = Partition::new(1, 0);
        put(&p, b"h", b"old", b"v", 500);
        put(&p, b"h", b"new", b"v", 5000);
        assert!(matches!(p.execute(Request::Get { key: key(b"h", b"old") }, 1000), Response::Read { error: 1, .. }));
        assert!(matches!(p.execute(Request::Get { key: key(b"h", b"new") }, 1000), Response::Read { error: 0, .. }));
        assert!(matches!(
            p.execute(Request::Ttl { key: key(b"h", b"new") }, 1000),
            Response::Ttl { error: 0, ttl_seconds: 4000, .. }
        ));
        assert!(matches!(
            p.execute(Request::SortKeyCount { hash_key: b"h".to_vec() }, 1000),
            Response::Count { count: 1, .. }
        ));
    }

    #[test]
    fn test_collection_excludes_neighbors() {
        let p = Partition::new(1, 0);
        put(&p, b"a", b"1", b"v", 0);
        put(&p, b"b", b"1", b"v", 0);
        put(&p, b"b", b"2", b"v", 0);
        put(&p, b"c", b"", b"v", 0);
        let sort_keys: Vec<Vec<u8>> = p.collection(b"b", 1000).into_iter().map(|(k, _)| k).collect();
        assert_eq!(sort_keys, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn test_scan_pages() {
        let p = Partition::new(1, 0);
        for i in 0..5u8 {
            put(&p, b"h", &[b'a' + i], b"v", 0);
        }
        let request = Request::Scan {
            start_key: key(b"h", b""),
            stop_key: RoutingKey::next_key(b"h").unwrap(),
            start_inclusive: true,
            stop_inclusive: false,
            batch_size: 3,
            snapshot: false,
        };
        match p.execute(request, 1000) {
            Response::Scan { kvs, complete, .. } => {
                assert_eq!(kvs.len(), 3);
                assert!(!complete);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_key_bounds_empty_ranges() {
        let a = key(b"h", b"a");
        let b = key(b"h", b"b");
        assert!(key_bounds(&b, true, &a, true).is_none());
        assert!(key_bounds(&a, true, &a, false).is_none());
        assert!(key_bounds(&a, true, &a, true).is_some());
        assert!(key_bounds(&RoutingKey::unbounded(), true, &RoutingKey::unbounded(), false).is_some());
    }

    #[test]
    fn test_multi_get_limits() {
        let p = Partition::new(1, 0);
        for i in 0..4u8 {
            put(&p, b"h", &[b'a' + i], b"vv", 0);
        }
        let request = |count, size| Request::MultiGet {
            hash_key: b"h".to_vec(),
            sort_keys: Vec::new(),
            max_kv_count: count,
            max_kv_size: size,
            no_value: false,
        };
        assert!(matches!(p.execute(request(-1, -1), 1000), Response::MultiGet { error: 0, ref kvs, .. } if kvs.len() == 4));
        assert!(matches!(p.execute(request(4, -1), 1000), Response::MultiGet { error: 0, ref kvs, .. } if kvs.len() == 4));
        assert!(matches!(p.execute(request(2, -1), 1000), Response::MultiGet { error: 7, ref kvs, .. } if kvs.len() == 2));
        // Each record is 3 bytes; a 6-byte budget stops after two
        assert!(matches!(p.execute(request(-1, 6), 1000), Response::MultiGet { error: 7, ref kvs, .. } if kvs.len() == 2));
    }
}
