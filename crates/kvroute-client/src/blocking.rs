//! Blocking forms of every client operation.
//!
//! Each method runs the async form through the [`SyncBridge`] with the same
//! timeout the operation was given, so no call blocks indefinitely.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use kvroute_core::{ClientResult, Fetched, Reply, ScanOptions, ScanRange};

use crate::bridge::SyncBridge;
use crate::client::KvClient;
use crate::scanner::{Record, Scanner};

/// Blocking client. Shares everything with the [`KvClient`] it wraps.
#[derive(Debug, Clone)]
pub struct BlockingKvClient {
    inner: KvClient,
    bridge: SyncBridge,
}

impl BlockingKvClient {
    pub fn new(inner: KvClient, bridge: SyncBridge) -> Self {
        Self { inner, bridge }
    }

    /// The async client underneath.
    pub fn async_client(&self) -> &KvClient {
        &self.inner
    }

    pub fn cluster_name(&self) -> &str {
        self.inner.cluster_name()
    }

    pub fn app_name(&self) -> &str {
        self.inner.app_name()
    }

    pub fn set(
        &self,
        hash_key: &[u8],
        sort_key: &[u8],
        value: &[u8],
        timeout: Duration,
        ttl_seconds: u32,
    ) -> ClientResult<Reply<()>> {
        self.bridge.wait(timeout, self.inner.set(hash_key, sort_key, value, timeout, ttl_seconds))
    }

    pub fn multi_set(
        &self,
        hash_key: &[u8],
        kvs: &BTreeMap<Vec<u8>, Vec<u8>>,
        timeout: Duration,
        ttl_seconds: u32,
    ) -> ClientResult<Reply<()>> {
        self.bridge.wait(timeout, self.inner.multi_set(hash_key, kvs, timeout, ttl_seconds))
    }

    pub fn get(&self, hash_key: &[u8], sort_key: &[u8], timeout: Duration) -> ClientResult<Reply<Vec<u8>>> {
        self.bridge.wait(timeout, self.inner.get(hash_key, sort_key, timeout))
    }

    pub fn multi_get(
        &self,
        hash_key: &[u8],
        sort_keys: &BTreeSet<Vec<u8>>,
        max_fetch_count: i32,
        max_fetch_size: i32,
        timeout: Duration,
    ) -> ClientResult<Reply<Fetched<BTreeMap<Vec<u8>, Vec<u8>>>>> {
        self.bridge.wait(
            timeout,
            self.inner.multi_get(hash_key, sort_keys, max_fetch_count, max_fetch_size, timeout),
        )
    }

    pub fn multi_get_sortkeys(
        &self,
        hash_key: &[u8],
        max_fetch_count: i32,
        max_fetch_size: i32,
        timeout: Duration,
    ) -> ClientResult<Reply<Fetched<BTreeSet<Vec<u8>>>>> {
        self.bridge.wait(
            timeout,
            self.inner.multi_get_sortkeys(hash_key, max_fetch_count, max_fetch_size, timeout),
        )
    }

    pub fn del(&self, hash_key: &[u8], sort_key: &[u8], timeout: Duration) -> ClientResult<Reply<()>> {
        self.bridge.wait(timeout, self.inner.del(hash_key, sort_key, timeout))
    }

    pub fn multi_del(
        &self,
        hash_key: &[u8],
        sort_keys: &BTreeSet<Vec<u8>>,
        timeout: Duration,
    ) -> ClientResult<Reply<i64>> {
        self.bridge.wait(timeout, self.inner.multi_del(hash_key, sort_keys, timeout))
    }

    pub fn exist(&self, hash_key: &[u8], sort_key: &[u8], timeout: Duration) -> ClientResult<Reply<bool>> {
        self.bridge.wait(timeout, self.inner.exist(hash_key, sort_key, timeout))
    }

    pub fn ttl(&self, hash_key: &[u8], sort_key: &[u8], timeout: Duration) -> ClientResult<Reply<i32>> {
        self.bridge.wait(timeout, self.inner.ttl(hash_key, sort_key, timeout))
    }

    pub fn sortkey_count(&self, hash_key: &[u8], timeout: Duration) -> ClientResult<Reply<i64>> {
        self.bridge.wait(timeout, self.inner.sortkey_count(hash_key, timeout))
    }

    pub fn get_scanner(
        &self,
        hash_key: &[u8],
        start_sort_key: &[u8],
        stop_sort_key: &[u8],
        options: &ScanOptions,
    ) -> ClientResult<BlockingScanner> {
        let scanner = self.bridge.wait(
            options.timeout,
            self.inner.get_scanner(hash_key, start_sort_key, stop_sort_key, options),
        )?;
        Ok(BlockingScanner::new(scanner, self.bridge.clone()))
    }

    pub fn get_unordered_scanners(
        &self,
        max_split_count: i32,
        options: &ScanOptions,
    ) -> ClientResult<Vec<BlockingScanner>> {
        let scanners = self
            .bridge
            .wait(options.timeout, self.inner.get_unordered_scanners(max_split_count, options))?;
        Ok(scanners
            .into_iter()
            .map(|s| BlockingScanner::new(s, self.bridge.clone()))
            .collect())
    }
}

/// Blocking cursor over a planned scan. Also an [`Iterator`] of records.
#[derive(Debug)]
pub struct BlockingScanner {
    inner: Scanner,
    bridge: SyncBridge,
    failed: bool,
}

impl BlockingScanner {
    pub fn new(inner: Scanner, bridge: SyncBridge) -> Self {
        Self { inner, bridge, failed: false }
    }

    pub fn range(&self) -> &ScanRange {
        self.inner.range()
    }

    /// Next record, blocking for at most one page's timeout.
    pub fn next_record(&mut self) -> ClientResult<Option<Record>> {
        let timeout = self.inner.range().options.timeout;
        self.bridge.wait(timeout, self.inner.next())
    }
}

impl Iterator for BlockingScanner {
    type Item = ClientResult<Record>;

    /// Stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
