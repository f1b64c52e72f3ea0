//! Executing planned scans.
//!
//! A scanner walks its partition hints in order. For each hint it pages
//! through the key range with `Scan` requests of `batch_size` records,
//! resuming just after the last key it has seen, until the engine reports
//! the partition complete.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error};

use kvroute_core::message::{KeyValue, Request, Response};
use kvroute_core::{translate, ClientError, ClientResult, ErrorCode, RoutingKey, ScanRange, TransportStatus};

use crate::transport::{round_trip, unexpected, Transport};

/// One record returned by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub hash_key: Vec<u8>,
    pub sort_key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Async cursor over one [`ScanRange`].
pub struct Scanner {
    transport: Arc<dyn Transport>,
    range: ScanRange,
    /// Index into `range.partition_hashes`
    current: usize,
    /// Last key returned from the current partition
    resume: Option<RoutingKey>,
    /// Current partition has no more pages
    partition_done: bool,
    buffer: VecDeque<KeyValue>,
}

impl Scanner {
    pub(crate) fn new(transport: Arc<dyn Transport>, range: ScanRange) -> Self {
        Self {
            transport,
            range,
            current: 0,
            resume: None,
            partition_done: false,
            buffer: VecDeque::new(),
        }
    }

    /// The planned range this scanner executes.
    pub fn range(&self) -> &ScanRange {
        &self.range
    }

    /// Next record, or `None` once every partition hint is drained.
    ///
    /// A failed page leaves the cursor where it was; calling again retries it.
    pub async fn next(&mut self) -> ClientResult<Option<Record>> {
        loop {
            if let Some(kv) = self.buffer.pop_front() {
                return to_record(kv).map(Some);
            }
            if self.current >= self.range.partition_hashes.len() {
                return Ok(None);
            }
            if self.partition_done {
                self.current += 1;
                self.resume = None;
                self.partition_done = false;
                continue;
            }
            self.fetch_page().await?;
        }
    }

    /// Drain the scanner into a vector.
    pub async fn collect_all(&mut self) -> ClientResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    async fn fetch_page(&mut self) -> ClientResult<()> {
        let hash = self.range.partition_hashes[self.current];
        let (start_key, start_inclusive) = match &self.resume {
            Some(last) => (last.clone(), false),
            None => (self.range.start_key.clone(), self.range.start_inclusive),
        };
        let request = Request::Scan {
            start_key,
            stop_key: self.range.stop_key.clone(),
            start_inclusive,
            stop_inclusive: self.range.stop_inclusive,
            batch_size: self.range.options.batch_size.max(1),
            snapshot: self.range.options.snapshot,
        };

        match round_trip(&self.transport, hash, &request, self.range.options.timeout).await? {
            Response::Scan { error, kvs, complete, served_by } => {
                let code = translate(TransportStatus::Ok, error);
                if !code.is_ok() {
                    return Err(ClientError::with_info(code, served_by.read_info()));
                }
                debug!(
                    partition = served_by.partition_index,
                    records = kvs.len(),
                    complete,
                    "scan page"
                );
                if let Some(last) = kvs.last() {
                    self.resume = Some(RoutingKey::from_bytes(last.key.clone()));
                }
                self.partition_done = complete || kvs.is_empty();
                self.buffer.extend(kvs);
                Ok(())
            }
            other => Err(unexpected("scan", &other)),
        }
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("partitions", &self.range.partition_hashes.len())
            .field("current", &self.current)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

fn to_record(kv: KeyValue) -> ClientResult<Record> {
    let key = RoutingKey::from_bytes(kv.key);
    match key.decode() {
        Ok((hash_key, sort_key)) => Ok(Record {
            hash_key: hash_key.to_vec(),
            sort_key: sort_key.to_vec(),
            value: kv.value,
        }),
        Err(e) => {
            error!(error = %e, "scan returned a malformed key");
            Err(ClientError::new(ErrorCode::Unknown))
        }
    }
}
