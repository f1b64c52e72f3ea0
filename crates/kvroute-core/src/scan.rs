//! Scan planning
//!
//! Two kinds of scan descriptors:
//!
//! - **Bounded**: one hash_key, a sort_key range. All records of a hash_key
//!   share a partition, so the descriptor carries at most one partition hint.
//! - **Unordered**: a full-table scan split into groups of whole partitions.
//!   Each group carries its partition indices as hints and no key bounds.

use std::cmp::Ordering;
use std::time::Duration;

use crate::error::ClientResult;
use crate::hash::{partition_hash, PartitionHash};
use crate::key::RoutingKey;
use crate::validate::{check_hash_key, check_split_count};

/// Scan tuning knobs. Every descriptor owns its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Records fetched per scan request
    pub batch_size: u32,
    /// Ask the engine to serve every page from one snapshot
    pub snapshot: bool,
    pub start_inclusive: bool,
    pub stop_inclusive: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            batch_size: 1000,
            snapshot: false,
            start_inclusive: true,
            stop_inclusive: false,
        }
    }
}

/// One planned scan.
///
/// An empty `stop_key` means the range is open above; an empty `start_key`
/// means it is open below. `partition_hashes` is empty when the range holds
/// nothing, and the scan then short-circuits with zero records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    pub start_key: RoutingKey,
    pub stop_key: RoutingKey,
    pub start_inclusive: bool,
    pub stop_inclusive: bool,
    pub partition_hashes: Vec<PartitionHash>,
    pub options: ScanOptions,
}

impl ScanRange {
    /// True when the planner found nothing to scan.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.partition_hashes.is_empty()
    }
}

/// Plan a scan over one hash_key's sort_keys.
///
/// An empty `stop_sort_key` scans to the end of the collection and forces the
/// stop bound exclusive. The range is non-empty when `start < stop`, or when
/// `start == stop` with both bounds inclusive.
pub fn plan_bounded(
    hash_key: &[u8],
    start_sort_key: &[u8],
    stop_sort_key: &[u8],
    options: &ScanOptions,
) -> ClientResult<ScanRange> {
    check_hash_key(hash_key, "get_scanner")?;

    let mut options = options.clone();
    let start_key = RoutingKey::encode(hash_key, start_sort_key)?;
    let stop_key = if stop_sort_key.is_empty() {
        options.stop_inclusive = false;
        RoutingKey::next_key(hash_key)?
    } else {
        RoutingKey::encode(hash_key, stop_sort_key)?
    };

    let non_empty = stop_key.is_unbounded()
        || match start_key.cmp(&stop_key) {
            Ordering::Less => true,
            Ordering::Equal => options.start_inclusive && options.stop_inclusive,
            Ordering::Greater => false,
        };
    let partition_hashes = if non_empty { vec![partition_hash(&start_key)] } else { Vec::new() };

    Ok(ScanRange {
        start_inclusive: options.start_inclusive,
        stop_inclusive: options.stop_inclusive,
        start_key,
        stop_key,
        partition_hashes,
        options,
    })
}

/// Split a full-table scan over `partition_count` partitions into at most
/// `max_split_count` groups.
///
/// Group sizes differ by at most one; the first `partition_count % split`
/// groups get the extra partition. Indices are handed out from the highest
/// down, and every index lands in exactly one group. Only timeout, batch size
/// and snapshot carry over from `options`; bounds use their defaults.
pub fn plan_unordered(
    partition_count: u32,
    max_split_count: i32,
    options: &ScanOptions,
) -> ClientResult<Vec<ScanRange>> {
    check_split_count(max_split_count)?;
    if partition_count == 0 {
        return Ok(Vec::new());
    }

    let split = partition_count.min(max_split_count as u32);
    let size = partition_count / split;
    let more = partition_count % split;

    let defaults = ScanOptions::default();
    let group_options = ScanOptions {
        timeout: options.timeout,
        batch_size: options.batch_size,
        snapshot: options.snapshot,
        ..defaults
    };

    let mut next = partition_count;
    let mut groups = Vec::with_capacity(split as usize);
    for i in 0..split {
        let group_size = size + u32::from(i < more);
        let partition_hashes = (0..group_size)
            .map(|_| {
                next -= 1;
                PartitionHash::from(next)
            })
            .collect();
        groups.push(ScanRange {
            start_key: RoutingKey::unbounded(),
            stop_key: RoutingKey::unbounded(),
            start_inclusive: group_options.start_inclusive,
            stop_inclusive: group_options.stop_inclusive,
            partition_hashes,
            options: group_options.clone(),
        });
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::error::ErrorCode;

    fn inclusive() -> ScanOptions {
        ScanOptions { start_inclusive: true, stop_inclusive: true, ..ScanOptions::default() }
    }

    #[test]
    fn test_single_point_inclusive() {
        let range = plan_bounded(b"user1", b"m", b"m", &inclusive()).unwrap();
        assert_eq!(range.partition_hashes.len(), 1);
        let point = RoutingKey::encode(b"user1", b"m").unwrap();
        assert_eq!(range.start_key, point);
        assert_eq!(range.stop_key, point);
        assert!(range.start_inclusive && range.stop_inclusive);
    }

    #[test]
    fn test_single_point_half_open_is_empty() {
        let range = plan_bounded(b"user1", b"m", b"m", &ScanOptions::default()).unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn test_reversed_bounds_empty() {
        let range = plan_bounded(b"user1", b"z", b"a", &inclusive()).unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn test_open_stop_forces_exclusive() {
        let range = plan_bounded(b"user1", b"", b"", &inclusive()).unwrap();
        assert!(!range.stop_inclusive);
        assert!(!range.options.stop_inclusive);
        assert_eq!(range.stop_key, RoutingKey::next_key(b"user1").unwrap());
        assert_eq!(range.partition_hashes, vec![crate::hash::hash_key_hash(b"user1")]);
        assert!(RoutingKey::encode(b"user1", &[0xFF; 16]).unwrap() < range.stop_key);
        assert!(RoutingKey::encode(b"user2", b"").unwrap() >= range.stop_key);
    }

    #[test]
    fn test_options_are_copied() {
        let mut source = inclusive();
        let range = plan_bounded(b"user1", b"", b"", &source).unwrap();
        source.batch_size = 7;
        assert_eq!(range.options.batch_size, ScanOptions::default().batch_size);
        // The caller's options were not touched either
        assert!(source.stop_inclusive);
    }

    #[test]
    fn test_bounded_rejects_bad_hash_key() {
        let err = plan_bounded(b"", b"a", b"b", &inclusive()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidHashKey);
        let big = vec![b'x'; 65_536];
        assert_eq!(plan_bounded(&big, b"", b"", &inclusive()).unwrap_err().code(), ErrorCode::InvalidHashKey);
    }

    #[test]
    fn test_unordered_ten_by_three() {
        let groups = plan_unordered(10, 3, &ScanOptions::default()).unwrap();
        assert_eq!(groups.len(), 3);

        let sizes: Vec<usize> = groups.iter().map(|g| g.partition_hashes.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(groups[0].partition_hashes, vec![9, 8, 7, 6]);

        let mut all = BTreeSet::new();
        for g in &groups {
            for h in &g.partition_hashes {
                assert!(all.insert(*h), "partition {} assigned twice", h);
            }
            assert!(g.start_key.is_unbounded());
            assert!(g.stop_key.is_unbounded());
        }
        assert_eq!(all, (0..10).collect::<BTreeSet<u64>>());
    }

    #[test]
    fn test_unordered_split_capped_by_partitions() {
        let groups = plan_unordered(4, 16, &ScanOptions::default()).unwrap();
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.partition_hashes.len() == 1));
    }

    #[test]
    fn test_unordered_exhaustive_and_balanced() {
        for count in 1..40u32 {
            for split in 1..12i32 {
                let groups = plan_unordered(count, split, &ScanOptions::default()).unwrap();
                let sizes: Vec<usize> = groups.iter().map(|g| g.partition_hashes.len()).collect();
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1);
                let all: BTreeSet<u64> = groups.iter().flat_map(|g| g.partition_hashes.iter().copied()).collect();
                assert_eq!(all.len(), count as usize);
                assert_eq!(sizes.iter().sum::<usize>(), count as usize);
            }
        }
    }

    #[test]
    fn test_unordered_invalid_split() {
        assert_eq!(plan_unordered(8, 0, &ScanOptions::default()).unwrap_err().code(), ErrorCode::InvalidSplitCount);
        assert_eq!(plan_unordered(8, -1, &ScanOptions::default()).unwrap_err().code(), ErrorCode::InvalidSplitCount);
    }

    #[test]
    fn test_unordered_keeps_only_paging_options() {
        let source = ScanOptions {
            timeout: Duration::from_millis(250),
            batch_size: 17,
            snapshot: true,
            start_inclusive: false,
            stop_inclusive: true,
        };
        let groups = plan_unordered(3, 2, &source).unwrap();
        for g in &groups {
            assert_eq!(g.options.timeout, Duration::from_millis(250));
            assert_eq!(g.options.batch_size, 17);
            assert!(g.options.snapshot);
            assert!(g.options.start_inclusive);
            assert!(!g.options.stop_inclusive);
        }
    }

    #[test]
    fn test_unordered_zero_partitions() {
        assert!(plan_unordered(0, 4, &ScanOptions::default()).unwrap().is_empty());
    }
}
