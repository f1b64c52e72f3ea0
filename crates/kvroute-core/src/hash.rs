//! Partition hashing
//!
//! The partition hash is the shard hint sent with every request. It is taken
//! over the hash_key portion of a routing key only, so every sort_key under
//! one hash_key lands on the same partition. Keys with an empty hash_key are
//! hashed by their sort_key instead, which keeps them spread across
//! partitions rather than piling onto one.

use crate::key::RoutingKey;

/// 64-bit shard hint. Never persisted.
pub type PartitionHash = u64;

/// Derive the partition hash of a routing key.
///
/// Pure and deterministic: identical key bytes always give the same hash.
pub fn partition_hash(key: &RoutingKey) -> PartitionHash {
    let material = match key.decode() {
        Ok((hash_key, _)) if !hash_key.is_empty() => hash_key,
        Ok((_, sort_key)) => sort_key,
        Err(_) => key.as_bytes(),
    };
    digest64(material)
}

/// Partition hash of a whole hash_key collection.
///
/// Equal to `partition_hash(&RoutingKey::encode(hash_key, s))` for any
/// sort_key `s` when `hash_key` is non-empty.
pub fn hash_key_hash(hash_key: &[u8]) -> PartitionHash {
    digest64(hash_key)
}

/// Map a partition hash onto a partition index.
///
/// A hint that is already a partition index (as produced by full-table scan
/// planning) maps to itself.
#[inline]
pub fn partition_index(hash: PartitionHash, partition_count: u32) -> u32 {
    (hash % u64::from(partition_count.max(1))) as u32
}

fn digest64(bytes: &[u8]) -> u64 {
    let digest = blake3::hash(bytes);
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hash_key: &[u8], sort_key: &[u8]) -> RoutingKey {
        RoutingKey::encode(hash_key, sort_key).unwrap()
    }

    #[test]
    fn test_deterministic() {
        let k = key(b"user1", b"profile");
        assert_eq!(partition_hash(&k), partition_hash(&k.clone()));
    }

    #[test]
    fn test_colocation_by_hash_key() {
        let h = partition_hash(&key(b"user1", b""));
        for sort_key in [&b"a"[..], b"profile", b"zzzzzz", &[0xFF; 40]] {
            assert_eq!(partition_hash(&key(b"user1", sort_key)), h);
        }
        assert_eq!(hash_key_hash(b"user1"), h);
    }

    #[test]
    fn test_empty_hash_key_hashes_sort_key() {
        let a = partition_hash(&key(b"", b"alpha"));
        let b = partition_hash(&key(b"", b"beta"));
        assert_ne!(a, b);
        assert_eq!(a, hash_key_hash(b"alpha"));
    }

    #[test]
    fn test_partition_index_in_range() {
        for i in 0..1000u32 {
            let h = hash_key_hash(format!("hk{}", i).as_bytes());
            assert!(partition_index(h, 8) < 8);
        }
        // Index hints map to themselves
        for i in 0..8u64 {
            assert_eq!(partition_index(i, 8), i as u32);
        }
        assert_eq!(partition_index(12345, 0), 0);
    }

    #[test]
    fn test_distribution_touches_every_partition() {
        let mut seen = [false; 8];
        for i in 0..1000u32 {
            let h = hash_key_hash(format!("user{}", i).as_bytes());
            seen[partition_index(h, 8) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
