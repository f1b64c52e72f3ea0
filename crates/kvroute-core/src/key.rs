//! Composite routing keys
//!
//! Layout: `hash_key_len (u16 BE) ‖ hash_key ‖ sort_key`
//!
//! Under plain byte order the length prefix keeps every record of one
//! hash_key in a single contiguous run, and inside that run the order is the
//! sort_key order. No sort_key content can be misread as another hash_key
//! because the hash_key boundary is fixed by the prefix.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{ClientResult, CodecError, ErrorCode};

/// Largest hash_key length that fits the 16-bit length prefix.
pub const MAX_HASH_KEY_LEN: usize = u16::MAX as usize;

/// Length prefix size in bytes
pub const LEN_PREFIX_SIZE: usize = 2;

/// Encoded `(hash_key, sort_key)` pair.
///
/// Compares by byte-lexicographic order. The empty key is never produced by
/// [`RoutingKey::encode`]; used as a scan bound it means "unbounded".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoutingKey(Vec<u8>);

impl RoutingKey {
    /// Encode a composite key.
    ///
    /// Fails with [`ErrorCode::InvalidHashKey`] when the hash_key does not fit
    /// the length prefix.
    pub fn encode(hash_key: &[u8], sort_key: &[u8]) -> ClientResult<Self> {
        if hash_key.len() > MAX_HASH_KEY_LEN {
            error!(len = hash_key.len(), "invalid hash key: length exceeds the 16-bit prefix");
            return Err(ErrorCode::InvalidHashKey.into());
        }
        let mut buf = Vec::with_capacity(LEN_PREFIX_SIZE + hash_key.len() + sort_key.len());
        buf.extend_from_slice(&(hash_key.len() as u16).to_be_bytes());
        buf.extend_from_slice(hash_key);
        buf.extend_from_slice(sort_key);
        Ok(Self(buf))
    }

    /// Smallest key strictly greater than every encoding of `(hash_key, *)`.
    ///
    /// This is the successor of the encoded prefix: trailing `0xFF` bytes are
    /// dropped and the last remaining byte is incremented. Used as the
    /// exclusive upper bound of a scan with no explicit stop sort_key.
    ///
    /// A prefix made only of `0xFF` bytes (a 65535-byte hash_key of `0xFF`)
    /// has no finite successor; the empty, unbounded key is returned.
    pub fn next_key(hash_key: &[u8]) -> ClientResult<Self> {
        let Self(mut prefix) = Self::encode(hash_key, &[])?;
        while let Some(last) = prefix.last_mut() {
            if *last == u8::MAX {
                prefix.pop();
            } else {
                *last += 1;
                return Ok(Self(prefix));
            }
        }
        Ok(Self::unbounded())
    }

    /// Rebuild a key from raw bytes received over the wire.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The empty key, used as an open scan bound.
    pub const fn unbounded() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split back into `(hash_key, sort_key)`.
    pub fn decode(&self) -> Result<(&[u8], &[u8]), CodecError> {
        if self.0.len() < LEN_PREFIX_SIZE {
            return Err(CodecError::MalformedKey { len: self.0.len() });
        }
        let hash_key_len = u16::from_be_bytes([self.0[0], self.0[1]]) as usize;
        let hash_key_end = LEN_PREFIX_SIZE + hash_key_len;
        if self.0.len() < hash_key_end {
            return Err(CodecError::MalformedKey { len: self.0.len() });
        }
        Ok((&self.0[LEN_PREFIX_SIZE..hash_key_end], &self.0[hash_key_end..]))
    }

    /// Whether this key belongs to `hash_key`'s collection.
    pub fn has_hash_key(&self, hash_key: &[u8]) -> bool {
        matches!(self.decode(), Ok((hk, _)) if hk == hash_key)
    }
}

impl AsRef<[u8]> for RoutingKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(hash_key: &[u8], sort_key: &[u8]) -> RoutingKey {
        RoutingKey::encode(hash_key, sort_key).unwrap()
    }

    #[test]
    fn test_layout() {
        let k = key(b"user1", b"profile");
        assert_eq!(&k.as_bytes()[..2], &[0x00, 0x05]);
        assert_eq!(&k.as_bytes()[2..7], b"user1");
        assert_eq!(&k.as_bytes()[7..], b"profile");
    }

    #[test]
    fn test_decode_roundtrip() {
        let k = key(b"user1", b"profile");
        assert_eq!(k.decode().unwrap(), (&b"user1"[..], &b"profile"[..]));

        let empty_sort = key(b"user1", b"");
        assert_eq!(empty_sort.decode().unwrap(), (&b"user1"[..], &b""[..]));
    }

    #[test]
    fn test_decode_malformed() {
        let short = RoutingKey::from_bytes(vec![0x00]);
        assert!(matches!(short.decode(), Err(CodecError::MalformedKey { len: 1 })));

        let truncated = RoutingKey::from_bytes(vec![0x00, 0x09, b'a']);
        assert!(matches!(truncated.decode(), Err(CodecError::MalformedKey { len: 3 })));
    }

    #[test]
    fn test_oversized_hash_key_rejected() {
        let hash_key = vec![b'h'; MAX_HASH_KEY_LEN + 1];
        let err = RoutingKey::encode(&hash_key, b"s").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidHashKey);
        assert_eq!(RoutingKey::next_key(&hash_key).unwrap_err().code(), ErrorCode::InvalidHashKey);
    }

    #[test]
    fn test_max_hash_key_accepted() {
        let hash_key = vec![b'h'; MAX_HASH_KEY_LEN];
        let k = RoutingKey::encode(&hash_key, b"s").unwrap();
        assert_eq!(&k.as_bytes()[..2], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_next_key_increments_prefix() {
        let next = RoutingKey::next_key(b"a").unwrap();
        assert_eq!(next.as_bytes(), &[0x00, 0x01, b'b']);
    }

    #[test]
    fn test_next_key_carries_over_ff() {
        let next = RoutingKey::next_key(&[b'a', 0xFF, 0xFF]).unwrap();
        assert_eq!(next.as_bytes(), &[0x00, 0x03, b'b']);

        // Only the length prefix is left to increment
        let next = RoutingKey::next_key(&[0xFF]).unwrap();
        assert_eq!(next.as_bytes(), &[0x00, 0x02]);
    }

    #[test]
    fn test_next_key_of_empty_hash_key() {
        let next = RoutingKey::next_key(b"").unwrap();
        assert_eq!(next.as_bytes(), &[0x00, 0x01]);
        assert!(next > key(b"", &[0xFF; 64]));
        assert!(next <= key(&[0x00], b""));
    }

    #[test]
    fn test_next_key_without_finite_successor() {
        let hash_key = vec![0xFF; MAX_HASH_KEY_LEN];
        let next = RoutingKey::next_key(&hash_key).unwrap();
        assert!(next.is_unbounded());
    }

    #[test]
    fn test_short_hash_key_sorts_first() {
        // Length prefix dominates: every "b" record precedes every "aa" record
        assert!(key(b"b", &[0xFF; 8]) < key(b"aa", b""));
    }

    proptest! {
        #[test]
        fn prop_sort_key_order_preserved(
            hash_key in proptest::collection::vec(any::<u8>(), 0..32),
            a in proptest::collection::vec(any::<u8>(), 0..32),
            b in proptest::collection::vec(any::<u8>(), 0..32),
        ) {
            let ka = key(&hash_key, &a);
            let kb = key(&hash_key, &b);
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }

        #[test]
        fn prop_next_key_bounds_collection(
            hash_key in proptest::collection::vec(any::<u8>(), 0..32),
            sort_key in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let next = RoutingKey::next_key(&hash_key).unwrap();
            prop_assert!(next > key(&hash_key, &sort_key));
        }

        #[test]
        fn prop_next_key_precedes_later_collections(
            hash_key in proptest::collection::vec(any::<u8>(), 0..16),
            other in proptest::collection::vec(any::<u8>(), 0..16),
            sort_key in proptest::collection::vec(any::<u8>(), 1..16),
        ) {
            let prefix = key(&hash_key, b"");
            let other_prefix = key(&other, b"");
            prop_assume!(other_prefix > prefix);

            let next = RoutingKey::next_key(&hash_key).unwrap();
            prop_assert!(next <= other_prefix);
            prop_assert!(next < key(&other, &sort_key));
        }
    }
}
