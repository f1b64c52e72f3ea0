//! Request validation
//!
//! Stateless guards run before any request is built. A failing guard logs the
//! reason and returns the client code; no network call is made.

use tracing::error;

use crate::error::{ClientResult, ErrorCode};
use crate::key::MAX_HASH_KEY_LEN;

/// Hash_key must fit the 16-bit length prefix. Empty is allowed: point
/// operations still carry a distinguishing sort_key.
pub fn check_hash_key_len(hash_key: &[u8], op: &'static str) -> ClientResult<()> {
    if hash_key.len() > MAX_HASH_KEY_LEN {
        error!(op, len = hash_key.len(), max = MAX_HASH_KEY_LEN, "invalid hash key: too long");
        return Err(ErrorCode::InvalidHashKey.into());
    }
    Ok(())
}

/// Hash_key must be non-empty and fit the length prefix. Used by operations
/// scoped to one hash_key's collection (batches, counts, scans).
pub fn check_hash_key(hash_key: &[u8], op: &'static str) -> ClientResult<()> {
    if hash_key.is_empty() {
        error!(op, "invalid hash key: must not be empty");
        return Err(ErrorCode::InvalidHashKey.into());
    }
    check_hash_key_len(hash_key, op)
}

/// Inherently batched operations need at least one entry.
pub fn check_batch(len: usize, what: &'static str, op: &'static str) -> ClientResult<()> {
    if len == 0 {
        error!(op, what, "invalid batch: must not be empty");
        return Err(ErrorCode::InvalidValue.into());
    }
    Ok(())
}

/// Full-table scan planning needs a positive split count.
pub fn check_split_count(max_split_count: i32) -> ClientResult<()> {
    if max_split_count <= 0 {
        error!(max_split_count, "invalid max_split_count: must be greater than 0");
        return Err(ErrorCode::InvalidSplitCount.into());
    }
    Ok(())
}
