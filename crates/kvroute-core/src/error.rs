//! Error types for kvroute operations
//!
//! Callers only ever see [`ClientError`], which wraps one unified
//! [`ErrorCode`]. The numeric codes are split into disjoint bands so a logged
//! code tells you which layer produced it:
//!
//! - `0`: success
//! - `-1 ..= -104`: transport and server failures
//! - `-201 ..= -206`: local validation failures
//! - `-1001 ..= -1012`: storage-engine failures, rebased from the raw engine status

use std::fmt;

use thiserror::Error;

use crate::types::InternalInfo;

/// Unified client error code.
///
/// The discriminant is the stable numeric code reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    Unknown = -1,
    Timeout = -2,
    ObjectNotFound = -3,
    NetworkFailure = -4,
    HandlerNotFound = -5,

    AppNotExist = -101,
    AppExist = -102,
    ServerInternalError = -103,
    ServerChanged = -104,

    InvalidArgument = -201,
    InvalidHashKey = -202,
    InvalidValue = -203,
    InvalidPartitionCount = -204,
    InvalidReplicaCount = -205,
    InvalidSplitCount = -206,

    NotFound = -1001,
    Corruption = -1002,
    NotSupported = -1003,
    StorageInvalidArgument = -1004,
    IoError = -1005,
    MergeInProgress = -1006,
    Incomplete = -1007,
    ShutdownInProgress = -1008,
    TimedOut = -1009,
    Aborted = -1010,
    Busy = -1011,
    Expired = -1012,
}

impl ErrorCode {
    /// Stable numeric value of this code.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, ErrorCode::Ok)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", crate::translate::error_message(*self), self.code())
    }
}

/// Error returned by every client operation.
///
/// `info` holds whatever diagnostics were available when the call failed;
/// on validation failures and transport failures it is the sentinel
/// [`InternalInfo::default`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}")]
pub struct ClientError {
    pub code: ErrorCode,
    pub info: InternalInfo,
}

impl ClientError {
    pub fn new(code: ErrorCode) -> Self {
        Self { code, info: InternalInfo::default() }
    }

    pub fn with_info(code: ErrorCode, info: InternalInfo) -> Self {
        Self { code, info }
    }

    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<ErrorCode> for ClientError {
    fn from(code: ErrorCode) -> Self {
        ClientError::new(code)
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Failures while decoding a wire frame or a routing key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("frame too short: {len} bytes, need at least {need}")]
    TooShort { len: usize, need: usize },

    #[error("magic bytes not found: found {found:02x?}")]
    NoMagicFound { found: [u8; 4] },

    #[error("torn frame: expected {expected} payload bytes, only {available} available")]
    TornFrame { expected: u32, available: usize },

    #[error("checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("unexpected frame kind: expected {expected}, found {found}")]
    UnexpectedKind { expected: u8, found: u8 },

    #[error("malformed routing key of {len} bytes")]
    MalformedKey { len: usize },

    #[error("malformed payload: {0}")]
    Payload(String),
}

impl From<postcard::Error> for CodecError {
    fn from(err: postcard::Error) -> Self {
        CodecError::Payload(err.to_string())
    }
}

/// Construction-time configuration failures. These are fatal: a client is
/// never built from a configuration that fails to resolve.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no meta server specified for cluster '{cluster}'")]
    NoMetaServers { cluster: String },

    #[error("invalid address '{address}' specified for cluster '{cluster}'")]
    InvalidAddress { cluster: String, address: String },

    #[error("cluster '{0}' not found in directory")]
    UnknownCluster(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cluster directory: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::new(ErrorCode::InvalidHashKey);
        let display = format!("{}", err);
        assert!(display.contains("-202"));
        assert!(display.contains("hash key"));
    }

    #[test]
    fn test_from_code_keeps_sentinel_info() {
        let err: ClientError = ErrorCode::Timeout.into();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert_eq!(err.info, InternalInfo::default());
    }

    #[test]
    fn test_checksum_display() {
        let err = CodecError::ChecksumMismatch { expected: 0x12345678, actual: 0x87654321 };
        let display = format!("{}", err);
        assert!(display.contains("0x12345678"));
        assert!(display.contains("0x87654321"));
    }
}
