//! Status translation
//!
//! Every completion path funnels through [`translate`]:
//!
//! 1. A non-success transport status maps straight to a client code.
//! 2. Otherwise the storage-engine status in the response is rebased into the
//!    reserved band below [`STORAGE_ERROR_BASE`] and looked up in the same
//!    table.
//!
//! The tables are built once from the static declarations below and are
//! read-only afterwards, so lookups need no locking.

use std::sync::LazyLock;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::ErrorCode;

/// Storage statuses are rebased to `STORAGE_ERROR_BASE - raw`.
pub const STORAGE_ERROR_BASE: i32 = -1000;

/// Number of engine statuses with a client code (`1..=STORAGE_ERROR_COUNT`).
pub const STORAGE_ERROR_COUNT: i32 = 12;

/// Status reported by the transport for one call.
///
/// Codes are non-negative; zero is success. Anything the transport reports
/// that has no named variant arrives as `Other` and translates to
/// [`ErrorCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportStatus {
    Ok,
    Timeout,
    FileOperationFailed,
    InvalidState,
    ObjectNotFound,
    NetworkFailure,
    HandlerNotFound,
    AppNotExist,
    AppExist,
    Other(i32),
}

impl TransportStatus {
    pub const fn code(self) -> i32 {
        match self {
            TransportStatus::Ok => 0,
            TransportStatus::Timeout => 1,
            TransportStatus::FileOperationFailed => 2,
            TransportStatus::InvalidState => 3,
            TransportStatus::ObjectNotFound => 4,
            TransportStatus::NetworkFailure => 5,
            TransportStatus::HandlerNotFound => 6,
            TransportStatus::AppNotExist => 7,
            TransportStatus::AppExist => 8,
            TransportStatus::Other(code) => code,
        }
    }

    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => TransportStatus::Ok,
            1 => TransportStatus::Timeout,
            2 => TransportStatus::FileOperationFailed,
            3 => TransportStatus::InvalidState,
            4 => TransportStatus::ObjectNotFound,
            5 => TransportStatus::NetworkFailure,
            6 => TransportStatus::HandlerNotFound,
            7 => TransportStatus::AppNotExist,
            8 => TransportStatus::AppExist,
            other => TransportStatus::Other(other),
        }
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, TransportStatus::Ok)
    }
}

/// Client codes with their messages: `(enum, code, message)`.
const CLIENT_ERRORS: &[(ErrorCode, i32, &str)] = &[
    (ErrorCode::Ok, 0, "success"),
    (ErrorCode::Unknown, -1, "unknown error"),
    (ErrorCode::Timeout, -2, "operation timed out"),
    (ErrorCode::ObjectNotFound, -3, "object not found"),
    (ErrorCode::NetworkFailure, -4, "network failure"),
    (ErrorCode::HandlerNotFound, -5, "handler not found"),
    (ErrorCode::AppNotExist, -101, "app does not exist"),
    (ErrorCode::AppExist, -102, "app already exists"),
    (ErrorCode::ServerInternalError, -103, "server internal error"),
    (ErrorCode::ServerChanged, -104, "server state changed"),
    (ErrorCode::InvalidArgument, -201, "invalid argument"),
    (ErrorCode::InvalidHashKey, -202, "invalid hash key"),
    (ErrorCode::InvalidValue, -203, "invalid value"),
    (ErrorCode::InvalidPartitionCount, -204, "invalid partition count"),
    (ErrorCode::InvalidReplicaCount, -205, "invalid replica count"),
    (ErrorCode::InvalidSplitCount, -206, "invalid split count"),
    (ErrorCode::NotFound, -1001, "storage: not found"),
    (ErrorCode::Corruption, -1002, "storage: corruption"),
    (ErrorCode::NotSupported, -1003, "storage: not supported"),
    (ErrorCode::StorageInvalidArgument, -1004, "storage: invalid argument"),
    (ErrorCode::IoError, -1005, "storage: io error"),
    (ErrorCode::MergeInProgress, -1006, "storage: merge in progress"),
    (ErrorCode::Incomplete, -1007, "storage: incomplete"),
    (ErrorCode::ShutdownInProgress, -1008, "storage: shutdown in progress"),
    (ErrorCode::TimedOut, -1009, "storage: timed out"),
    (ErrorCode::Aborted, -1010, "storage: aborted"),
    (ErrorCode::Busy, -1011, "storage: busy"),
    (ErrorCode::Expired, -1012, "storage: expired"),
];

/// Transport statuses with a dedicated client code.
const TRANSPORT_ERRORS: &[(TransportStatus, ErrorCode)] = &[
    (TransportStatus::Ok, ErrorCode::Ok),
    (TransportStatus::Timeout, ErrorCode::Timeout),
    (TransportStatus::FileOperationFailed, ErrorCode::ServerInternalError),
    (TransportStatus::InvalidState, ErrorCode::ServerChanged),
    (TransportStatus::ObjectNotFound, ErrorCode::ObjectNotFound),
    (TransportStatus::NetworkFailure, ErrorCode::NetworkFailure),
    (TransportStatus::HandlerNotFound, ErrorCode::HandlerNotFound),
    (TransportStatus::AppNotExist, ErrorCode::AppNotExist),
    (TransportStatus::AppExist, ErrorCode::AppExist),
];

struct ErrorTables {
    /// client code -> (enum, message)
    client: HashMap<i32, (ErrorCode, &'static str)>,
    /// transport code or rebased storage code -> client code
    server_to_client: HashMap<i32, ErrorCode>,
}

impl ErrorTables {
    fn build() -> Self {
        let mut client = HashMap::with_capacity(CLIENT_ERRORS.len());
        for &(code, value, message) in CLIENT_ERRORS {
            client.insert(value, (code, message));
        }

        let mut server_to_client = HashMap::with_capacity(TRANSPORT_ERRORS.len() + STORAGE_ERROR_COUNT as usize);
        for &(status, code) in TRANSPORT_ERRORS {
            server_to_client.insert(status.code(), code);
        }
        // Storage band maps onto itself
        for raw in 1..=STORAGE_ERROR_COUNT {
            let rebased = storage_error(raw);
            if let Some(&(code, _)) = client.get(&rebased) {
                server_to_client.insert(rebased, code);
            }
        }

        Self { client, server_to_client }
    }
}

static TABLES: LazyLock<ErrorTables> = LazyLock::new(ErrorTables::build);

/// Rebase a raw storage-engine status into the reserved band.
///
/// Zero stays zero.
#[inline]
pub const fn storage_error(raw: i32) -> i32 {
    if raw == 0 {
        0
    } else {
        STORAGE_ERROR_BASE - raw
    }
}

/// Look up the client code for a transport code or a rebased storage code.
///
/// Total: codes absent from the table are logged and reported as
/// [`ErrorCode::Unknown`].
pub fn get_client_error(server_error: i32) -> ErrorCode {
    match TABLES.server_to_client.get(&server_error) {
        Some(&code) => code,
        None => {
            error!(server_error, "no client error for server error");
            ErrorCode::Unknown
        }
    }
}

/// Fold a transport status and the engine status carried by the response
/// into one client code.
///
/// `engine_status` is only consulted when the transport succeeded.
pub fn translate(status: TransportStatus, engine_status: i32) -> ErrorCode {
    match status {
        TransportStatus::Ok => get_client_error(storage_error(engine_status)),
        TransportStatus::Other(code) => {
            error!(transport_status = code, "unclassified transport status");
            ErrorCode::Unknown
        }
        status => get_client_error(status.code()),
    }
}

/// Static message for a client code.
pub fn error_message(code: ErrorCode) -> &'static str {
    TABLES.client.get(&code.code()).map_or("unknown error", |&(_, message)| message)
}
