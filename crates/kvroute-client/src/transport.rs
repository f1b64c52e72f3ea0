//! Transport contract and the dispatch step shared by every operation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use kvroute_core::format::{decode_frame, encode_frame, FrameKind};
use kvroute_core::message::{PartitionConfigResponse, QueryPartitionConfig, Request, Response};
use kvroute_core::{translate, ClientError, ClientResult, ErrorCode, PartitionHash, TransportStatus};

/// Status plus raw payload of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: TransportStatus,
    pub payload: Vec<u8>,
}

impl TransportReply {
    pub fn ok(payload: Vec<u8>) -> Self {
        Self { status: TransportStatus::Ok, payload }
    }

    pub fn failed(status: TransportStatus) -> Self {
        Self { status, payload: Vec::new() }
    }
}

/// The RPC layer as seen by the client.
///
/// Connection management, wire retries and replica resolution all live behind
/// this trait. Implementations must honor `timeout` and report
/// [`TransportStatus::Timeout`] when it expires.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request frame to the partition selected by `partition_hash`.
    async fn call(&self, partition_hash: PartitionHash, request: Vec<u8>, timeout: Duration) -> TransportReply;

    /// Send a request frame to the meta service.
    async fn call_meta(&self, request: Vec<u8>, timeout: Duration) -> TransportReply;
}

/// Encode, send, bound by `timeout`, and decode one partition request.
///
/// Fails only on transport-level problems; the engine status inside the
/// response is left for the caller to translate alongside its payload.
pub(crate) async fn round_trip(
    transport: &Arc<dyn Transport>,
    partition_hash: PartitionHash,
    request: &Request,
    timeout: Duration,
) -> ClientResult<Response> {
    let op = request.name();
    let frame = encode_frame(FrameKind::Request, request).map_err(|e| {
        error!(op, error = %e, "failed to encode request");
        ClientError::new(ErrorCode::Unknown)
    })?;

    debug!(op, partition_hash, bytes = frame.len(), "dispatching request");
    let reply = match tokio::time::timeout(timeout, transport.call(partition_hash, frame, timeout)).await {
        Ok(reply) => reply,
        Err(_) => TransportReply::failed(TransportStatus::Timeout),
    };
    if !reply.status.is_ok() {
        return Err(ClientError::new(translate(reply.status, 0)));
    }

    decode_frame(FrameKind::Response, &reply.payload).map_err(|e| {
        error!(op, error = %e, "undecodable response");
        ClientError::new(ErrorCode::Unknown)
    })
}

/// Ask the meta service how the app is partitioned.
pub(crate) async fn query_partition_config(
    transport: &Arc<dyn Transport>,
    app_name: &str,
    timeout: Duration,
) -> ClientResult<PartitionConfigResponse> {
    let request = QueryPartitionConfig { app_name: app_name.to_string() };
    let frame = encode_frame(FrameKind::MetaRequest, &request).map_err(|e| {
        error!(app_name, error = %e, "failed to encode partition config query");
        ClientError::new(ErrorCode::Unknown)
    })?;

    let reply = match tokio::time::timeout(timeout, transport.call_meta(frame, timeout)).await {
        Ok(reply) => reply,
        Err(_) => TransportReply::failed(TransportStatus::Timeout),
    };
    if !reply.status.is_ok() {
        return Err(ClientError::new(translate(reply.status, 0)));
    }

    let response: PartitionConfigResponse = decode_frame(FrameKind::MetaResponse, &reply.payload).map_err(|e| {
        error!(app_name, error = %e, "undecodable partition config response");
        ClientError::new(ErrorCode::Unknown)
    })?;

    // The meta service answers with its own transport-level status
    let code = translate(TransportStatus::from_code(response.err), 0);
    if !code.is_ok() {
        return Err(ClientError::new(code));
    }
    Ok(response)
}

/// Turn an engine status plus payload into the caller's result.
pub(crate) fn complete<T>(
    code: ErrorCode,
    value: T,
    info: kvroute_core::InternalInfo,
) -> ClientResult<kvroute_core::Reply<T>> {
    if code.is_ok() {
        Ok(kvroute_core::Reply::new(value, info))
    } else {
        Err(ClientError::with_info(code, info))
    }
}

/// A response variant that does not match the request.
pub(crate) fn unexpected(op: &'static str, response: &Response) -> ClientError {
    error!(op, response = ?std::mem::discriminant(response), "unexpected response variant");
    ClientError::with_info(ErrorCode::Unknown, response.served_by().read_info())
}
