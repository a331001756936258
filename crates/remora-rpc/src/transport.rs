//! Transport contract consumed by the client core.

use async_trait::async_trait;

use crate::error::RpcResult;
use crate::request::RpcRequest;
use crate::response::RpcResponse;

/// Issues JSON-RPC requests against the daemon.
///
/// Implementations classify every failure into [`crate::RpcError`]; a daemon
/// `result` other than `success` is returned as `RpcError::Protocol`, so an
/// `Ok` value is always a successful envelope.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and wait for the decoded response.
    async fn dispatch(&self, request: RpcRequest) -> RpcResult<RpcResponse>;
}
