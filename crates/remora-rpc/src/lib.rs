#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]

//! JSON-RPC transport for the remote torrent daemon.
//!
//! Layout: `request.rs` (method builders), `response.rs` (envelope),
//! `error.rs` (failure taxonomy and status codes), `transport.rs` (the
//! `Transport` trait), `http.rs` (reqwest implementation).

pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod transport;

pub use error::{
    FAIL_JSON_DECODE, FAIL_RESPONSE_UNSUCCESSFUL, HTTP_STATUS_BASE, RpcError, RpcResult,
    STATUS_OK, TransportErrorKind, http_code_from_status,
};
pub use http::{HttpTransport, HttpTransportConfig, SESSION_ID_HEADER};
pub use request::{RpcRequest, TORRENT_FIELDS, methods};
pub use response::{RESULT_SUCCESS, RpcResponse};
pub use transport::Transport;

pub use reqwest::Url;
