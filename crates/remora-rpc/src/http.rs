//! reqwest-backed HTTP transport.
//!
//! Requests are POSTed as JSON to a single RPC endpoint. The daemon guards
//! against CSRF with a session id: a `409 Conflict` carries the id in
//! [`SESSION_ID_HEADER`], after which the request is retried once and the id
//! is sent on every later call.

use std::error::Error as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::error::{RpcError, RpcResult, TransportErrorKind};
use crate::request::RpcRequest;
use crate::response::RpcResponse;
use crate::transport::Transport;

/// Header carrying the daemon's anti-CSRF session id.
pub const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Connection parameters for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Full RPC endpoint URL.
    pub endpoint: Url,
    /// Basic-auth user name.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// HTTP implementation of [`Transport`].
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
    session_id: Mutex<Option<String>>,
    next_tag: AtomicU64,
}

impl HttpTransport {
    /// Build a transport with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be constructed.
    pub fn new(config: HttpTransportConfig) -> RpcResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| classify_reqwest(&err))?;
        Ok(Self {
            client,
            config,
            session_id: Mutex::new(None),
            next_tag: AtomicU64::new(1),
        })
    }

    /// Endpoint this transport talks to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.config.endpoint
    }

    /// Session id most recently handed out by the daemon.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn send(&self, request: &RpcRequest) -> RpcResult<reqwest::Response> {
        let mut builder = self.client.post(self.config.endpoint.clone()).json(request);
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }
        if let Some(id) = self.session_id() {
            builder = builder.header(SESSION_ID_HEADER, id);
        }
        builder.send().await.map_err(|err| classify_reqwest(&err))
    }

    fn remember_session_id(&self, response: &reqwest::Response) -> bool {
        let Some(id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return false;
        };
        debug!(session_id = %id, "daemon issued new session id");
        *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(id.to_string());
        true
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(&self, mut request: RpcRequest) -> RpcResult<RpcResponse> {
        request.tag = Some(self.next_tag.fetch_add(1, Ordering::Relaxed));

        let mut response = self.send(&request).await?;
        if response.status() == StatusCode::CONFLICT && self.remember_session_id(&response) {
            response = self.send(&request).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Http {
                code: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|err| classify_reqwest(&err))?;
        let decoded: RpcResponse = serde_json::from_slice(&bytes)
            .map_err(|source| RpcError::Decode {
                source: Some(source),
            })?;

        if decoded.is_success() {
            Ok(decoded)
        } else {
            Err(RpcError::Protocol {
                message: decoded.result,
            })
        }
    }
}

fn classify_reqwest(err: &reqwest::Error) -> RpcError {
    let message = error_chain(err);
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        if message.to_ascii_lowercase().contains("dns") {
            TransportErrorKind::Resolve
        } else {
            TransportErrorKind::Connect
        }
    } else {
        TransportErrorKind::Other
    };
    RpcError::Transport { kind, message }
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
