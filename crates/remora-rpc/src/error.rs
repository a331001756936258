//! # Design
//!
//! - One failure taxonomy for every RPC: decode, protocol, HTTP, transport.
//! - Keep `Display` messages constant; [`RpcError::user_message`] renders the
//!   text shown to users.
//! - Integer status codes mirror the legacy dispatch convention so callers
//!   that log or persist raw codes keep working.

use thiserror::Error;

use crate::response::RpcResponse;

/// Status reported for a request that completed and succeeded.
pub const STATUS_OK: i64 = 0;
/// Sentinel status for a response body that was not valid JSON.
pub const FAIL_JSON_DECODE: i64 = -2;
/// Sentinel status for a well-formed response whose `result` is not `success`.
pub const FAIL_RESPONSE_UNSUCCESSFUL: i64 = -3;
/// HTTP failures are encoded as `-(code + 100)`, so every one is at most this value.
pub const HTTP_STATUS_BASE: i64 = -100;

const NO_RESULT_MESSAGE: &str = "Server responded, but with no result.";

/// Convenience alias for RPC results.
pub type RpcResult<T> = Result<T, RpcError>;

/// Lower-level transport failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Host name could not be resolved.
    Resolve,
    /// TCP/TLS connection could not be established.
    Connect,
    /// The request exceeded the configured timeout.
    Timeout,
    /// Any other send/receive failure.
    Other,
}

impl TransportErrorKind {
    /// Raw transport code recorded for this kind.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Resolve => 6,
            Self::Connect => 7,
            Self::Timeout => 28,
            Self::Other => 56,
        }
    }

    /// Map a raw transport code back to a kind.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            6 => Self::Resolve,
            7 => Self::Connect,
            28 => Self::Timeout,
            _ => Self::Other,
        }
    }

    /// Default description used when the transport supplied none.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Resolve => "Couldn't resolve host name",
            Self::Connect => "Couldn't connect to server",
            Self::Timeout => "Timeout was reached",
            Self::Other => "Failure when receiving data from the peer",
        }
    }
}

/// Failure returned by a transport dispatch.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Response body was not valid JSON (or not a JSON-RPC envelope).
    #[error("response decode failed")]
    Decode {
        /// Underlying decode failure, when one was observed.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// Valid envelope, but the daemon reported a failure.
    #[error("daemon reported failure")]
    Protocol {
        /// Daemon-supplied `result` string, if any.
        message: Option<String>,
    },
    /// The HTTP exchange completed with a non-success status.
    #[error("request failed with http status")]
    Http {
        /// HTTP status code.
        code: u16,
    },
    /// DNS, connect, timeout or I/O failure below HTTP.
    #[error("transport failure")]
    Transport {
        /// Failure category.
        kind: TransportErrorKind,
        /// Transport-provided description.
        message: String,
    },
}

impl RpcError {
    /// Construct a transport error using the kind's default description.
    #[must_use]
    pub fn transport(kind: TransportErrorKind) -> Self {
        Self::Transport {
            kind,
            message: kind.description().to_string(),
        }
    }

    /// Human-readable message presented to users.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Decode { .. } => "JSON decoding error.".to_string(),
            Self::Protocol { message } => message
                .clone()
                .unwrap_or_else(|| NO_RESULT_MESSAGE.to_string()),
            Self::Http { code } => format!("Request failed with HTTP code {code}"),
            Self::Transport { message, .. } => message.clone(),
        }
    }

    /// Integer status following the legacy dispatch convention.
    #[must_use]
    pub fn status_code(&self) -> i64 {
        match self {
            Self::Decode { .. } => FAIL_JSON_DECODE,
            Self::Protocol { .. } => FAIL_RESPONSE_UNSUCCESSFUL,
            Self::Http { code } => -(i64::from(*code) + 100),
            Self::Transport { kind, .. } => kind.code(),
        }
    }

    /// Rebuild an error from a raw status and the (possibly absent) response.
    ///
    /// Returns `None` for [`STATUS_OK`].
    #[must_use]
    pub fn from_status(status: i64, response: Option<&RpcResponse>) -> Option<Self> {
        match status {
            STATUS_OK => None,
            FAIL_JSON_DECODE => Some(Self::Decode { source: None }),
            FAIL_RESPONSE_UNSUCCESSFUL => Some(Self::Protocol {
                message: response.and_then(|r| r.result.clone()),
            }),
            code if code <= HTTP_STATUS_BASE => Some(Self::Http {
                code: u16::try_from(http_code_from_status(code)).unwrap_or(u16::MAX),
            }),
            code => Some(Self::transport(TransportErrorKind::from_code(code))),
        }
    }
}

/// Recover the HTTP code from an encoded status (`-(status + 100)`).
#[must_use]
pub const fn http_code_from_status(status: i64) -> i64 {
    -(status + 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_per_category() {
        assert_eq!(
            RpcError::Decode { source: None }.user_message(),
            "JSON decoding error."
        );
        assert_eq!(
            RpcError::Protocol {
                message: Some("duplicate torrent".into())
            }
            .user_message(),
            "duplicate torrent"
        );
        assert_eq!(
            RpcError::Protocol { message: None }.user_message(),
            NO_RESULT_MESSAGE
        );
        assert_eq!(
            RpcError::Http { code: 401 }.user_message(),
            "Request failed with HTTP code 401"
        );
        assert_eq!(
            RpcError::transport(TransportErrorKind::Timeout).user_message(),
            "Timeout was reached"
        );
    }

    #[test]
    fn status_codes_follow_convention() {
        assert_eq!(RpcError::Http { code: 404 }.status_code(), -504);
        assert_eq!(http_code_from_status(-504), 404);
        assert_eq!(
            RpcError::Decode { source: None }.status_code(),
            FAIL_JSON_DECODE
        );
        assert_eq!(
            RpcError::Protocol { message: None }.status_code(),
            FAIL_RESPONSE_UNSUCCESSFUL
        );
        assert_eq!(
            RpcError::transport(TransportErrorKind::Connect).status_code(),
            7
        );
    }

    #[test]
    fn from_status_restores_category() {
        assert!(RpcError::from_status(STATUS_OK, None).is_none());
        assert!(matches!(
            RpcError::from_status(-601, None),
            Some(RpcError::Http { code: 501 })
        ));
        assert!(matches!(
            RpcError::from_status(28, None),
            Some(RpcError::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            })
        ));

        let response = RpcResponse {
            result: Some("no such torrent".into()),
            ..RpcResponse::default()
        };
        let restored = RpcError::from_status(FAIL_RESPONSE_UNSUCCESSFUL, Some(&response));
        assert_eq!(
            restored.map(|err| err.user_message()),
            Some("no such torrent".to_string())
        );
    }
}
