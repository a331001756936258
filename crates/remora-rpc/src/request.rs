//! JSON-RPC request payloads and builders for the daemon methods the client uses.

use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;
use serde_json::{Map, Value, json};

/// Daemon method names.
pub mod methods {
    /// Fetch session (server) settings.
    pub const SESSION_GET: &str = "session-get";
    /// Update session settings.
    pub const SESSION_SET: &str = "session-set";
    /// Fetch the torrent list.
    pub const TORRENT_GET: &str = "torrent-get";
    /// Start (resume) torrents.
    pub const TORRENT_START: &str = "torrent-start";
    /// Stop (pause) torrents.
    pub const TORRENT_STOP: &str = "torrent-stop";
    /// Verify local data.
    pub const TORRENT_VERIFY: &str = "torrent-verify";
    /// Remove torrents, optionally deleting local data.
    pub const TORRENT_REMOVE: &str = "torrent-remove";
    /// Register a new torrent.
    pub const TORRENT_ADD: &str = "torrent-add";
}

/// Fields requested on every torrent-list poll.
pub const TORRENT_FIELDS: &[&str] = &[
    "id",
    "name",
    "status",
    "rateDownload",
    "rateUpload",
    "percentDone",
    "leftUntilDone",
    "totalSize",
    "sizeWhenDone",
    "eta",
    "errorString",
    "uploadRatio",
    "peersConnected",
    "addedDate",
    "doneDate",
    "downloadDir",
    "hashString",
];

/// A single JSON-RPC call: `{method, arguments, tag}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    /// Daemon method name.
    pub method: String,
    /// Method arguments.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
    /// Correlation tag assigned by the transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<u64>,
}

impl RpcRequest {
    /// Build a request for `method` with no arguments.
    #[must_use]
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            arguments: Map::new(),
            tag: None,
        }
    }

    /// Attach an argument.
    #[must_use]
    pub fn with_argument(mut self, key: &str, value: Value) -> Self {
        self.arguments.insert(key.to_string(), value);
        self
    }

    /// Torrent ids targeted by this request, if any.
    #[must_use]
    pub fn ids(&self) -> Vec<i64> {
        self.arguments
            .get("ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default()
    }
}

/// `session-get`.
#[must_use]
pub fn session_get() -> RpcRequest {
    RpcRequest::new(methods::SESSION_GET)
}

/// `session-set` with the supplied settings.
#[must_use]
pub fn session_set(arguments: Map<String, Value>) -> RpcRequest {
    RpcRequest {
        arguments,
        ..RpcRequest::new(methods::SESSION_SET)
    }
}

/// `torrent-get` for the given field list.
#[must_use]
pub fn torrent_get(fields: &[&str]) -> RpcRequest {
    RpcRequest::new(methods::TORRENT_GET).with_argument("fields", json!(fields))
}

/// `torrent-start` for `ids`.
#[must_use]
pub fn torrent_start(ids: &[i64]) -> RpcRequest {
    with_ids(methods::TORRENT_START, ids)
}

/// `torrent-stop` for `ids`.
#[must_use]
pub fn torrent_stop(ids: &[i64]) -> RpcRequest {
    with_ids(methods::TORRENT_STOP, ids)
}

/// `torrent-verify` for `ids`.
#[must_use]
pub fn torrent_verify(ids: &[i64]) -> RpcRequest {
    with_ids(methods::TORRENT_VERIFY, ids)
}

/// `torrent-remove` for `ids`; `delete_local_data` also purges downloaded files.
#[must_use]
pub fn torrent_remove(ids: &[i64], delete_local_data: bool) -> RpcRequest {
    with_ids(methods::TORRENT_REMOVE, ids)
        .with_argument("delete-local-data", Value::Bool(delete_local_data))
}

/// `torrent-add` carrying raw `.torrent` bytes (sent base64 encoded).
#[must_use]
pub fn torrent_add_metainfo(metainfo: &[u8], paused: bool) -> RpcRequest {
    RpcRequest::new(methods::TORRENT_ADD)
        .with_argument(
            "metainfo",
            Value::String(general_purpose::STANDARD.encode(metainfo)),
        )
        .with_argument("paused", Value::Bool(paused))
}

/// `torrent-add` pointing the daemon at a URL or magnet link.
#[must_use]
pub fn torrent_add_url(url: &str, paused: bool) -> RpcRequest {
    RpcRequest::new(methods::TORRENT_ADD)
        .with_argument("filename", Value::String(url.to_string()))
        .with_argument("paused", Value::Bool(paused))
}

fn with_ids(method: &str, ids: &[i64]) -> RpcRequest {
    RpcRequest::new(method).with_argument("ids", json!(ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_actions_carry_id_array() -> anyhow::Result<()> {
        let request = torrent_stop(&[3, 9]);
        let body = serde_json::to_value(&request)?;
        assert_eq!(body, json!({"method": "torrent-stop", "arguments": {"ids": [3, 9]}}));
        assert_eq!(request.ids(), vec![3, 9]);
        Ok(())
    }

    #[test]
    fn remove_and_delete_differ_only_in_flag() {
        let remove = torrent_remove(&[1], false);
        let delete = torrent_remove(&[1], true);
        assert_eq!(remove.method, delete.method);
        assert_eq!(remove.arguments["ids"], delete.arguments["ids"]);
        assert_eq!(remove.arguments["delete-local-data"], json!(false));
        assert_eq!(delete.arguments["delete-local-data"], json!(true));
    }

    #[test]
    fn metainfo_is_base64_encoded() {
        let request = torrent_add_metainfo(b"d4:infoe", false);
        assert_eq!(request.arguments["metainfo"], json!("ZDQ6aW5mb2U="));
        assert_eq!(request.arguments["paused"], json!(false));
    }

    #[test]
    fn session_get_serializes_without_arguments() -> anyhow::Result<()> {
        let body = serde_json::to_value(session_get())?;
        assert_eq!(body, json!({"method": "session-get"}));
        Ok(())
    }
}
