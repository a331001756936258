//! JSON-RPC response envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value of `result` for a successful call.
pub const RESULT_SUCCESS: &str = "success";

/// Envelope returned by the daemon: `{result, arguments, tag}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// `"success"` or a daemon error string.
    #[serde(default)]
    pub result: Option<String>,
    /// Method-specific payload.
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Echo of the request tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<u64>,
}

impl RpcResponse {
    /// Build a successful response around `arguments`.
    #[must_use]
    pub fn success(arguments: Map<String, Value>) -> Self {
        Self {
            result: Some(RESULT_SUCCESS.to_string()),
            arguments,
            tag: None,
        }
    }

    /// Whether the daemon reported success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.as_deref() == Some(RESULT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_envelope_without_arguments() -> anyhow::Result<()> {
        let response: RpcResponse = serde_json::from_value(json!({"result": "success"}))?;
        assert!(response.is_success());
        assert!(response.arguments.is_empty());
        Ok(())
    }

    #[test]
    fn failure_result_is_not_success() -> anyhow::Result<()> {
        let response: RpcResponse =
            serde_json::from_value(json!({"result": "invalid argument", "arguments": {}}))?;
        assert!(!response.is_success());
        Ok(())
    }
}
