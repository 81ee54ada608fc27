// src/mcp/rpc.rs
//
// The line-delimited JSON-RPC message shape the proxy parses and the
// response shapes it synthesizes (spec §3 RpcMessage, §6.2 wire protocol).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A single parsed request line (spec §3). Discarded after dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcMessage {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Nullable: number, string, or null — preserved verbatim in responses.
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Option<RpcParams>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RpcParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<serde_json::Map<String, Value>>,
}

impl RpcMessage {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// The tool name of a `tools/call` request, if any.
    pub fn tool_name(&self) -> Option<&str> {
        self.params.as_ref()?.name.as_deref()
    }

    /// The `arguments` object of a `tools/call` request, if any.
    pub fn arguments(&self) -> Option<&serde_json::Map<String, Value>> {
        self.params.as_ref()?.arguments.as_ref()
    }

    pub fn is_tools_call(&self) -> bool {
        self.method == "tools/call"
    }
}

/// JSON-RPC internal error code used throughout the proxy (spec §6.2, §7).
pub const INTERNAL_ERROR_CODE: i32 = -32603;

/// `{"jsonrpc":"2.0","id":<id>,"error":{"code":-32603,"message":"<reason>"}}`
pub fn internal_error(id: &Value, reason: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": INTERNAL_ERROR_CODE, "message": reason },
    })
}

/// The literal fallback used only when synthesizing an error response itself
/// fails to serialize (spec §6.2, §7).
pub fn fallback_error() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": Value::Null,
        "error": { "code": INTERNAL_ERROR_CODE, "message": "internal marshaling error" },
    })
}

/// `{"jsonrpc":"2.0","id":<id>,"result":{"content":[{"type":"text","text":"<json>"}]}}`
pub fn tool_success(id: &Value, payload: &Value) -> Value {
    let text = serde_json::to_string(payload).unwrap_or_default();
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": { "content": [{ "type": "text", "text": text }] },
    })
}

/// Same shape as [`tool_success`] but with `result.isError: true` and plain
/// human-readable text.
pub fn tool_error(id: &Value, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "isError": true,
            "content": [{ "type": "text", "text": message }],
        },
    })
}

/// Serialize `value` to a single line (no embedded newline) ready to write to
/// stdout, or `None` if serialization fails (spec §7: serialization errors
/// are logged and replaced by the fallback-error literal by the caller).
pub fn to_line(value: &Value) -> Option<String> {
    serde_json::to_string(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tools_call_with_name_and_arguments() {
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"list_messages","arguments":{}}}"#;
        let msg = RpcMessage::parse(line).unwrap();
        assert_eq!(msg.method, "tools/call");
        assert!(msg.is_tools_call());
        assert_eq!(msg.tool_name(), Some("list_messages"));
        assert!(msg.arguments().unwrap().is_empty());
    }

    #[test]
    fn preserves_null_and_string_ids() {
        let by_string = RpcMessage::parse(r#"{"jsonrpc":"2.0","id":"abc","method":"tools/call"}"#)
            .unwrap();
        assert_eq!(by_string.id, Value::String("abc".into()));

        let by_null =
            RpcMessage::parse(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert_eq!(by_null.id, Value::Null);
    }

    #[test]
    fn tool_success_shape() {
        let payload = json!({ "grant_id": "g1", "email": "u@x", "provider": "google" });
        let response = tool_success(&json!("abc"), &payload);
        assert_eq!(response["id"], "abc");
        assert_eq!(response["result"]["content"][0]["type"], "text");
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["grant_id"], "g1");
    }

    #[test]
    fn tool_error_sets_is_error() {
        let response = tool_error(&Value::Null, "no grants found");
        assert_eq!(response["result"]["isError"], true);
    }

    #[test]
    fn internal_error_preserves_id() {
        let response = internal_error(&json!(7), "boom");
        assert_eq!(response["id"], 7);
        assert_eq!(response["error"]["code"], -32603);
    }
}
