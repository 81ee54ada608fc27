// src/mcp/mutator.rs
//
// Pure byte-to-byte transforms applied to requests before they leave for
// upstream, and to responses before they reach the client (spec §4.5, §4.7).
// Each function operates on a full JSON `Value` rather than the narrower
// [`crate::mcp::rpc::RpcMessage`] so that fields the proxy doesn't model are
// preserved exactly, per spec §3 invariant: "all other fields preserved."

use serde_json::Value;

/// Tool names that accept a root-level `grant_id` (spec §6.5). Utility tools
/// and tools where the grant id is nested elsewhere are deliberately
/// excluded.
pub const TOOLS_REQUIRING_GRANT: &[&str] = &[
    "get_grant",
    "list_calendars",
    "list_events",
    "create_event",
    "update_event",
    "list_messages",
    "list_threads",
    "get_folder_by_id",
    "create_draft",
    "update_draft",
    "send_draft",
    "send_message",
];

fn tool_name(request: &Value) -> Option<&str> {
    request.get("params")?.get("name")?.as_str()
}

/// Inject `arguments.grant_id = default_grant` into `tools/call` requests
/// whose tool is in [`TOOLS_REQUIRING_GRANT`] and whose arguments carry
/// neither `grant_id` nor `identifier` (spec §4.5, §8 invariants 2–3).
///
/// Returns the original bytes unchanged if the line doesn't parse as JSON,
/// doesn't need mutation, or re-serialization fails.
pub fn mutate_request(line: &str, default_grant: Option<&str>) -> String {
    let Some(default_grant) = default_grant else {
        return line.to_string();
    };

    let Ok(mut request) = serde_json::from_str::<Value>(line) else {
        return line.to_string();
    };

    if request.get("method").and_then(|m| m.as_str()) != Some("tools/call") {
        return line.to_string();
    }

    let Some(name) = tool_name(&request) else {
        return line.to_string();
    };
    if !TOOLS_REQUIRING_GRANT.contains(&name) {
        return line.to_string();
    }

    let Some(params) = request.get_mut("params") else {
        return line.to_string();
    };
    if !params.get("arguments").map(Value::is_object).unwrap_or(false) {
        // No arguments object to inject into; leave as-is rather than
        // fabricate one outside the documented contract.
        return line.to_string();
    }
    let arguments = params.get_mut("arguments").unwrap().as_object_mut().unwrap();

    if arguments.contains_key("grant_id") || arguments.contains_key("identifier") {
        return line.to_string();
    }

    arguments.insert("grant_id".to_string(), Value::String(default_grant.to_string()));

    serde_json::to_string(&request).unwrap_or_else(|_| line.to_string())
}

/// `tools/list` response mutation (spec §4.7): strip `email` from
/// `get_grant`'s `inputSchema.required` and append a sentence to its
/// description. Invalid JSON passes through unchanged.
pub fn mutate_tools_list_response(body: &[u8]) -> Vec<u8> {
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return body.to_vec();
    };

    if let Some(tools) = value
        .pointer_mut("/result/tools")
        .and_then(|t| t.as_array_mut())
    {
        for tool in tools.iter_mut() {
            if tool.get("name").and_then(|n| n.as_str()) != Some("get_grant") {
                continue;
            }

            if let Some(required) = tool.pointer_mut("/inputSchema/required").and_then(|r| r.as_array_mut()) {
                required.retain(|v| v.as_str() != Some("email"));
            }

            if let Some(description) = tool.get_mut("description").and_then(|d| d.as_str().map(str::to_string)) {
                let updated = format!(
                    "{description} When email is omitted, the default authenticated grant is returned."
                );
                tool["description"] = Value::String(updated);
            }
        }
    }

    serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec())
}

/// Guidance block appended to `initialize` responses (spec §4.7). The
/// literal wording must contain "Timezone Consistency" and
/// "epoch_to_datetime" so clients and tests can detect its presence.
fn timezone_guidance(zone_name: &str) -> String {
    format!(
        "\n\n## Timezone Consistency\n\
         The local system timezone is {zone_name}. When converting timestamps, \
         always use the epoch_to_datetime tool with this timezone. Always \
         display times to the user in {zone_name}, not UTC."
    )
}

/// `initialize` response mutation (spec §4.7): append the timezone guidance
/// block to `result.instructions`. Invalid JSON passes through unchanged.
pub fn mutate_initialize_response(body: &[u8], zone_name: &str) -> Vec<u8> {
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return body.to_vec();
    };

    let guidance = timezone_guidance(zone_name);
    match value.pointer_mut("/result/instructions") {
        Some(instructions) if instructions.is_string() => {
            let current = instructions.as_str().unwrap_or_default();
            *instructions = Value::String(format!("{current}{guidance}"));
        }
        _ => {
            if let Some(result) = value.get_mut("result").and_then(|r| r.as_object_mut()) {
                result.insert("instructions".to_string(), Value::String(guidance));
            }
        }
    }

    serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec())
}
