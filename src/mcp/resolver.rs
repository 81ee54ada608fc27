// src/mcp/resolver.rs
//
// Local short-circuit for `get_grant` tool calls (spec §4.4). Returning
// `Some(response)` means the proxy writes it straight to stdout without
// contacting upstream; `None` means "not handled, defer to upstream" —
// collapsing the spec's `(response, handled)` pair into one `Option`.

use serde_json::{json, Value};

use crate::grant::GrantLookup;
use crate::mcp::rpc::{self, RpcMessage};

const LOGIN_HINT: &str = "No authenticated grants found. Please run 'inboxctl login' first.";

pub fn resolve(msg: &RpcMessage, grant_store: Option<&dyn GrantLookup>) -> Option<Value> {
    let store = grant_store?;

    if !msg.is_tools_call() || msg.tool_name() != Some("get_grant") {
        return None;
    }

    if let Some(email) = msg
        .arguments()
        .and_then(|a| a.get("email"))
        .and_then(|v| v.as_str())
    {
        if !email.is_empty() {
            return None;
        }
    }

    let grant = store
        .get_default()
        .and_then(|id| store.get_by_id(&id))
        .or_else(|| store.list_all().into_iter().next());

    Some(match grant {
        Some(grant) => {
            let payload = json!({
                "grant_id": grant.id,
                "email": grant.email,
                "provider": grant.provider,
            });
            rpc::tool_success(&msg.id, &payload)
        }
        None => rpc::tool_error(&msg.id, LOGIN_HINT),
    })
}
