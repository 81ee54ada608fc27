// src/mcp/proxy.rs
//
// The single-threaded cooperative main loop bridging STDIO to the upstream
// HTTPS endpoint (spec §4.3). Each input line runs to completion — including
// the synchronous HTTP round-trip — before the next is read; the only
// concurrency is handled elsewhere (the webhook receiver's listener tasks).

use std::sync::Arc;

use reqwest::Client;
use serde_json::Value;
use tokio::io::{stdin, stdout, AsyncWriteExt, BufReader};
use tracing::{error, warn};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::grant::GrantLookup;
use crate::mcp::resolver;
use crate::mcp::rpc::{self, RpcMessage};
use crate::mcp::session::SessionState;
use crate::mcp::{mutator, transport};
use crate::util::read_bounded_line;

/// Run the proxy main loop until stdin closes (spec §4.3, §A.4). Blocks the
/// calling task.
pub async fn run(config: ProxyConfig, grant_store: Option<Arc<dyn GrantLookup>>) -> anyhow::Result<()> {
    let session = SessionState::new(config.default_grant.clone(), grant_store.clone());
    let client = Client::new();
    let mut reader = BufReader::new(stdin());
    let mut out = stdout();

    loop {
        let line = match read_bounded_line(&mut reader).await {
            Ok(Some(line)) => line,
            Ok(None) => break, // stdin closed
            Err(e) => {
                error!("stdin read error: {e}");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = process_line(trimmed, &config, &client, &session).await;

        if let Some(value) = response {
            if let Err(e) = write_response(&mut out, &value).await {
                error!("failed writing response to stdout: {e}");
                break; // write errors to stdout are fatal (spec §4.3)
            }
        }
    }

    Ok(())
}

async fn process_line(
    line: &str,
    config: &ProxyConfig,
    client: &Client,
    session: &SessionState,
) -> Option<Value> {
    let parsed = RpcMessage::parse(line);

    let response = match parsed {
        Err(_) => {
            // Parse failure: forward the raw line as-is; upstream owns the
            // error response (spec §4.3 step 4).
            match forward_raw(line, config, client, session).await {
                Ok(Some(body)) => parse_response_value(&body),
                Ok(None) => None,
                Err(e) => Some(rpc::internal_error(&Value::Null, &e.to_string())),
            }
        }
        Ok(msg) => {
            let store_ref = session.grant_store().await;
            if let Some(handled) = resolver::resolve(&msg, store_ref.as_deref()) {
                Some(handled)
            } else {
                dispatch_upstream(&msg, line, config, client, session).await
            }
        }
    };

    response
}

async fn forward_raw(
    line: &str,
    config: &ProxyConfig,
    client: &Client,
    session: &SessionState,
) -> Result<Option<Vec<u8>>, ProxyError> {
    let endpoint = transport::endpoint_for_region(&config.region);
    transport::send(client, endpoint, &config.bearer_token, session, line.as_bytes().to_vec()).await
}

async fn dispatch_upstream(
    msg: &RpcMessage,
    original_line: &str,
    config: &ProxyConfig,
    client: &Client,
    session: &SessionState,
) -> Option<Value> {
    let default_grant = session.default_grant().await;
    let mutated = mutator::mutate_request(original_line, default_grant.as_deref());
    let endpoint = transport::endpoint_for_region(&config.region);

    let result = transport::send(
        client,
        endpoint,
        &config.bearer_token,
        session,
        mutated.into_bytes(),
    )
    .await;

    match result {
        Ok(None) => None,
        Ok(Some(body)) => {
            let body = match msg.method.as_str() {
                "tools/list" => mutator::mutate_tools_list_response(&body),
                "initialize" => {
                    let zone = detect_timezone();
                    mutator::mutate_initialize_response(&body, &zone)
                }
                _ => body,
            };
            Some(parse_response_value(&body).unwrap_or_else(|| {
                warn!("upstream response did not parse as JSON, synthesizing fallback");
                rpc::fallback_error()
            }))
        }
        Err(e) => {
            error!("upstream transport error: {e}");
            Some(rpc::internal_error(&msg.id, &e.to_string()))
        }
    }
}

fn parse_response_value(body: &[u8]) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

async fn write_response(out: &mut (impl AsyncWriteExt + Unpin), value: &Value) -> std::io::Result<()> {
    let line = rpc::to_line(value).unwrap_or_else(|| {
        serde_json::to_string(&rpc::fallback_error()).expect("fallback literal always serializes")
    });
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

/// Detect the host's IANA time zone name, falling back to whatever
/// `iana_time_zone` reports when no canonical name is available (spec
/// §4.7).
fn detect_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}
