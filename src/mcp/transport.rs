// src/mcp/transport.rs
//
// The upstream HTTPS leg of the bridge (spec §4.6, §6.3, §6.4): region
// selection, header construction, the POST itself, and SSE response framing.
// The HTTP client usage (reqwest::Client, per-request timeout, header
// construction) follows this codebase's `webhook.rs::deliver`, which is the
// only outbound-HTTP precedent in the codebase.

use std::time::Duration;

use reqwest::Client;

use crate::error::ProxyError;
use crate::mcp::session::SessionState;

const US_ENDPOINT: &str = "https://mcp.us.nylas.com";
const EU_ENDPOINT: &str = "https://mcp.eu.nylas.com";

/// Header the upstream uses to issue and expect an echoed session token
/// (spec §6.3: "a fixed string of the form `Mcp-Session-Id` semantically").
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Header carrying the default grant, when configured (spec §4.5: "If
/// default grant is non-empty, set the grant header").
pub const GRANT_HEADER: &str = "X-Nylas-Grant-Id";

/// Fixed per-call upstream timeout (spec §5: "a single configured
/// duration").
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Region tag → upstream endpoint, a total function (spec §6.4, §8
/// invariant 1).
pub fn endpoint_for_region(region: &str) -> &'static str {
    if region.eq_ignore_ascii_case("eu") {
        EU_ENDPOINT
    } else {
        US_ENDPOINT
    }
}

/// Outcome of an upstream round-trip: a response body to write to stdout, or
/// nothing (202, or zero SSE payloads).
pub type TransportResult = Result<Option<Vec<u8>>, ProxyError>;

/// POST `body` to `endpoint` with the headers required by spec §4.5,
/// capture any session header on the response, and frame the response body
/// per §4.6 (spec §4.6 steps 1–6). Callers resolve the endpoint from the
/// region tag via [`endpoint_for_region`] — kept as a separate step so tests
/// can point this at a mock server.
pub async fn send(
    client: &Client,
    endpoint: &str,
    bearer_token: &str,
    session: &SessionState,
    body: Vec<u8>,
) -> TransportResult {
    let mut request = client
        .post(endpoint)
        .timeout(REQUEST_TIMEOUT)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json, text/event-stream")
        .header("Authorization", format!("Bearer {bearer_token}"))
        .body(body);

    if let Some(token) = session.session_token().await {
        request = request.header(SESSION_HEADER, token);
    }
    if let Some(grant) = session.default_grant().await {
        request = request.header(GRANT_HEADER, grant);
    }

    let response = request.send().await?;

    if let Some(value) = response.headers().get(SESSION_HEADER) {
        if let Ok(token) = value.to_str() {
            session.set_session_token(token.to_string()).await;
        }
    }

    let status = response.status();
    if status.as_u16() == 202 {
        return Ok(None);
    }

    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        let body_prefix: String = body_text.chars().take(512).collect();
        return Err(ProxyError::UpstreamStatus {
            status: status.as_u16(),
            body_prefix,
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body_bytes = response.bytes().await?;

    if content_type.starts_with("text/event-stream") {
        let text = String::from_utf8_lossy(&body_bytes);
        Ok(frame_sse(&text))
    } else {
        Ok(Some(body_bytes.to_vec()))
    }
}

/// SSE framing (spec §4.6.1, §8 invariant 8): accumulate `data: ` payloads in
/// order; zero ⇒ none, one ⇒ verbatim, more than one ⇒ a JSON array.
pub fn frame_sse(text: &str) -> Option<Vec<u8>> {
    let payloads: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    match payloads.len() {
        0 => None,
        1 => Some(payloads[0].as_bytes().to_vec()),
        _ => {
            let joined = format!("[{}]", payloads.join(","));
            Some(joined.into_bytes())
        }
    }
}
