// src/webhook/server.rs
//
// The receiver's listener, router, and handler set (spec §4.1), generalizing
// this codebase's `main.rs` router assembly (AppState + `Router::new()...`)
// and `health_handler` to the webhook domain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing::{info, warn};

use crate::config::ReceiverConfig;
use crate::error::ApiError;
use crate::webhook::event::{EventChannel, WebhookEvent};
use crate::webhook::hmac;
use crate::webhook::stats::{ReceiverStats, TunnelStatus};
use crate::webhook::tunnel::Tunnel;

/// Name of the header carrying the HMAC-SHA256 signature of the raw body.
pub const SIGNATURE_HEADER: &str = "x-nylas-signature";

/// Upper bound on the ingest endpoint's request body (spec §4.1: "reads the
/// full body (bounded)").
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Deadline by which the tunnel supervisor must have discovered a public URL
/// (spec §4.2 step 4: "derived from the context").
const TUNNEL_START_DEADLINE: Duration = Duration::from_secs(30);

/// Bound the server's graceful-shutdown drain (spec §4.1, §5).
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// A registered event handler (spec §4.1: "schedules each registered handler
/// to run concurrently with the event as argument; handler errors are
/// swallowed").
pub type Handler = Arc<dyn Fn(WebhookEvent) -> BoxFuture<'static, ()> + Send + Sync>;

struct Inner {
    config: ReceiverConfig,
    stats: StdRwLock<ReceiverStats>,
    handlers: StdRwLock<Vec<Handler>>,
    events: EventChannel,
}

/// The running webhook receiver. Constructed by [`Receiver::start`], torn
/// down by [`Receiver::stop`].
pub struct Receiver {
    inner: Arc<Inner>,
    tunnel: Option<Arc<dyn Tunnel>>,
    shutdown: AsyncMutex<Option<oneshot::Sender<()>>>,
    server_task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Receiver {
    /// Bind the listener, optionally start the tunnel, and serve until
    /// [`Receiver::stop`] is called. Returns the receiver handle plus the
    /// consumer side of the best-effort event channel (spec §5).
    pub async fn start(
        config: ReceiverConfig,
        tunnel: Option<Arc<dyn Tunnel>>,
    ) -> anyhow::Result<(Self, mpsc::Receiver<WebhookEvent>)> {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let local_addr = listener.local_addr()?;
        let local_url = format!("http://{local_addr}{}", config.endpoint_path);

        let (events, event_rx) = EventChannel::new();
        let inner = Arc::new(Inner {
            config: config.clone(),
            stats: StdRwLock::new(ReceiverStats::new(local_url.clone())),
            handlers: StdRwLock::new(Vec::new()),
            events,
        });

        if let Some(tunnel) = &tunnel {
            match tunnel.start(local_addr.port(), TUNNEL_START_DEADLINE).await {
                Ok(public_base) => {
                    let public_url =
                        format!("{}{}", public_base.trim_end_matches('/'), config.endpoint_path);
                    info!(%public_url, "tunnel ready");
                    let mut stats = inner.stats.write().unwrap();
                    stats.public_url = Some(public_url);
                    stats.tunnel_status = TunnelStatus::Running;
                }
                Err(e) => {
                    // Tunnel start failure ⇒ receiver is stopped and the
                    // error is propagated (spec §4.1 Failure semantics).
                    warn!("tunnel failed to start: {e}");
                    return Err(e);
                }
            }
        }

        let app = build_router(inner.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let server_task = tokio::spawn(async move {
            let graceful = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
            {
                tracing::error!("webhook server error: {e}");
            }
        });

        info!(local_url = %local_url, "webhook receiver listening");

        Ok((
            Self {
                inner,
                tunnel,
                shutdown: AsyncMutex::new(Some(shutdown_tx)),
                server_task: AsyncMutex::new(Some(server_task)),
                stopped: AtomicBool::new(false),
            },
            event_rx,
        ))
    }

    /// Register a handler to be invoked, fire-and-forget, for every accepted
    /// event (spec §4.1, §5).
    pub fn register_handler(&self, handler: Handler) {
        self.inner.handlers.write().unwrap().push(handler);
    }

    pub fn stats(&self) -> ReceiverStats {
        self.inner.stats.read().unwrap().clone()
    }

    /// Idempotent: stops the tunnel first, then gracefully shuts down HTTP
    /// with a 5-second drain deadline (spec §5, §8 invariant 6). A second
    /// call is a no-op that returns `Ok(())`.
    pub async fn stop(&self) -> anyhow::Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(tunnel) = &self.tunnel {
            if let Err(e) = tunnel.stop().await {
                warn!("tunnel stop failed: {e}");
            }
        }

        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.server_task.lock().await.take() {
            if tokio::time::timeout(SHUTDOWN_DRAIN, task).await.is_err() {
                warn!("webhook server did not drain within the shutdown deadline");
            }
        }

        Ok(())
    }
}

fn build_router(inner: Arc<Inner>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(index_handler))
        .route(inner.config.endpoint_path.as_str(), any(endpoint_handler))
        .fallback(not_found)
        .layer(tower_http::timeout::TimeoutLayer::new(Duration::from_secs(30)))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(inner)
}

// ─── Ingest / challenge endpoint ────────────────────────────────────────────

async fn endpoint_handler(
    State(inner): State<Arc<Inner>>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match method {
        Method::POST => ingest(inner, headers, body).await.into_response(),
        Method::GET => match params.get("challenge") {
            Some(token) => (StatusCode::OK, token.clone()).into_response(),
            None => ApiError::bad_request("missing 'challenge' query parameter").into_response(),
        },
        other => ApiError::method_not_allowed(other.as_str()).into_response(),
    }
}

async fn ingest(inner: Arc<Inner>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let raw_body = body.to_vec();

    let mut header_map = HashMap::with_capacity(headers.len());
    let mut signature = None;
    for (name, value) in headers.iter() {
        let name_lower = name.as_str().to_ascii_lowercase();
        if let Ok(value_str) = value.to_str() {
            if name_lower == SIGNATURE_HEADER {
                signature = Some(value_str.to_string());
            }
            header_map.insert(name_lower, value_str.to_string());
        }
    }

    let verified = hmac::verify(&inner.config.secret, &raw_body, signature.as_deref());
    let event = WebhookEvent::from_request(header_map, signature, verified, raw_body);

    {
        let mut stats = inner.stats.write().unwrap();
        stats.record_event();
    }

    inner.events.try_send(event.clone());

    let handlers = inner.handlers.read().unwrap().clone();
    for handler in handlers {
        let event = event.clone();
        tokio::spawn(async move {
            handler(event).await;
        });
    }

    Json(serde_json::json!({ "status": "received" }))
}

// ─── Status endpoints ───────────────────────────────────────────────────────

async fn health_handler(State(inner): State<Arc<Inner>>) -> impl IntoResponse {
    let snapshot = inner.stats.read().unwrap().snapshot();
    Json(snapshot)
}

async fn index_handler(State(inner): State<Arc<Inner>>) -> impl IntoResponse {
    let snapshot = inner.stats.read().unwrap().snapshot();
    Html(format!(
        "<html><head><title>inboxctl webhook receiver</title></head><body>\
         <h1>inboxctl webhook receiver</h1>\
         <ul>\
         <li>events received: {}</li>\
         <li>started at: {}</li>\
         <li>local URL: {}</li>\
         <li>public URL: {}</li>\
         <li>tunnel status: {:?}</li>\
         </ul></body></html>",
        snapshot.events_received,
        snapshot.started_at,
        snapshot.local_url,
        snapshot.public_url.as_deref().unwrap_or("(none)"),
        snapshot.tunnel_status,
    ))
}

async fn not_found(uri: Uri) -> Response {
    ApiError::route_not_found(uri.path()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::tunnel::FakeTunnel;
    use std::sync::atomic::AtomicUsize;

    fn test_config() -> ReceiverConfig {
        ReceiverConfig {
            port: 0,
            endpoint_path: "/webhook".to_string(),
            secret: b"s3cret".to_vec(),
            tunnel_provider: None,
        }
    }

    #[tokio::test]
    async fn start_and_stop_is_idempotent() {
        let (receiver, _rx) = Receiver::start(test_config(), None).await.unwrap();
        receiver.stop().await.unwrap();
        receiver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn challenge_roundtrip_over_real_http() {
        let (receiver, _rx) = Receiver::start(test_config(), None).await.unwrap();
        let local_url = receiver.stats().local_url.clone();

        let client = reqwest::Client::new();
        let resp = client
            .get(format!("{local_url}?challenge=abc123"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "abc123");

        receiver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn ingest_verifies_signature_and_counts_event() {
        let (receiver, _rx) = Receiver::start(test_config(), None).await.unwrap();
        let local_url = receiver.stats().local_url.clone();

        let body = br#"{"id":"evt_1","type":"message.created"}"#;
        let sig = crate::webhook::hmac::hex_digest(b"s3cret", body);

        let client = reqwest::Client::new();
        let resp = client
            .post(&local_url)
            .header(SIGNATURE_HEADER, sig)
            .body(body.to_vec())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        assert_eq!(receiver.stats().events_received, 1);

        receiver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_method_is_405() {
        let (receiver, _rx) = Receiver::start(test_config(), None).await.unwrap();
        let local_url = receiver.stats().local_url.clone();

        let client = reqwest::Client::new();
        let resp = client.delete(&local_url).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        receiver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let (receiver, _rx) = Receiver::start(test_config(), None).await.unwrap();
        let base = receiver.stats().local_url.replace("/webhook", "");

        let client = reqwest::Client::new();
        let resp = client.get(format!("{base}/nope")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        receiver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn handler_runs_for_each_accepted_event() {
        let (receiver, _rx) = Receiver::start(test_config(), None).await.unwrap();
        let local_url = receiver.stats().local_url.clone();

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        receiver.register_handler(Arc::new(move |_event| {
            let counter = counter_clone.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));

        let body = br#"{"id":"evt_1"}"#;
        let sig = crate::webhook::hmac::hex_digest(b"s3cret", body);
        let client = reqwest::Client::new();
        client
            .post(&local_url)
            .header(SIGNATURE_HEADER, sig)
            .body(body.to_vec())
            .send()
            .await
            .unwrap();

        // Handlers run fire-and-forget; give the spawned task a moment.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        receiver.stop().await.unwrap();
    }

    #[tokio::test]
    async fn tunnel_start_failure_propagates_and_stops_receiver() {
        struct FailingTunnel;
        #[async_trait::async_trait]
        impl Tunnel for FailingTunnel {
            async fn start(
                &self,
                _local_port: u16,
                _deadline: Duration,
            ) -> anyhow::Result<String> {
                anyhow::bail!("boom")
            }
            async fn stop(&self) -> anyhow::Result<()> {
                Ok(())
            }
            async fn status(&self) -> TunnelStatus {
                TunnelStatus::Failed
            }
        }

        let result = Receiver::start(test_config(), Some(Arc::new(FailingTunnel))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tunnel_public_url_has_endpoint_path_appended_once() {
        let tunnel = Arc::new(FakeTunnel::new("https://fake.trycloudflare.com"));
        let (receiver, _rx) = Receiver::start(test_config(), Some(tunnel)).await.unwrap();

        let public_url = receiver.stats().public_url.unwrap();
        assert_eq!(public_url, "https://fake.trycloudflare.com/webhook");

        receiver.stop().await.unwrap();
    }
}
