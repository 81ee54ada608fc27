// src/webhook/event.rs
//
// The event envelope ingested by the webhook receiver and the best-effort
// observer channel it is fanned out onto (spec §3 WebhookEvent/EventChannel,
// §5 "Event observer channel"). Generalizes this codebase's `EventBus`
// (events.rs) from a broadcast fan-out of internally-generated events to a
// bounded single-consumer channel of externally-received ones.

use std::collections::HashMap;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

/// Capacity of the best-effort observer channel (spec §3, §5).
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// A single received webhook delivery (spec §3).
///
/// Immutable once constructed and handed to the channel/handlers.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// Opaque id from the payload, or empty if the payload didn't carry one.
    pub id: String,
    /// Dotted event type, e.g. `message.created`. Empty if unparseable.
    pub event_type: String,
    /// Event source, e.g. the account/grant that generated it.
    pub source: String,
    /// Server-emission timestamp, if present in the payload.
    pub timestamp: Option<DateTime<Utc>>,
    /// When the receiver accepted the request.
    pub received_at: SystemTime,
    /// Request headers, last-value-wins on duplicates.
    pub headers: HashMap<String, String>,
    /// Raw value of the signature header, if any was present.
    pub signature: Option<String>,
    /// Whether HMAC verification succeeded (spec §3 invariant).
    pub verified: bool,
    /// `data.object.grant_id`, when the payload parsed and carried it.
    pub grant_id: Option<String>,
    /// Parsed JSON body, or `None` if the body did not parse as JSON.
    pub body: Option<Value>,
    /// Exact bytes of the request body, regardless of parse outcome.
    pub raw_body: Vec<u8>,
}

impl WebhookEvent {
    /// Extract `id`, `type`, `source`, `data.object.grant_id` from a parsed
    /// JSON body, building the rest of the event around it. Used by the
    /// ingest handler (spec §4.1).
    pub fn from_request(
        headers: HashMap<String, String>,
        signature: Option<String>,
        verified: bool,
        raw_body: Vec<u8>,
    ) -> Self {
        let body = serde_json::from_slice::<Value>(&raw_body).ok();

        let id = body
            .as_ref()
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let event_type = body
            .as_ref()
            .and_then(|v| v.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let source = body
            .as_ref()
            .and_then(|v| v.get("source"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let timestamp = body
            .as_ref()
            .and_then(|v| v.get("time"))
            .and_then(|v| v.as_i64())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        let grant_id = body
            .as_ref()
            .and_then(|v| v.get("data"))
            .and_then(|v| v.get("object"))
            .and_then(|v| v.get("grant_id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Self {
            id,
            event_type,
            source,
            timestamp,
            received_at: SystemTime::now(),
            headers,
            signature,
            verified,
            grant_id,
            body,
            raw_body,
        }
    }
}

/// The producer side of the best-effort observer channel (spec §5: "single
/// producer... single consumer... non-blocking send policy — on overflow the
/// new event is dropped silently").
#[derive(Clone)]
pub struct EventChannel {
    tx: mpsc::Sender<WebhookEvent>,
}

impl EventChannel {
    /// Create a new bounded channel, returning the producer handle and the
    /// consumer handle used by `events()`.
    pub fn new() -> (Self, mpsc::Receiver<WebhookEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Attempt to enqueue `event`. Never blocks; silently drops on overflow
    /// or once the consumer side has been dropped (post-`Stop`).
    pub fn try_send(&self, event: WebhookEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(event) {
            tracing::warn!("event channel full, dropping newest event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn parses_id_type_source_and_grant_id() {
        let body = serde_json::json!({
            "id": "evt_1",
            "type": "message.created",
            "source": "/webhooks",
            "data": { "object": { "grant_id": "g1" } },
        });
        let raw = serde_json::to_vec(&body).unwrap();
        let event = WebhookEvent::from_request(headers(), None, false, raw);

        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "message.created");
        assert_eq!(event.source, "/webhooks");
        assert_eq!(event.grant_id.as_deref(), Some("g1"));
    }

    #[test]
    fn malformed_json_yields_none_body_but_keeps_raw_bytes() {
        let raw = b"not json".to_vec();
        let event = WebhookEvent::from_request(headers(), None, false, raw.clone());
        assert!(event.body.is_none());
        assert_eq!(event.raw_body, raw);
        assert_eq!(event.id, "");
    }

    #[tokio::test]
    async fn channel_drops_newest_event_when_full() {
        let (chan, mut rx) = EventChannel::new();
        for _ in 0..EVENT_CHANNEL_CAPACITY {
            chan.try_send(WebhookEvent::from_request(headers(), None, false, vec![]));
        }
        // One more over capacity should be dropped, not block or panic.
        chan.try_send(WebhookEvent::from_request(headers(), None, false, vec![]));

        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, EVENT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn events_deliver_in_arrival_order() {
        let (chan, mut rx) = EventChannel::new();
        let mut first = WebhookEvent::from_request(headers(), None, false, vec![]);
        first.id = "a".into();
        let mut second = WebhookEvent::from_request(headers(), None, false, vec![]);
        second.id = "b".into();

        chan.try_send(first);
        chan.try_send(second);

        assert_eq!(rx.recv().await.unwrap().id, "a");
        assert_eq!(rx.recv().await.unwrap().id, "b");
    }
}
