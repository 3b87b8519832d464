use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::app::AppState;

const BROADCAST_CAPACITY: usize = 256;

/// Fan-out of daemon events to every `/events` subscriber.
///
/// Wire: `{ "type": "event", "event": "notification", "payload": {...}, "seq": 7 }`
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
    seq: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Push an event to all subscribers. Dropped silently when nobody listens.
    pub fn send(&self, event: &str, payload: impl Serialize) {
        let frame = json!({
            "type": "event",
            "event": event,
            "payload": serde_json::to_value(payload).unwrap_or(Value::Null),
            "seq": self.seq.fetch_add(1, Ordering::Relaxed),
        });
        let _ = self.tx.send(frame.to_string());
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay store change notifications as `store.changed` events.
pub fn spawn_store_forwarder(state: Arc<AppState>) {
    let mut changes = state.store.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => state
                    .broadcaster
                    .send("store.changed", json!({ "key": change.key })),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "store change forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// GET /events: upgrade to a push-only WebSocket.
pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| run_connection(socket, state))
}

async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    state
        .ws_clients
        .insert(conn_id.clone(), chrono::Utc::now().timestamp_millis());
    info!(conn_id = %conn_id, "events subscriber connected");

    let (mut tx, mut rx) = socket.split();
    let mut events = state.broadcaster.subscribe();

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    // Inbound text is ignored; commands go through POST /message.
                    _ => {}
                }
            }

            event = events.recv() => {
                match event {
                    Ok(payload) => {
                        if tx.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(conn_id = %conn_id, skipped, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    state.ws_clients.remove(&conn_id);
    info!(conn_id = %conn_id, "events subscriber closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_framed_with_sequence() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        broadcaster.send("notification", json!({"title": "AutoRefresh"}));
        broadcaster.send("store.changed", json!({"key": "timers"}));

        let first: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "event");
        assert_eq!(first["event"], "notification");
        assert_eq!(first["payload"]["title"], "AutoRefresh");
        assert_eq!(first["seq"], 0);
        let second: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(second["seq"], 1);
    }

    #[test]
    fn send_without_subscribers_is_silent() {
        EventBroadcaster::new().send("notification", json!({}));
    }
}
