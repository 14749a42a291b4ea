/*
[INPUT]:  Channel names, payloads, and correlation ids
[OUTPUT]: Serialized outbound gateway frames
[POS]:    WebSocket layer - wire frame construction
[UPDATE]: When the gateway frame shapes change
*/

use std::sync::atomic::{AtomicU64, Ordering};

/// Reserved id of the connect frame. Its ack marks the connection ready.
pub const CONNECT_ID: u64 = 1;

// Monotonic and never reused across connections; 1 is reserved for connect.
static NEXT_ID: AtomicU64 = AtomicU64::new(CONNECT_ID + 1);

/// Allocate a fresh correlation id
pub fn fresh_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Build the authenticated connect frame
pub fn connect(token: &str) -> String {
    serde_json::json!({ "connect": { "token": token }, "id": CONNECT_ID }).to_string()
}

/// Build a subscribe frame for a channel
pub fn subscribe(channel: &str, id: u64) -> String {
    serde_json::json!({ "subscribe": { "channel": channel }, "id": id }).to_string()
}

/// Build an unsubscribe frame for a channel
pub fn unsubscribe(channel: &str, id: u64) -> String {
    serde_json::json!({ "unsubscribe": { "channel": channel }, "id": id }).to_string()
}

/// Build a publish frame carrying arbitrary data
pub fn publish(channel: &str, data: &serde_json::Value, id: u64) -> String {
    serde_json::json!({ "publish": { "channel": channel, "data": data }, "id": id }).to_string()
}
