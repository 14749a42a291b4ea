/*
[INPUT]:  Decoded inbound gateway frames (JSON trees)
[OUTPUT]: Normalized OrderBook payloads when a frame matches a known envelope
[POS]:    WebSocket layer - tolerant envelope recognition
[UPDATE]: When the gateway adds envelope shapes or payload fields
*/

use serde_json::{Map, Value};

use crate::ws::orderbook::{BookLevel, OrderBook};

/// Try to extract an order book from a frame or message payload.
///
/// Recognized shapes, in order:
/// 1. direct snapshot: `{ "asks": [...], "bids": [...], ... }`
/// 2. message payload: `{ "data": ... }` or `{ "pub": { "data": ... } }`
///    where data may be an object or a JSON-encoded string
/// 3. push wrapper: `{ "push": { "pub": { "data": ... } } }`
/// 4. method envelope: `{ "method": "message", "params": { ... } }` with the
///    params handled as a message payload
///
/// Anything else returns `None`. Unrecognized frames (pings, acks) are
/// expected and must not be treated as errors by callers.
pub fn try_parse_order_book(frame: &Value) -> Option<OrderBook> {
    let object = frame.as_object()?;

    if object.contains_key("asks") && object.contains_key("bids") {
        return parse_snapshot(object);
    }

    if let Some(book) = object.get("data").and_then(parse_data) {
        return Some(book);
    }

    if let Some(book) = object
        .get("pub")
        .and_then(|p| p.get("data"))
        .and_then(parse_data)
    {
        return Some(book);
    }

    if let Some(book) = object
        .get("push")
        .and_then(|push| push.get("pub"))
        .and_then(|p| p.get("data"))
        .and_then(parse_data)
    {
        return Some(book);
    }

    if object.get("method").and_then(Value::as_str) == Some("message") {
        if let Some(book) = object.get("params").and_then(try_parse_order_book) {
            return Some(book);
        }
    }

    None
}

// data may be the payload object itself, or that object double-encoded as a
// JSON string
fn parse_data(data: &Value) -> Option<OrderBook> {
    match data {
        Value::String(inner) => {
            let parsed: Value = serde_json::from_str(inner).ok()?;
            try_parse_order_book(&parsed)
        }
        Value::Object(_) => try_parse_order_book(data),
        _ => None,
    }
}

fn parse_snapshot(object: &Map<String, Value>) -> Option<OrderBook> {
    let asks = parse_levels(object.get("asks")?);
    let bids = parse_levels(object.get("bids")?);
    let last_trade_price = object.get("lastTradePrice").and_then(parse_decimal);
    let last_update = object
        .get("lastUpdate")
        .and_then(Value::as_i64)
        .and_then(chrono::DateTime::from_timestamp_millis);

    Some(OrderBook {
        asks,
        bids,
        last_trade_price,
        last_update,
        market: None,
    })
}

// A level that fails to parse is dropped rather than zero-filled: a zero
// price would silently poison downstream consumers.
fn parse_levels(value: &Value) -> Vec<BookLevel> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries.iter().filter_map(parse_level).collect()
}

fn parse_level(entry: &Value) -> Option<BookLevel> {
    let pair = entry.as_array()?;
    let price = parse_decimal(pair.first()?)?;
    let amount = parse_decimal(pair.get(1)?)?;
    Some(BookLevel::new(price, amount))
}

// Levels arrive as decimal strings; plain JSON numbers are accepted too.
fn parse_decimal(value: &Value) -> Option<rust_decimal::Decimal> {
    match value {
        Value::String(text) => text.parse().ok(),
        Value::Number(number) => number.to_string().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use rust_decimal::Decimal;

    fn snapshot_json() -> Value {
        serde_json::json!({
            "asks": [["100.5", "2"]],
            "bids": [["100.0", "1"]],
            "lastTradePrice": "100.3",
            "lastUpdate": 1_726_000_000_000_i64
        })
    }

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    fn assert_snapshot(book: &OrderBook) {
        assert_eq!(book.asks, vec![BookLevel::new(dec("100.5"), dec("2"))]);
        assert_eq!(book.bids, vec![BookLevel::new(dec("100.0"), dec("1"))]);
        assert_eq!(book.last_trade_price, Some(dec("100.3")));
        assert_eq!(
            book.last_update.unwrap().timestamp_millis(),
            1_726_000_000_000
        );
    }

    #[test]
    fn test_direct_snapshot() {
        let book = try_parse_order_book(&snapshot_json()).unwrap();
        assert_snapshot(&book);
    }

    #[test]
    fn test_push_wrapper_with_string_encoded_data() {
        let frame = serde_json::json!({
            "push": {
                "channel": "public:orderbook-BTCIRT",
                "pub": { "data": snapshot_json().to_string(), "offset": 123 }
            }
        });
        let book = try_parse_order_book(&frame).unwrap();
        assert_snapshot(&book);
    }

    #[test]
    fn test_push_wrapper_with_object_data() {
        let frame = serde_json::json!({
            "push": { "pub": { "data": snapshot_json() } }
        });
        let book = try_parse_order_book(&frame).unwrap();
        assert_snapshot(&book);
    }

    #[rstest]
    #[case::data_string(serde_json::json!({
        "method": "message",
        "params": { "channel": "public:orderbook-BTCIRT", "data": snapshot_json().to_string() }
    }))]
    #[case::data_object(serde_json::json!({
        "method": "message",
        "params": { "data": snapshot_json() }
    }))]
    #[case::nested_push(serde_json::json!({
        "method": "message",
        "params": { "push": { "pub": { "data": snapshot_json() } } }
    }))]
    #[case::nested_pub(serde_json::json!({
        "method": "message",
        "params": { "pub": { "data": snapshot_json().to_string() } }
    }))]
    #[case::bare_params(serde_json::json!({
        "channel": "public:orderbook-BTCIRT",
        "data": snapshot_json().to_string()
    }))]
    #[case::bare_push_payload(serde_json::json!({
        "channel": "public:orderbook-BTCIRT",
        "pub": { "data": snapshot_json(), "offset": 12 }
    }))]
    fn test_message_envelopes(#[case] frame: Value) {
        let book = try_parse_order_book(&frame).unwrap();
        assert_snapshot(&book);
    }

    #[rstest]
    #[case::ping(serde_json::json!({"type": "ping"}))]
    #[case::ack(serde_json::json!({"id": 42, "result": {}}))]
    #[case::scalar(serde_json::json!(17))]
    #[case::empty_object(serde_json::json!({}))]
    #[case::wrong_method(serde_json::json!({"method": "presence", "params": {"data": "{}"}}))]
    fn test_unrecognized_frames(#[case] frame: Value) {
        assert!(try_parse_order_book(&frame).is_none());
    }

    #[test]
    fn test_unparseable_level_is_dropped() {
        let frame = serde_json::json!({
            "asks": [["not-a-number", "2"], ["101.0", "3"]],
            "bids": [["100.0"], ["99.5", "1"]]
        });
        let book = try_parse_order_book(&frame).unwrap();
        assert_eq!(book.asks, vec![BookLevel::new(dec("101.0"), dec("3"))]);
        assert_eq!(book.bids, vec![BookLevel::new(dec("99.5"), dec("1"))]);
    }

    #[test]
    fn test_numeric_levels_accepted() {
        let frame = serde_json::json!({
            "asks": [[100.5, 2]],
            "bids": []
        });
        let book = try_parse_order_book(&frame).unwrap();
        assert_eq!(book.asks, vec![BookLevel::new(dec("100.5"), dec("2"))]);
        assert!(book.bids.is_empty());
    }

    #[test]
    fn test_optional_fields_tolerate_bad_values() {
        let frame = serde_json::json!({
            "asks": [],
            "bids": [],
            "lastTradePrice": "garbage",
            "lastUpdate": "not-a-timestamp"
        });
        let book = try_parse_order_book(&frame).unwrap();
        assert!(book.last_trade_price.is_none());
        assert!(book.last_update.is_none());
    }

    #[test]
    fn test_string_data_with_invalid_json_is_ignored() {
        let frame = serde_json::json!({
            "push": { "pub": { "data": "{not json" } }
        });
        assert!(try_parse_order_book(&frame).is_none());
    }
}
