/*
[INPUT]:  Raw and message-class frames from the gateway client
[OUTPUT]: Typed OrderBook events tagged with their market
[POS]:    WebSocket layer - decodes frames and republishes domain events
[UPDATE]: When channel naming or routed payload types change
*/

use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ws::client::CentrifugoClient;
use crate::ws::orderbook::OrderBook;
use crate::ws::parser;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const ORDERBOOK_PREFIX: &str = "orderbook-";

/// Channel name of a public orderbook feed for a market
pub fn orderbook_channel(market: &str) -> String {
    format!("public:{ORDERBOOK_PREFIX}{market}")
}

/// Derive the short market identifier from a channel name.
///
/// `"<scope>:orderbook-<MARKET>"` yields MARKET; otherwise the text after a
/// '#' separator is used; otherwise there is no market tag.
pub(crate) fn extract_market(channel: &str) -> Option<String> {
    if let Some((_, rest)) = channel.split_once(':') {
        if rest.len() > ORDERBOOK_PREFIX.len()
            && rest[..ORDERBOOK_PREFIX.len()].eq_ignore_ascii_case(ORDERBOOK_PREFIX)
        {
            return Some(rest[ORDERBOOK_PREFIX.len()..].to_string());
        }
    }
    channel
        .split_once('#')
        .map(|(_, after)| after.to_string())
        .filter(|after| !after.is_empty())
}

/// Republishes parsed order books from a [`CentrifugoClient`]'s message
/// stream.
///
/// Decoding and routing failures are logged and swallowed; the router never
/// stops on bad input, and one lagging subscriber cannot block the others.
pub struct OrderBookRouter {
    book_tx: broadcast::Sender<OrderBook>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OrderBookRouter {
    /// Attach to a client's message stream
    pub fn attach(client: &CentrifugoClient) -> Self {
        let (book_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut messages = client.messages();
        let tx = book_tx.clone();

        let task = tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) => route_message(&tx, &message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "order book router lagged behind messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self {
            book_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Subscribe to parsed order book events
    pub fn order_books(&self) -> broadcast::Receiver<OrderBook> {
        self.book_tx.subscribe()
    }

    /// Stop routing. Idempotent.
    pub async fn close(&self) {
        let task = { self.task.lock().unwrap().take() };
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

// Message payloads are params objects or push wrappers with the channel at
// the top or nested one level down.
fn route_message(tx: &broadcast::Sender<OrderBook>, message: &Value) {
    let Some(mut book) = parser::try_parse_order_book(message) else {
        return;
    };
    let channel = message
        .get("channel")
        .and_then(Value::as_str)
        .or_else(|| {
            message
                .get("push")
                .and_then(|push| push.get("channel"))
                .and_then(Value::as_str)
        });
    if let Some(channel) = channel {
        book.market = extract_market(channel);
    }
    publish_book(tx, book);
}

fn publish_book(tx: &broadcast::Sender<OrderBook>, book: OrderBook) {
    if tx.send(book).is_err() {
        debug!("order book event dropped, no subscribers");
    }
}
