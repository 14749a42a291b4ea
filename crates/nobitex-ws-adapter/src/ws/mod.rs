/*
[INPUT]:  Gateway configuration and channel subscriptions
[OUTPUT]: Real-time gateway session and typed channel events
[POS]:    WebSocket layer - connection, parsing, and routing
[UPDATE]: When the gateway protocol or routed payloads change
*/

pub mod client;
pub mod frame;
pub mod orderbook;
pub mod parser;
pub mod router;

pub use client::{CentrifugoClient, ConnectionState};
pub use orderbook::{BookLevel, OrderBook};
pub use router::{OrderBookRouter, orderbook_channel};
