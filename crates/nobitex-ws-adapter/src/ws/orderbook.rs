/*
[INPUT]:  Parsed price/amount pairs and snapshot metadata
[OUTPUT]: Typed order book events
[POS]:    WebSocket layer - domain types for channel payloads
[UPDATE]: When the orderbook channel payload changes
*/

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One price level of an order book side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

impl BookLevel {
    pub fn new(price: Decimal, amount: Decimal) -> Self {
        Self { price, amount }
    }
}

/// Order book snapshot as delivered by the gateway orderbook channel.
///
/// Constructed fresh per update; no identity beyond its fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OrderBook {
    pub asks: Vec<BookLevel>,
    pub bids: Vec<BookLevel>,
    pub last_trade_price: Option<Decimal>,
    pub last_update: Option<DateTime<Utc>>,
    /// Short market identifier derived from the channel name, when available
    pub market: Option<String>,
}
