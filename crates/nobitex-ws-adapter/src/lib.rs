/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public websocket adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod config;
pub mod error;
pub mod token;
pub mod ws;

// Re-export commonly used types from config
pub use config::WsOptions;

// Re-export commonly used types from error
pub use error::{NobitexWsError, Result};

// Re-export commonly used types from token
pub use token::{CachedTokenProvider, HttpTokenProvider, TokenProvider};

// Re-export commonly used types from ws
pub use ws::{
    BookLevel,
    CentrifugoClient,
    ConnectionState,
    OrderBook,
    OrderBookRouter,
    orderbook_channel,
};
