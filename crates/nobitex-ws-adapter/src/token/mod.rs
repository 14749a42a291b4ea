/*
[INPUT]:  API credential and token endpoint configuration
[OUTPUT]: Cached, expiry-aware websocket connection tokens
[POS]:    Token layer - credential acquisition for the gateway
[UPDATE]: When the token endpoint or caching strategy changes
*/

pub mod cache;
pub mod fetcher;
pub mod jwt;

pub use cache::CachedTokenProvider;
pub use fetcher::{HttpTokenProvider, TokenProvider};
