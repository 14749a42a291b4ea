/*
[INPUT]:  An inner TokenProvider and a refresh margin
[OUTPUT]: Cached connection tokens, refreshed near expiry
[POS]:    Token layer - expiry-aware caching wrapper
[UPDATE]: When the caching or refresh policy changes
*/

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::token::fetcher::TokenProvider;
use crate::token::jwt;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expiry: Option<DateTime<Utc>>,
}

/// Caching wrapper around a [`TokenProvider`].
///
/// Serves the cached token until it is within the refresh margin of its
/// parsed expiry. Concurrent callers racing past the fast path share one
/// refresh: the condition is re-checked under the refresh lock. A token whose
/// expiry cannot be parsed is refetched on every call.
///
/// Fetch failures propagate unmodified; retry policy belongs to the caller.
pub struct CachedTokenProvider {
    inner: Arc<dyn TokenProvider>,
    refresh_margin: Duration,
    cached: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
}

impl CachedTokenProvider {
    pub fn new(inner: Arc<dyn TokenProvider>, refresh_margin: Duration) -> Self {
        Self {
            inner,
            refresh_margin,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    fn fresh_cached(&self) -> Option<String> {
        let guard = self.cached.read().unwrap();
        guard.as_ref().and_then(|cached| {
            if jwt::should_refresh(cached.expiry, self.refresh_margin) {
                None
            } else {
                Some(cached.token.clone())
            }
        })
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn connection_token(&self) -> Result<String> {
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.fresh_cached() {
            return Ok(token);
        }

        let token = self.inner.connection_token().await?;
        let expiry = jwt::parse_expiry(&token);
        info!(
            expiry = expiry
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
            "fetched websocket connection token"
        );

        let mut guard = self.cached.write().unwrap();
        *guard = Some(CachedToken {
            token: token.clone(),
            expiry,
        });
        Ok(token)
    }
}
