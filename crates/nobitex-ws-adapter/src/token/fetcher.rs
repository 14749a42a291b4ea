/*
[INPUT]:  API credential and token endpoint address
[OUTPUT]: Short-lived websocket connection tokens
[POS]:    Token layer - HTTP fetch from the token endpoint
[UPDATE]: When the token endpoint or its auth scheme changes
*/

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::WsOptions;
use crate::error::{NobitexWsError, Result};

/// Source of websocket connection tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a connection token for the gateway
    async fn connection_token(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ConnectionTokenResponse {
    token: Option<String>,
    status: Option<String>,
}

/// Fetches connection tokens from `auth/ws/token/`.
///
/// Requires an API token sent as `Authorization: Token {api_token}`.
/// A 403 response maps to [`NobitexWsError::Unauthorized`].
#[derive(Debug)]
pub struct HttpTokenProvider {
    http: reqwest::Client,
    token_url: Url,
    api_token: String,
}

impl HttpTokenProvider {
    pub fn new(options: &WsOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            token_url: options.api_base_url.join("auth/ws/token/")?,
            api_token: options.api_token.clone(),
        })
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn connection_token(&self) -> Result<String> {
        let response = self
            .http
            .get(self.token_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.api_token))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            warn!("token endpoint returned 403 Forbidden");
            return Err(NobitexWsError::Unauthorized);
        }

        let response = response.error_for_status()?;
        let body: ConnectionTokenResponse = response.json().await?;
        debug!(
            status = body.status.as_deref().unwrap_or("unknown"),
            "token endpoint responded"
        );

        match body.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(NobitexWsError::InvalidResponse(
                "token field missing in token endpoint response".to_string(),
            )),
        }
    }
}
