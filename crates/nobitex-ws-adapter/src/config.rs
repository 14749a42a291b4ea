/*
[INPUT]:  API credential and optional endpoint overrides
[OUTPUT]: Construction-time configuration for the websocket adapter
[POS]:    Configuration layer - no runtime reconfiguration
[UPDATE]: When endpoints or tunables change
*/

use std::time::Duration;

use url::Url;

use crate::error::Result;

/// Base address of the REST host that issues connection tokens
pub const API_BASE_URL: &str = "https://apiv2.nobitex.ir/";

/// Gateway websocket endpoint
pub const WEBSOCKET_URL: &str = "wss://ws.nobitex.ir/connection/websocket";

/// How close to token expiry a refresh is forced
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Configuration for the websocket adapter
#[derive(Debug, Clone)]
pub struct WsOptions {
    /// API token used against the REST endpoint that issues connection tokens
    pub api_token: String,
    /// Base address for the token endpoint
    pub api_base_url: Url,
    /// Gateway websocket endpoint
    pub ws_url: Url,
    /// Cached connection tokens are refreshed this close to their expiry
    pub token_refresh_margin: Duration,
    /// User-specific suffix required by private channels (the part after '#').
    /// Not needed for public channels.
    pub ws_auth_param: Option<String>,
}

impl WsOptions {
    /// Create options with the production endpoints
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_token: api_token.into(),
            api_base_url: Url::parse(API_BASE_URL)?,
            ws_url: Url::parse(WEBSOCKET_URL)?,
            token_refresh_margin: DEFAULT_REFRESH_MARGIN,
            ws_auth_param: None,
        })
    }

    /// Qualify a private channel name with the configured auth param
    pub fn private_channel(&self, base: &str) -> String {
        match &self.ws_auth_param {
            Some(param) => format!("{base}#{param}"),
            None => base.to_string(),
        }
    }
}
