/*
[INPUT]:  Test configuration and mock gateway requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for nobitex-ws-adapter tests

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures_util::{SinkExt, StreamExt};
use nobitex_ws_adapter::{NobitexWsError, Result, TokenProvider, WsOptions};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Control commands for the in-process gateway
#[allow(dead_code)]
pub enum GatewayCommand {
    /// Deliver a frame to the connected client
    Push(serde_json::Value),
    /// Close the current connection (the accept loop keeps running, so the
    /// client can reconnect)
    Drop,
    /// Answer subsequent subscribe frames with an error instead of a result
    RejectSubscribes,
}

/// In-process Centrifugo-style gateway.
///
/// Acks every inbound frame carrying an id with `{"id": id, "result": {}}`
/// and records all inbound frames for assertions.
#[allow(dead_code)]
pub struct MockGateway {
    pub addr: SocketAddr,
    pub frames: mpsc::UnboundedReceiver<serde_json::Value>,
    pub commands: mpsc::UnboundedSender<GatewayCommand>,
}

#[allow(dead_code)]
impl MockGateway {
    pub fn ws_url(&self) -> url::Url {
        url::Url::parse(&format!("ws://{}", self.addr)).unwrap()
    }

    pub async fn next_frame(&mut self) -> serde_json::Value {
        tokio::time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("timed out waiting for gateway frame")
            .expect("gateway frame channel closed")
    }

    pub async fn try_next_frame(&mut self, wait: Duration) -> Option<serde_json::Value> {
        tokio::time::timeout(wait, self.frames.recv())
            .await
            .ok()
            .flatten()
    }
}

#[allow(dead_code)]
pub async fn spawn_mock_gateway() -> MockGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, frames) = mpsc::unbounded_channel();
    let (commands_tx, mut commands_rx) = mpsc::unbounded_channel::<GatewayCommand>();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let Ok(ws) = accept_async(stream).await else {
                continue;
            };
            let (mut write, mut read) = ws.split();
            let mut reject_subscribes = false;
            loop {
                tokio::select! {
                    command = commands_rx.recv() => {
                        match command {
                            Some(GatewayCommand::Push(value)) => {
                                if write.send(Message::Text(value.to_string().into())).await.is_err() {
                                    break;
                                }
                            }
                            Some(GatewayCommand::Drop) => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                            Some(GatewayCommand::RejectSubscribes) => {
                                reject_subscribes = true;
                            }
                            None => return,
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let Ok(frame) = serde_json::from_str::<serde_json::Value>(text.as_str()) else {
                                    continue;
                                };
                                let id = frame.get("id").and_then(|value| value.as_u64());
                                let is_subscribe = frame.get("subscribe").is_some();
                                let _ = frames_tx.send(frame);
                                if let Some(id) = id {
                                    let reply = if reject_subscribes && is_subscribe {
                                        serde_json::json!({
                                            "id": id,
                                            "error": {"code": 103, "message": "permission denied"}
                                        })
                                    } else {
                                        serde_json::json!({"id": id, "result": {}})
                                    };
                                    if write.send(Message::Text(reply.to_string().into())).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(_)) => break,
                        }
                    }
                }
            }
        }
    });

    MockGateway {
        addr,
        frames,
        commands: commands_tx,
    }
}

/// Options pointed at an in-process gateway
#[allow(dead_code)]
pub fn gateway_options(ws_url: url::Url) -> WsOptions {
    let mut options = WsOptions::new("test-api-token").unwrap();
    options.ws_url = ws_url;
    options
}

/// Token provider that always succeeds with a fixed token
#[allow(dead_code)]
pub struct StaticTokenProvider {
    token: String,
}

#[allow(dead_code)]
impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn connection_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Token provider that always succeeds, counting attempts
#[derive(Default)]
#[allow(dead_code)]
pub struct CountingTokenProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TokenProvider for CountingTokenProvider {
    async fn connection_token(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("test-token".to_string())
    }
}

/// Token provider that rejects every call, counting attempts
#[derive(Default)]
#[allow(dead_code)]
pub struct UnauthorizedTokenProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TokenProvider for UnauthorizedTokenProvider {
    async fn connection_token(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NobitexWsError::Unauthorized)
    }
}

/// Build an unsigned JWT whose `exp` claim is the given unix timestamp
#[allow(dead_code)]
pub fn jwt_with_exp(exp: i64) -> String {
    let header = serde_json::json!({"alg": "none", "typ": "JWT"});
    let payload = serde_json::json!({"exp": exp, "sub": "ws"});
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
    format!("{header_b64}.{payload_b64}.signature")
}
