/*
[INPUT]:  Gateway URL, token provider, and channel subscriptions
[OUTPUT]: Authenticated gateway session with raw/message event streams
[POS]:    WebSocket layer - connection lifecycle and subscription state machine
[UPDATE]: When the gateway protocol or reconnect policy changes
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::config::WsOptions;
use crate::error::{NobitexWsError, Result};
use crate::token::{CachedTokenProvider, HttpTokenProvider, TokenProvider};
use crate::ws::frame::{self, CONNECT_ID};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_JITTER_MS: u64 = 500;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection state of the gateway client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No active connection
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// Connect frame sent, waiting for its ack
    AwaitingAck,
    /// Authenticated and ready for subscriptions
    Connected,
    /// Tearing down the current connection
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::AwaitingAck => write!(f, "AwaitingAck"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Closing => write!(f, "Closing"),
        }
    }
}

/// Exponential backoff for reconnect attempts
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..MAX_JITTER_MS))
}

struct ClientShared {
    options: WsOptions,
    tokens: Arc<dyn TokenProvider>,
    /// Tracked channels in subscription order; replayed on every connect ack
    channels: Mutex<Vec<String>>,
    /// Correlation id -> channel for in-flight subscribe/unsubscribe requests.
    /// Entries orphaned by a dropped connection stay behind; ids are never
    /// reused, so they can only go unanswered.
    pending: Mutex<HashMap<u64, String>>,
    /// Sender half of the outbound queue of the live connection, if any.
    /// Replaced wholesale on reconnect; frames unsent at disconnect are lost.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    raw_tx: broadcast::Sender<Value>,
    message_tx: broadcast::Sender<Value>,
    outgoing_tx: broadcast::Sender<String>,
    state_tx: watch::Sender<ConnectionState>,
    terminal: Mutex<Option<NobitexWsError>>,
}

impl ClientShared {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }

    fn is_connected(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Connected
    }

    fn fresh_id(&self) -> u64 {
        frame::fresh_id()
    }

    /// Queue a frame for the live connection. Returns false when disconnected.
    /// Only frames actually handed to the send queue reach `outgoing_tx`.
    fn enqueue(&self, json: String) -> bool {
        let guard = self.outbound.lock().unwrap();
        match guard.as_ref() {
            Some(sender) if sender.send(json.clone()).is_ok() => {
                let _ = self.outgoing_tx.send(json);
                true
            }
            _ => false,
        }
    }

    fn clear_connection(&self) {
        *self.outbound.lock().unwrap() = None;
    }

    fn on_connect_ack(&self) {
        self.set_state(ConnectionState::Connected);
        let channels: Vec<String> = self.channels.lock().unwrap().clone();
        info!(
            count = channels.len(),
            "connect acknowledged, replaying tracked subscriptions"
        );
        for channel in channels {
            let id = self.fresh_id();
            self.pending.lock().unwrap().insert(id, channel.clone());
            self.enqueue(frame::subscribe(&channel, id));
            info!(channel, id, "sent subscribe");
        }
    }

    fn dispatch_frame(&self, message: WsMessage) {
        let text: String = match message {
            WsMessage::Text(text) => text.to_string(),
            WsMessage::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    debug!("ignoring non-utf8 binary frame");
                    return;
                }
            },
            _ => return,
        };

        let root: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "invalid JSON frame received");
                return;
            }
        };

        let _ = self.raw_tx.send(root.clone());

        let id = root.get("id").and_then(Value::as_u64);

        if root.get("result").is_some() {
            match id {
                Some(id) if id == CONNECT_ID => self.on_connect_ack(),
                Some(id) => {
                    if let Some(channel) = self.pending.lock().unwrap().remove(&id) {
                        info!(id, channel, "received result for pending request");
                    } else {
                        debug!(id, "received result without pending mapping");
                    }
                }
                None => debug!("received result frame without id"),
            }
        }

        if let Some(error) = root.get("error") {
            match id.and_then(|id| self.pending.lock().unwrap().remove(&id)) {
                Some(channel) => {
                    warn!(id = id.unwrap_or_default(), channel, error = %error, "subscribe/unsubscribe rejected")
                }
                None => warn!(error = %error, "received error frame"),
            }
        }

        if root.get("method").and_then(Value::as_str) == Some("message") {
            if let Some(params) = root.get("params") {
                let _ = self.message_tx.send(params.clone());
            }
        }

        if let Some(push) = root.get("push") {
            let _ = self.message_tx.send(push.clone());
        }
    }
}

/// Client for the Centrifugo-style gateway socket.
///
/// Owns the physical connection, the outbound queue, correlation-id
/// bookkeeping, and the reconnect state machine. Tracked subscriptions are
/// replayed after every connect ack, so they survive reconnects.
pub struct CentrifugoClient {
    shared: Arc<ClientShared>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    started: AtomicBool,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl CentrifugoClient {
    /// Create a client over an explicit token provider
    pub fn new(options: WsOptions, tokens: Arc<dyn TokenProvider>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (raw_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (message_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outgoing_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(ClientShared {
                options,
                tokens,
                channels: Mutex::new(Vec::new()),
                pending: Mutex::new(HashMap::new()),
                outbound: Mutex::new(None),
                raw_tx,
                message_tx,
                outgoing_tx,
                state_tx,
                terminal: Mutex::new(None),
            }),
            state_rx,
            shutdown_tx,
            shutdown_rx,
            started: AtomicBool::new(false),
            loop_task: Mutex::new(None),
        }
    }

    /// Create a client wired to the HTTP token endpoint with caching
    pub fn from_options(options: WsOptions) -> Result<Self> {
        let fetcher = Arc::new(HttpTokenProvider::new(&options)?);
        let cache = Arc::new(CachedTokenProvider::new(
            fetcher,
            options.token_refresh_margin,
        ));
        Ok(Self::new(options, cache))
    }

    /// Launch the background connect/reconnect loop. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = self.shared.clone();
        let shutdown = self.shutdown_rx.clone();
        let task = tokio::spawn(run_loop(shared, shutdown));
        *self.loop_task.lock().unwrap() = Some(task);
    }

    /// Track a channel and, when connected, send its subscribe frame now.
    /// Otherwise it is sent automatically after the next connect ack.
    ///
    /// Returns promptly; the ack is observed via the event streams.
    pub fn subscribe(&self, channel: &str) {
        {
            let mut channels = self.shared.channels.lock().unwrap();
            if !channels.iter().any(|tracked| tracked == channel) {
                channels.push(channel.to_string());
            }
        }

        if self.shared.is_connected() {
            let id = self.shared.fresh_id();
            self.shared
                .pending
                .lock()
                .unwrap()
                .insert(id, channel.to_string());
            self.shared.enqueue(frame::subscribe(channel, id));
            info!(channel, id, "sent subscribe");
        } else {
            info!(channel, "queued subscribe until connect ack");
        }
    }

    /// Stop tracking a channel and, when connected, send an unsubscribe frame
    pub fn unsubscribe(&self, channel: &str) {
        self.shared
            .channels
            .lock()
            .unwrap()
            .retain(|tracked| tracked != channel);

        if self.shared.is_connected() {
            let id = self.shared.fresh_id();
            self.shared
                .pending
                .lock()
                .unwrap()
                .insert(id, channel.to_string());
            self.shared.enqueue(frame::unsubscribe(channel, id));
            info!(channel, id, "sent unsubscribe");
        } else {
            info!(channel, "unsubscribe while disconnected, channel untracked");
        }
    }

    /// Best-effort publish to a channel; dropped when disconnected
    pub fn publish(&self, channel: &str, data: &Value) {
        let id = self.shared.fresh_id();
        if !self.shared.enqueue(frame::publish(channel, data, id)) {
            debug!(channel, "publish dropped, not connected");
        }
    }

    /// Every decoded inbound frame
    pub fn raw_frames(&self) -> broadcast::Receiver<Value> {
        self.shared.raw_tx.subscribe()
    }

    /// Message-class payloads only: `method == "message"` params and push
    /// wrappers
    pub fn messages(&self) -> broadcast::Receiver<Value> {
        self.shared.message_tx.subscribe()
    }

    /// Serialized outbound frames, as they are handed to the send queue
    pub fn outgoing_frames(&self) -> broadcast::Receiver<String> {
        self.shared.outgoing_tx.subscribe()
    }

    /// Watch connection state transitions
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Check if the connect frame has been acknowledged
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Channels currently tracked for (re-)subscription, in request order
    pub fn tracked_channels(&self) -> Vec<String> {
        self.shared.channels.lock().unwrap().clone()
    }

    /// The authorization error that permanently stopped the reconnect loop,
    /// if any
    pub fn terminal_error(&self) -> Option<String> {
        self.shared
            .terminal
            .lock()
            .unwrap()
            .as_ref()
            .map(ToString::to_string)
    }

    /// Cancel the background loop and wait for it to finish. Idempotent and
    /// safe to call without `start`.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = { self.loop_task.lock().unwrap().take() };
        if let Some(task) = task {
            if let Err(err) = task.await {
                debug!(error = %err, "reconnect loop task ended abnormally");
            }
        }
    }
}

async fn run_loop(shared: Arc<ClientShared>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = Backoff::new(INITIAL_BACKOFF, MAX_BACKOFF);

    while !*shutdown.borrow() {
        shared.set_state(ConnectionState::Connecting);

        let reached_connected = match run_connection(&shared, &mut shutdown).await {
            Ok(reached) => reached,
            Err(err) if err.is_auth_error() => {
                warn!(error = %err, "unauthorized fetching gateway token, stopping reconnect attempts");
                *shared.terminal.lock().unwrap() = Some(err);
                shared.set_state(ConnectionState::Closing);
                shared.clear_connection();
                break;
            }
            Err(err) => {
                warn!(error = %err, "gateway connection failed, will retry with backoff");
                false
            }
        };

        shared.set_state(ConnectionState::Closing);
        shared.clear_connection();
        shared.set_state(ConnectionState::Disconnected);

        if *shutdown.borrow() {
            return;
        }

        if reached_connected {
            backoff.reset();
        }
        let delay = backoff.next_delay() + jitter();
        debug!(delay_ms = delay.as_millis() as u64, "reconnect backoff");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                // A dropped sender means the client itself is gone; treat it
                // like an explicit shutdown instead of retrying forever.
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}

/// One connection attempt: fetch token, connect, run the send and receive
/// loops until either side ends. Returns whether the connect ack was seen.
async fn run_connection(
    shared: &Arc<ClientShared>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<bool> {
    let token = shared.tokens.connection_token().await?;

    let (ws_stream, _response) = connect_async(shared.options.ws_url.as_str())
        .await
        .map_err(|err| NobitexWsError::WebSocket(err.to_string()))?;
    info!(url = %shared.options.ws_url, "connected to gateway");

    // The socket halves live only inside this attempt; the write half is the
    // sole writer and the read half the sole reader.
    let (mut write, mut read) = ws_stream.split();

    // Fresh outbound queue per connection: frames left unsent by a previous
    // connection are not replayed, only tracked subscriptions are.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    *shared.outbound.lock().unwrap() = Some(outbound_tx);

    let connect_frame = frame::connect(&token);
    let _ = shared.outgoing_tx.send(connect_frame.clone());
    write
        .send(WsMessage::Text(connect_frame.into()))
        .await
        .map_err(|err| NobitexWsError::WebSocket(err.to_string()))?;
    shared.set_state(ConnectionState::AwaitingAck);
    debug!(id = CONNECT_ID, "sent connect frame");

    let mut reached_connected = false;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // Err: the client was dropped without close()
                if changed.is_err() || *shutdown.borrow() {
                    let _ = write.send(WsMessage::Close(None)).await;
                    break;
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(json) => {
                        if let Err(err) = write.send(WsMessage::Text(json.into())).await {
                            warn!(error = %err, "gateway write failed");
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("gateway sent close frame");
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(message)) => {
                        shared.dispatch_frame(message);
                        if !reached_connected && shared.is_connected() {
                            reached_connected = true;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "gateway read failed");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(reached_connected)
}
