//! WebSocket session handling.
//!
//! Each accepted socket is split into a writer task draining the
//! connection's bounded outbox (plus periodic pings) and a reader loop
//! that applies inbound control messages in arrival order.
//!
//! Security features:
//! - Connection cap enforced before any registration
//! - Subscribe requests must carry a signature recovering to `playerId`
//! - Message size limits and per-connection rate limiting
//! - Idle connections are closed
//!
//! Whatever ends the session (close frame, socket error, idle timeout,
//! delivery failure), the reader loop exits to the same cleanup:
//! [`SubscriptionRegistry::on_disconnect`](super::SubscriptionRegistry::on_disconnect).

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared_crypto::{recover_address, CryptoError};
use shared_types::same_address;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, instrument, warn};

use super::broadcast::BroadcastService;
use super::connection::{ConnectionHandle, DeliveryError, Frame, Outbox};
use super::messages::{codes, ClientMessage, ServerEvent};
use super::registry::{CapacityError, ConnectionPermit};
use crate::domain::{ConnectionId, WebSocketConfig};
use crate::middleware::GatewayMetrics;

/// Close code for a refused connection ("try again later").
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
/// Close reason sent with [`CLOSE_TRY_AGAIN_LATER`].
pub const CAPACITY_CLOSE_REASON: &str = "retry later: max connections";

const NORMAL_CLOSE: u16 = 1000;
const GOING_AWAY: u16 = 1001;
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub table_address: Option<String>,
    pub player_id: Option<String>,
    pub subscribe_mempool: Option<String>,
    pub signature: Option<String>,
}

impl ConnectParams {
    fn wants_mempool(&self) -> bool {
        self.subscribe_mempool
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("signature required")]
    MissingSignature,
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] CryptoError),
    #[error("signature does not belong to player {0}")]
    SignerMismatch(String),
}

/// Message a player signs to watch `table`.
pub fn subscription_payload(table: &str, player: &str) -> String {
    format!("subscribe:{table}:{player}")
}

/// Check that `signature` over the subscription payload recovers to `player`.
pub fn verify_subscription(
    table: &str,
    player: &str,
    signature: Option<&str>,
) -> Result<(), SubscribeError> {
    let signature = signature
        .filter(|s| !s.trim().is_empty())
        .ok_or(SubscribeError::MissingSignature)?;
    let signer = recover_address(subscription_payload(table, player).as_bytes(), signature)?;
    if same_address(&signer, player) {
        Ok(())
    } else {
        Err(SubscribeError::SignerMismatch(player.to_string()))
    }
}

/// Fixed one-second message window.
struct RateWindow {
    limit: u32,
    count: u32,
    started: Instant,
}

impl RateWindow {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            count: 0,
            started: Instant::now(),
        }
    }

    /// Count one message, returning whether it is allowed.
    fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.started) >= Duration::from_secs(1) {
            self.started = now;
            self.count = 0;
        }
        self.count = self.count.saturating_add(1);
        self.count <= self.limit
    }
}

/// Protocol state of one connection, independent of the socket.
pub struct WsSession {
    handle: ConnectionHandle,
    broadcast: Arc<BroadcastService>,
    config: WebSocketConfig,
    rate: RateWindow,
}

impl WsSession {
    pub fn new(
        handle: ConnectionHandle,
        broadcast: Arc<BroadcastService>,
        config: WebSocketConfig,
    ) -> Self {
        let rate = RateWindow::new(config.rate_limit_per_second);
        Self {
            handle,
            broadcast,
            config,
            rate,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    fn reply(&self, event: &ServerEvent) -> Result<(), DeliveryError> {
        let text = event.to_text().map_err(|e| {
            warn!(conn = %self.id(), error = %e, "Event serialization failed");
            DeliveryError::Closed
        })?;
        self.handle.send(text.into())
    }

    fn reject(&self, code: &str, message: impl Into<String>) -> Result<(), DeliveryError> {
        self.reply(&ServerEvent::error(code, message))
    }

    /// Send the `connected` greeting and honour query-string subscriptions.
    pub async fn open(&mut self, params: &ConnectParams) -> Result<(), DeliveryError> {
        self.reply(&ServerEvent::connected(self.id()))?;

        if let (Some(table), Some(player)) = (
            params.table_address.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            params.player_id.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        ) {
            let authorized = match params.signature.as_deref() {
                None if self.config.allow_unsigned_url_subscribe => Ok(()),
                signature => verify_subscription(table, player, signature),
            };
            match authorized {
                Ok(()) => self.subscribe(table, player).await?,
                Err(e) => {
                    warn!(conn = %self.id(), table = %table, player = %player, error = %e, "URL subscribe refused");
                    self.reject(codes::UNAUTHORIZED, e.to_string())?;
                }
            }
        }

        if params.wants_mempool() {
            self.subscribe_mempool()?;
        }
        Ok(())
    }

    /// Apply one inbound text frame. `Err` means the connection can no
    /// longer be written to.
    #[instrument(skip(self, text), fields(conn = %self.handle.id(), len = text.len()))]
    pub async fn process_text(&mut self, text: &str) -> Result<(), DeliveryError> {
        if text.len() > self.config.max_message_size {
            warn!(max = self.config.max_message_size, "Message exceeds size limit");
            return self.reject(
                codes::MESSAGE_TOO_LARGE,
                format!(
                    "Message too large: {} bytes (max: {})",
                    text.len(),
                    self.config.max_message_size
                ),
            );
        }
        if !self.rate.allow() {
            return self.reject(codes::RATE_LIMITED, "Rate limit exceeded");
        }

        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Unparsable client message");
                return self.reject(codes::INVALID_MESSAGE, format!("Invalid message: {e}"));
            }
        };

        match message {
            ClientMessage::Subscribe {
                table_address,
                player_id,
                signature,
            } => {
                let (table, player) = (table_address.trim(), player_id.trim());
                if table.is_empty() || player.is_empty() {
                    return self.reject(codes::INVALID_MESSAGE, "tableAddress and playerId are required");
                }
                if let Err(e) = verify_subscription(table, player, signature.as_deref()) {
                    warn!(table = %table, player = %player, error = %e, "Subscribe refused");
                    return self.reject(codes::UNAUTHORIZED, e.to_string());
                }
                self.subscribe(table, player).await
            }
            ClientMessage::Unsubscribe {
                table_address,
                player_id,
            } => {
                let (table, player) = (table_address.trim(), player_id.trim());
                self.broadcast
                    .registry()
                    .unsubscribe_table_owned(table, player, self.id());
                self.reply(&ServerEvent::Unsubscribed {
                    table_address: table.to_string(),
                    player_id: player.to_string(),
                })
            }
            ClientMessage::SubscribeMempool => self.subscribe_mempool(),
            ClientMessage::UnsubscribeMempool => {
                self.broadcast.registry().unsubscribe_mempool(self.id());
                self.reply(&ServerEvent::MempoolUnsubscribed)
            }
        }
    }

    async fn subscribe(&self, table: &str, player: &str) -> Result<(), DeliveryError> {
        if let Some(previous) = self
            .broadcast
            .registry()
            .subscribe_table(table, player, self.handle.clone())
        {
            info!(table = %table, player = %player, previous = %previous, "Viewer moved to a new connection");
        }
        self.reply(&ServerEvent::Subscribed {
            table_address: table.to_string(),
            player_id: player.to_string(),
        })?;
        if !self.broadcast.push_initial_state(table, player).await && !self.handle.is_open() {
            return Err(DeliveryError::Closed);
        }
        Ok(())
    }

    fn subscribe_mempool(&self) -> Result<(), DeliveryError> {
        self.broadcast.registry().subscribe_mempool(self.handle.clone());
        self.reply(&ServerEvent::MempoolSubscribed)?;
        if !self.broadcast.push_mempool_to(&self.handle) {
            return Err(DeliveryError::Closed);
        }
        Ok(())
    }
}

/// Close a socket refused at capacity.
pub async fn refuse(mut socket: WebSocket, error: CapacityError, metrics: &GatewayMetrics) {
    warn!(max = error.max, "WebSocket connection refused at capacity");
    metrics.record_ws_rejected();
    let frame = CloseFrame {
        code: CLOSE_TRY_AGAIN_LATER,
        reason: CAPACITY_CLOSE_REASON.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send capacity close frame");
    }
}

/// Shared dependencies of every session.
#[derive(Clone)]
pub struct WsContext {
    pub broadcast: Arc<BroadcastService>,
    pub metrics: Arc<GatewayMetrics>,
    pub config: WebSocketConfig,
    /// Flips to `true` when the node shuts down.
    pub shutdown: watch::Receiver<bool>,
}

/// Drive one accepted socket to completion.
pub async fn serve_socket(
    socket: WebSocket,
    params: ConnectParams,
    ctx: WsContext,
    _permit: ConnectionPermit,
) {
    let WsContext {
        broadcast,
        metrics,
        config,
        mut shutdown,
    } = ctx;
    let id = ConnectionId::new();
    let (sink, mut stream) = socket.split();
    let (handle, Outbox { frames, closer }) =
        ConnectionHandle::new(id, config.message_buffer_size);
    let writer = tokio::spawn(write_frames(sink, frames, closer.clone(), config.ping_interval));

    metrics.record_ws_connect();
    info!(conn = %id, "WebSocket connection opened");

    let idle_timeout = config.idle_timeout;
    let mut session = WsSession::new(handle.clone(), broadcast.clone(), config);
    let mut open = session.open(&params).await.is_ok();
    let mut close_code = NORMAL_CLOSE;

    while open {
        tokio::select! {
            _ = closer.notified() => {
                debug!(conn = %id, "Connection closed by server");
                break;
            }
            _ = async { let _ = shutdown.wait_for(|stopping| *stopping).await; } => {
                close_code = GOING_AWAY;
                break;
            }
            next = tokio::time::timeout(idle_timeout, stream.next()) => {
                open = match next {
                    Err(_) => {
                        info!(conn = %id, "Closing idle WebSocket connection");
                        false
                    }
                    Ok(None) => false,
                    Ok(Some(Err(e))) => {
                        warn!(conn = %id, error = %e, "WebSocket error");
                        false
                    }
                    Ok(Some(Ok(message))) => handle_message(&mut session, &handle, message).await,
                };
            }
        }
    }

    broadcast.registry().on_disconnect(id);
    let _ = handle.push(Frame::Close {
        code: close_code,
        reason: String::new(),
    });
    handle.close();
    drop(session);
    drop(handle);

    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        abort.abort();
    }
    metrics.record_ws_disconnect();
    info!(conn = %id, "WebSocket connection closed");
}

/// Returns whether the session should keep reading.
async fn handle_message(session: &mut WsSession, handle: &ConnectionHandle, message: Message) -> bool {
    match message {
        Message::Text(text) => session.process_text(&text).await.is_ok(),
        Message::Binary(data) => match String::from_utf8(data) {
            Ok(text) => session.process_text(&text).await.is_ok(),
            Err(_) => session
                .reject(codes::INVALID_MESSAGE, "Binary frames must be UTF-8 JSON")
                .is_ok(),
        },
        Message::Ping(data) => handle.push(Frame::Pong(data)).is_ok(),
        Message::Pong(_) => true,
        Message::Close(_) => {
            debug!(conn = %handle.id(), "WebSocket close received");
            false
        }
    }
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<Frame>,
    closer: Arc<Notify>,
    ping_interval: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    ping.tick().await;

    loop {
        let message = tokio::select! {
            frame = frames.recv() => match frame {
                Some(Frame::Text(text)) => Message::Text(text.to_string()),
                Some(Frame::Pong(data)) => Message::Pong(data),
                Some(Frame::Close { code, reason }) => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                        .await;
                    break;
                }
                None => break,
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "WebSocket write failed");
            break;
        }
    }

    let _ = sink.close().await;
    // Wake the reader if the write side ended first.
    closer.notify_one();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{ProjectionError, ProjectionSource};
    use crate::ws::SubscriptionRegistry;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use shared_crypto::{Secp256k1Signer, Signer};
    use shared_types::{GameStateDto, TransactionDto};

    struct Tables;

    #[async_trait]
    impl ProjectionSource for Tables {
        async fn game_projection(
            &self,
            table: &str,
            viewer: Option<&str>,
        ) -> Result<GameStateDto, ProjectionError> {
            Ok(json!({ "table": table, "viewer": viewer }))
        }

        fn mempool_snapshot(&self) -> Vec<TransactionDto> {
            Vec::new()
        }
    }

    struct Harness {
        session: WsSession,
        outbox: Outbox,
        registry: Arc<SubscriptionRegistry>,
    }

    fn harness(config: WebSocketConfig) -> Harness {
        let registry = Arc::new(SubscriptionRegistry::new(8));
        let broadcast = Arc::new(BroadcastService::new(
            registry.clone(),
            Arc::new(Tables),
            Arc::new(GatewayMetrics::new()),
        ));
        let (handle, outbox) = ConnectionHandle::new(ConnectionId::new(), 32);
        Harness {
            session: WsSession::new(handle, broadcast, config),
            outbox,
            registry,
        }
    }

    fn drain(outbox: &mut Outbox) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(frame) = outbox.frames.try_recv() {
            if let Frame::Text(text) = frame {
                events.push(serde_json::from_str(&text).unwrap());
            }
        }
        events
    }

    fn signed_subscribe(signer: &Secp256k1Signer, table: &str) -> String {
        let player = signer.address();
        let signature = signer
            .sign(subscription_payload(table, &player).as_bytes())
            .unwrap();
        json!({
            "action": "subscribe",
            "tableAddress": table,
            "playerId": player,
            "signature": signature,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_signed_subscribe_registers_and_pushes_state() {
        let mut h = harness(WebSocketConfig::default());
        let signer = Secp256k1Signer::ephemeral().unwrap();
        h.session
            .process_text(&signed_subscribe(&signer, "0xabc"))
            .await
            .unwrap();

        let events = drain(&mut h.outbox);
        assert_eq!(events[0]["type"], "subscribed");
        assert_eq!(events[1]["type"], "gameStateUpdate");
        assert_eq!(events[1]["gameState"]["viewer"], signer.address());
        assert_eq!(h.registry.subscribers_of("0xabc"), vec![signer.address()]);
    }

    #[tokio::test]
    async fn test_foreign_signature_does_not_subscribe() {
        let mut h = harness(WebSocketConfig::default());
        let player = Secp256k1Signer::ephemeral().unwrap();
        let impostor = Secp256k1Signer::ephemeral().unwrap();
        let signature = impostor
            .sign(subscription_payload("0xabc", &player.address()).as_bytes())
            .unwrap();
        let message = json!({
            "action": "subscribe",
            "tableAddress": "0xabc",
            "playerId": player.address(),
            "signature": signature,
        });
        h.session.process_text(&message.to_string()).await.unwrap();

        let events = drain(&mut h.outbox);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "error");
        assert_eq!(events[0]["code"], codes::UNAUTHORIZED);
        assert_eq!(h.registry.stats().total_viewers, 0);
    }

    #[tokio::test]
    async fn test_unsigned_message_subscribe_is_refused() {
        let mut h = harness(WebSocketConfig::default());
        let message = r#"{"action":"subscribe","tableAddress":"0xabc","playerId":"p1"}"#;
        h.session.process_text(message).await.unwrap();
        assert_eq!(drain(&mut h.outbox)[0]["code"], codes::UNAUTHORIZED);
        assert!(h.registry.subscribers_of("0xabc").is_empty());
    }

    #[tokio::test]
    async fn test_invalid_and_oversized_messages() {
        let config = WebSocketConfig {
            max_message_size: 64,
            ..WebSocketConfig::default()
        };
        let mut h = harness(config);
        h.session.process_text("{not json").await.unwrap();
        h.session.process_text(&"x".repeat(65)).await.unwrap();
        let events = drain(&mut h.outbox);
        assert_eq!(events[0]["code"], codes::INVALID_MESSAGE);
        assert_eq!(events[1]["code"], codes::MESSAGE_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let config = WebSocketConfig {
            rate_limit_per_second: 2,
            ..WebSocketConfig::default()
        };
        let mut h = harness(config);
        for _ in 0..3 {
            h.session
                .process_text(r#"{"action":"unsubscribe_mempool"}"#)
                .await
                .unwrap();
        }
        let events = drain(&mut h.outbox);
        assert_eq!(events[0]["type"], "mempool_unsubscribed");
        assert_eq!(events[1]["type"], "mempool_unsubscribed");
        assert_eq!(events[2]["code"], codes::RATE_LIMITED);
    }

    #[tokio::test]
    async fn test_mempool_subscription_pushes_snapshot() {
        let mut h = harness(WebSocketConfig::default());
        h.session
            .process_text(r#"{"action":"subscribe_mempool"}"#)
            .await
            .unwrap();
        let events = drain(&mut h.outbox);
        assert_eq!(events[0]["type"], "mempool_subscribed");
        assert_eq!(events[1]["type"], "mempoolUpdate");
        assert_eq!(h.registry.stats().mempool_subscriber_count, 1);
    }

    #[tokio::test]
    async fn test_url_params_unsigned_when_allowed() {
        let mut h = harness(WebSocketConfig::default());
        let params = ConnectParams {
            table_address: Some("0xabc".into()),
            player_id: Some("p1".into()),
            subscribe_mempool: Some("true".into()),
            signature: None,
        };
        h.session.open(&params).await.unwrap();

        let kinds: Vec<Value> = drain(&mut h.outbox).into_iter().map(|e| e["type"].clone()).collect();
        assert_eq!(
            kinds,
            vec![
                json!("connected"),
                json!("subscribed"),
                json!("gameStateUpdate"),
                json!("mempool_subscribed"),
                json!("mempoolUpdate"),
            ]
        );
        assert_eq!(h.registry.subscribers_of("0xabc"), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_url_params_need_signature_when_configured() {
        let config = WebSocketConfig {
            allow_unsigned_url_subscribe: false,
            ..WebSocketConfig::default()
        };
        let mut h = harness(config);
        let params = ConnectParams {
            table_address: Some("0xabc".into()),
            player_id: Some("p1".into()),
            ..ConnectParams::default()
        };
        h.session.open(&params).await.unwrap();
        let events = drain(&mut h.outbox);
        assert_eq!(events[0]["type"], "connected");
        assert_eq!(events[1]["code"], codes::UNAUTHORIZED);
        assert_eq!(h.registry.stats().table_count, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_pair_is_acknowledged() {
        let mut h = harness(WebSocketConfig::default());
        h.session
            .process_text(r#"{"action":"unsubscribe","tableAddress":"0xabc","playerId":"p9"}"#)
            .await
            .unwrap();
        assert_eq!(drain(&mut h.outbox)[0]["type"], "unsubscribed");
    }

    #[test]
    fn test_verify_subscription() {
        let signer = Secp256k1Signer::ephemeral().unwrap();
        let player = signer.address();
        let signature = signer
            .sign(subscription_payload("0xabc", &player).as_bytes())
            .unwrap();
        assert!(verify_subscription("0xabc", &player, Some(&signature)).is_ok());
        assert!(verify_subscription("0xabc", &player.to_uppercase().replace("0X", "0x"), Some(&signature)).is_ok());
        assert!(matches!(
            verify_subscription("0xdef", &player, Some(&signature)),
            Err(SubscribeError::SignerMismatch(_))
        ));
        assert!(matches!(
            verify_subscription("0xabc", &player, None),
            Err(SubscribeError::MissingSignature)
        ));
        assert!(matches!(
            verify_subscription("0xabc", &player, Some("0xzz")),
            Err(SubscribeError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_connect_params_mempool_flag() {
        let parse = |v: &str| ConnectParams {
            subscribe_mempool: Some(v.into()),
            ..ConnectParams::default()
        };
        assert!(parse("true").wants_mempool());
        assert!(parse("1").wants_mempool());
        assert!(!parse("no").wants_mempool());
        assert!(!ConnectParams::default().wants_mempool());
    }
}
