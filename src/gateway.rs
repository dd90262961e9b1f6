//! Gateway (WebSocket) transport for the Discord API.
//!
//! This module owns the WebSocket connection lifecycle:
//!   - connect, receive HELLO, send IDENTIFY
//!   - background heartbeat task
//!   - sequence number + session_id tracking
//!   - automatic reconnect + RESUME on disconnect
//!
//! The rest of the codebase consumes a stream of [`GatewayEvent`] values and
//! never touches `tokio_tungstenite` directly. The pet bot sends nothing on
//! the socket beyond protocol traffic (identify, resume, heartbeats), so
//! unlike a full-featured client there is no outbound payload channel and no
//! gateway send budget to manage.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::events::GatewayEvent;
use crate::types::GatewayPayload;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Maximum number of reconnect attempts before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 8;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Options for connecting to the Discord gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    /// Gateway intents bitmask.
    pub intents: u32,
}

// ---------------------------------------------------------------------------
// Internal session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SessionState {
    /// From the READY event.
    session_id: Option<String>,
    /// Resume URL provided by Discord in the READY event.
    resume_gateway_url: Option<String>,
    /// Monotonically increasing sequence counter.
    sequence: Option<u64>,
}

// ---------------------------------------------------------------------------
// Transport aliases (the only place tungstenite types appear)
// ---------------------------------------------------------------------------

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    tokio_tungstenite::tungstenite::Message,
>;

type WsStream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Handle to a running gateway connection.
pub struct GatewayHandle {
    /// Receive typed events.
    pub events: mpsc::Receiver<GatewayEvent>,
    /// Handle to the background driver task so callers can await / abort it.
    #[allow(dead_code)]
    pub driver_handle: tokio::task::JoinHandle<()>,
}

/// Connect to the Discord gateway, returning a [`GatewayHandle`].
///
/// Spawns a background driver that reads from the WebSocket, heartbeats at
/// the interval Discord dictates, and reconnects (resuming where possible)
/// on disconnects.
pub async fn connect(config: GatewayConfig) -> Result<GatewayHandle, String> {
    let (event_tx, event_rx) = mpsc::channel::<GatewayEvent>(256);
    let driver_handle = tokio::spawn(gateway_driver(config, event_tx));

    Ok(GatewayHandle {
        events: event_rx,
        driver_handle,
    })
}

// ---------------------------------------------------------------------------
// The main driver loop (runs in a spawned task)
// ---------------------------------------------------------------------------

async fn gateway_driver(config: GatewayConfig, event_tx: mpsc::Sender<GatewayEvent>) {
    let session = Arc::new(Mutex::new(SessionState::default()));
    let mut reconnect_attempts: u32 = 0;

    loop {
        let url = {
            let s = session.lock().await;
            s.resume_gateway_url
                .clone()
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string())
        };
        let url = with_query_params(&url);

        info!(url = %url, "connecting to Discord gateway");

        let (ws_stream, _) = match tokio_tungstenite::connect_async(&url).await {
            Ok(pair) => {
                reconnect_attempts = 0;
                pair
            }
            Err(e) => {
                error!(error = %e, "failed to connect to gateway");
                if !backoff_or_give_up(&mut reconnect_attempts).await {
                    return;
                }
                continue;
            }
        };

        let (ws_write, mut ws_read) = ws_stream.split();
        let ws_write = Arc::new(Mutex::new(ws_write));

        // 1. Read HELLO and extract heartbeat_interval.
        let heartbeat_interval = match read_hello(&mut ws_read).await {
            Ok(interval) => interval,
            Err(e) => {
                error!(error = %e, "failed to read HELLO from gateway");
                if !backoff_or_give_up(&mut reconnect_attempts).await {
                    return;
                }
                continue;
            }
        };
        debug!(interval_ms = heartbeat_interval, "received HELLO");

        // 2. Send IDENTIFY, or RESUME when we still hold a session.
        let handshake = {
            let s = session.lock().await;
            match (&s.session_id, s.sequence) {
                (Some(id), Some(seq)) => json!({
                    "op": 6,
                    "d": { "token": config.token, "session_id": id, "seq": seq }
                }),
                _ => json!({
                    "op": 2,
                    "d": {
                        "token": config.token,
                        "properties": {
                            "os": std::env::consts::OS,
                            "browser": "mascot-bot",
                            "device": "mascot-bot"
                        },
                        "intents": config.intents,
                    }
                }),
            }
        };
        if let Err(e) = send_json(&ws_write, &handshake).await {
            error!(error = %e, "failed to send gateway handshake");
            if !backoff_or_give_up(&mut reconnect_attempts).await {
                return;
            }
            continue;
        }

        // 3. Spawn the heartbeat task.
        let hb_write = Arc::clone(&ws_write);
        let hb_session = Arc::clone(&session);
        let (hb_cancel_tx, mut hb_cancel_rx) = mpsc::channel::<()>(1);

        let heartbeat_handle = tokio::spawn(async move {
            // First heartbeat goes out after interval * jitter, per the docs.
            let jitter = rand::random::<f64>();
            let first_delay = Duration::from_millis((heartbeat_interval as f64 * jitter) as u64);
            tokio::select! {
                _ = tokio::time::sleep(first_delay) => {}
                _ = hb_cancel_rx.recv() => { return; }
            }

            let mut interval = tokio::time::interval(Duration::from_millis(heartbeat_interval));
            // The first tick fires immediately; we already waited above.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let seq = { hb_session.lock().await.sequence };
                        if let Err(e) = send_json(&hb_write, &json!({"op": 1, "d": seq})).await {
                            warn!(error = %e, "heartbeat send failed, stopping heartbeat task");
                            return;
                        }
                        debug!(?seq, "sent heartbeat");
                    }
                    _ = hb_cancel_rx.recv() => {
                        debug!("heartbeat task cancelled");
                        return;
                    }
                }
            }
        });

        // 4. Main read loop.
        let disconnect_reason = read_loop(&mut ws_read, &ws_write, &event_tx, &session).await;

        // 5. Cleanup, then decide whether to reconnect.
        let _ = hb_cancel_tx.send(()).await;
        heartbeat_handle.abort();
        {
            let mut w = ws_write.lock().await;
            let _ = w
                .send(tokio_tungstenite::tungstenite::Message::Close(None))
                .await;
        }

        match disconnect_reason {
            DisconnectReason::ShouldResume => {
                info!("will attempt RESUME");
            }
            DisconnectReason::ShouldReidentify => {
                info!("session invalidated, will re-IDENTIFY");
                let mut s = session.lock().await;
                s.session_id = None;
                s.sequence = None;
                // Keep resume_gateway_url for the next attempt.
            }
            DisconnectReason::Fatal => {
                error!("fatal gateway error, shutting down");
                return;
            }
            DisconnectReason::EventChannelClosed => {
                info!("event channel closed, shutting down gateway driver");
                return;
            }
        }

        if !backoff_or_give_up(&mut reconnect_attempts).await {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Disconnect reason
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum DisconnectReason {
    ShouldResume,
    ShouldReidentify,
    Fatal,
    EventChannelClosed,
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

async fn read_loop(
    ws_read: &mut WsStream,
    ws_write: &Arc<Mutex<WsSink>>,
    event_tx: &mpsc::Sender<GatewayEvent>,
    session: &Arc<Mutex<SessionState>>,
) -> DisconnectReason {
    loop {
        let msg = match ws_read.next().await {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket read error");
                return DisconnectReason::ShouldResume;
            }
            None => {
                info!("WebSocket stream ended");
                return DisconnectReason::ShouldResume;
            }
        };

        match msg {
            tokio_tungstenite::tungstenite::Message::Text(text) => {
                let payload: GatewayPayload = match serde_json::from_str(&text) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "failed to parse gateway payload");
                        continue;
                    }
                };

                if let Some(s) = payload.s {
                    session.lock().await.sequence = Some(s);
                }

                let event = GatewayEvent::from_payload(payload);

                // Session-relevant events are handled here; the bot only
                // sees what it can act on.
                match &event {
                    GatewayEvent::Ready(ready) => {
                        let mut sess = session.lock().await;
                        sess.session_id = Some(ready.session_id.clone());
                        sess.resume_gateway_url = Some(ready.resume_gateway_url.clone());
                        info!(user = %ready.user.tag(), "gateway READY");
                    }

                    GatewayEvent::HeartbeatRequest => {
                        let seq = { session.lock().await.sequence };
                        if let Err(e) = send_json(ws_write, &json!({"op": 1, "d": seq})).await {
                            warn!(error = %e, "failed to send requested heartbeat");
                        }
                        continue;
                    }

                    GatewayEvent::HeartbeatAck => {
                        debug!("heartbeat acknowledged");
                        continue;
                    }

                    GatewayEvent::Reconnect => {
                        info!("gateway requested reconnect (op 7)");
                        return DisconnectReason::ShouldResume;
                    }

                    GatewayEvent::InvalidSession(resumable) => {
                        warn!(resumable, "session invalidated (op 9)");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        return if *resumable {
                            DisconnectReason::ShouldResume
                        } else {
                            DisconnectReason::ShouldReidentify
                        };
                    }

                    _ => {}
                }

                if event_tx.send(event).await.is_err() {
                    info!("event channel closed by consumer");
                    return DisconnectReason::EventChannelClosed;
                }
            }

            tokio_tungstenite::tungstenite::Message::Close(frame) => {
                let code = frame.as_ref().map(|f| u16::from(f.code));
                warn!(close_code = ?code, "WebSocket closed by server");
                return match code {
                    // Authentication / intents problems are unrecoverable.
                    Some(4004) | Some(4010) | Some(4011) | Some(4012) | Some(4013)
                    | Some(4014) => DisconnectReason::Fatal,
                    // Invalid seq or session timed out: re-identify.
                    Some(4007) | Some(4009) => DisconnectReason::ShouldReidentify,
                    _ => DisconnectReason::ShouldResume,
                };
            }

            // Ping/Pong/Binary are handled by tungstenite or irrelevant.
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ensure the gateway URL carries the API version and encoding params.
fn with_query_params(url: &str) -> String {
    if url.contains("v=10") {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&v=10&encoding=json", url)
    } else {
        format!("{}?v=10&encoding=json", url)
    }
}

/// Read the HELLO payload and return the heartbeat interval in milliseconds.
async fn read_hello(stream: &mut WsStream) -> Result<u64, String> {
    let msg = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .map_err(|_| "timed out waiting for HELLO".to_string())?
        .ok_or_else(|| "stream ended before HELLO".to_string())?
        .map_err(|e| format!("WS error reading HELLO: {}", e))?;

    let text = match msg {
        tokio_tungstenite::tungstenite::Message::Text(t) => t,
        other => return Err(format!("expected text message for HELLO, got {:?}", other)),
    };

    let payload: GatewayPayload =
        serde_json::from_str(&text).map_err(|e| format!("failed to parse HELLO: {}", e))?;

    if payload.op != 10 {
        return Err(format!("expected op 10 (HELLO), got op {}", payload.op));
    }

    payload
        .d
        .as_ref()
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| "HELLO missing heartbeat_interval".to_string())
}

/// Serialize and send a JSON payload on the WebSocket.
async fn send_json(
    ws_write: &Arc<Mutex<WsSink>>,
    payload: &serde_json::Value,
) -> Result<(), String> {
    let text = serde_json::to_string(payload).map_err(|e| e.to_string())?;
    let mut w = ws_write.lock().await;
    w.send(tokio_tungstenite::tungstenite::Message::Text(text))
        .await
        .map_err(|e| format!("WS send error: {}", e))
}

/// Sleep with exponential backoff and jitter, capped at 60 s. Returns false
/// once the attempt budget is exhausted.
async fn backoff_or_give_up(attempts: &mut u32) -> bool {
    *attempts += 1;
    if *attempts > MAX_RECONNECT_ATTEMPTS {
        error!("exceeded max reconnect attempts, giving up");
        return false;
    }
    let base_ms = 1000u64 * 2u64.saturating_pow((*attempts).min(6));
    let jitter = (rand::random::<f64>() * 0.5 + 0.75) * base_ms as f64;
    let delay = Duration::from_millis(jitter.min(60_000.0) as u64);
    warn!(
        delay_ms = delay.as_millis() as u64,
        attempt = *attempts,
        "backing off before reconnect"
    );
    tokio::time::sleep(delay).await;
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_appended_once() {
        assert_eq!(
            with_query_params("wss://gateway.discord.gg"),
            "wss://gateway.discord.gg?v=10&encoding=json"
        );
        assert_eq!(
            with_query_params("wss://gateway.discord.gg/?v=10&encoding=json"),
            "wss://gateway.discord.gg/?v=10&encoding=json"
        );
        assert_eq!(
            with_query_params("wss://resume.discord.gg/?foo=1"),
            "wss://resume.discord.gg/?foo=1&v=10&encoding=json"
        );
    }

    #[test]
    fn session_state_defaults_to_fresh_identify() {
        let s = SessionState::default();
        assert!(s.session_id.is_none());
        assert!(s.sequence.is_none());
        assert!(s.resume_gateway_url.is_none());
    }
}
